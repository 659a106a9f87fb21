//! Build a visual database from a directory of descriptor files and match
//! every image against it.
//!
//! Usage: search <vocabulary.voc> <features-dir> [locations.csv]

use std::path::PathBuf;

use vsearch::features::load_batch;
use vsearch::{Database, LocationTable, Vocabulary};

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let vocab_path = args.next().expect("missing vocabulary path");
    let features_dir = args.next().expect("missing features directory");
    let locations_path = args.next();

    // Load the vocabulary (raw K x D matrix format).
    let vocab = Vocabulary::read_from(&vocab_path).unwrap();
    println!(
        "Vocabulary: {} words, {} dimensions",
        vocab.size(),
        vocab.dim()
    );

    // Collect descriptor files. Bad files are skipped and summarized.
    let paths: Vec<PathBuf> = std::fs::read_dir(&features_dir)
        .expect("cannot read features directory")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |e| e == "feat"))
        .collect();
    let report = load_batch(&paths, vocab.dim());
    println!(
        "Loaded {} descriptor files ({} skipped)",
        report.loaded.len(),
        report.skipped()
    );

    let corpus: Vec<(String, Vec<_>)> = report
        .loaded
        .into_iter()
        .map(|(key, f)| (key, f.descriptors))
        .collect();
    let queries = corpus.clone();
    let db = Database::build(vocab, corpus).unwrap();

    let locations = locations_path.map(|p| LocationTable::load(p).unwrap());

    // Match every image to every other image.
    for (key, descriptors) in &queries {
        let results = db.query(descriptors, Some(5), None).unwrap();

        println!("\nTop 5 matches for {}:", key);
        println!("Match      |   Distance");
        match &locations {
            Some(table) => {
                for m in table.with_locations(&results) {
                    match m.latlng {
                        Some(ll) => println!(
                            "{} | {:.4} @ ({:.5}, {:.5})",
                            m.key, m.distance, ll.lat, ll.lng
                        ),
                        None => println!("{} | {:.4}", m.key, m.distance),
                    }
                }
            }
            None => {
                for m in &results {
                    println!("{} | {:.4}", m.key, m.distance);
                }
            }
        }
    }
}
