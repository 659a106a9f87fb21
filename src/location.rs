use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::database::Match;
use crate::{Result, VsearchError};

/// Geographic coordinate attached to a database key. Lives outside the
/// visual database; retrieval never depends on it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A query result decorated with its optional location.
#[derive(Debug, PartialEq, Clone)]
pub struct LocatedMatch {
    pub key: String,
    pub distance: f32,
    pub latlng: Option<LatLng>,
}

/// Key -> location table loaded from a plain-text file with one
/// `key, latitude, longitude` record per line.
#[derive(Debug, Default, Clone)]
pub struct LocationTable {
    locations: BTreeMap<String, LatLng>,
    skipped: usize,
}

impl LocationTable {
    /// Load a location table.
    ///
    /// Whitespace around fields is trimmed. A line that does not split into
    /// exactly three fields, or whose coordinates do not parse, is skipped
    /// and counted, not fatal. A file with records but zero valid ones
    /// fails with `MalformedRecord`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(&path)?;
        let mut table = Self::default();
        let mut lines = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            lines += 1;
            match parse_record(&line) {
                Some((key, latlng)) => {
                    table.locations.insert(key, latlng);
                }
                None => {
                    tracing::warn!(line = %line.trim(), "skipping malformed location record");
                    table.skipped += 1;
                }
            }
        }
        if lines > 0 && table.locations.is_empty() {
            return Err(VsearchError::MalformedRecord {
                path: path.as_ref().to_path_buf(),
            });
        }
        tracing::info!(
            path = %path.as_ref().display(),
            loaded = table.locations.len(),
            skipped = table.skipped,
            "loaded location table"
        );
        Ok(table)
    }

    pub fn get(&self, key: &str) -> Option<LatLng> {
        self.locations.get(key).copied()
    }

    pub fn insert(&mut self, key: &str, latlng: LatLng) {
        self.locations.insert(key.to_string(), latlng);
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of malformed lines skipped during the load.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Decorate ranked results with locations. Keys without a location get
    /// `None`; ranking order is untouched.
    pub fn with_locations(&self, results: &[Match]) -> Vec<LocatedMatch> {
        results
            .iter()
            .map(|m| LocatedMatch {
                key: m.key.clone(),
                distance: m.distance,
                latlng: self.get(&m.key),
            })
            .collect()
    }
}

fn parse_record(line: &str) -> Option<(String, LatLng)> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 3 {
        return None;
    }
    let key = fields[0].trim();
    if key.is_empty() {
        return None;
    }
    let lat: f64 = fields[1].trim().parse().ok()?;
    let lng: f64 = fields[2].trim().parse().ok()?;
    Some((key.to_string(), LatLng { lat, lng }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_table(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_and_trims_records() {
        let (_dir, path) = write_table("img_001, 58.58923, 16.18035\nimg_002,58.6,16.2\n");
        let table = LocationTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped(), 0);
        assert_eq!(
            table.get("img_001"),
            Some(LatLng {
                lat: 58.58923,
                lng: 16.18035
            })
        );
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let mut content = String::new();
        for i in 0..9 {
            content.push_str(&format!("img_{:03}, 58.5{}, 16.1{}\n", i, i, i));
        }
        content.push_str("broken line without commas\n");
        let (_dir, path) = write_table(&content);

        let table = LocationTable::load(&path).unwrap();
        assert_eq!(table.len(), 9);
        assert_eq!(table.skipped(), 1);
    }

    #[test]
    fn all_malformed_is_a_load_failure() {
        let (_dir, path) = write_table("nonsense\nmore nonsense\n");
        assert!(matches!(
            LocationTable::load(&path),
            Err(VsearchError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn empty_file_is_a_valid_empty_table() {
        let (_dir, path) = write_table("");
        let table = LocationTable::load(&path).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn decorates_results_preserving_order() {
        let (_dir, path) = write_table("a, 1.0, 2.0\n");
        let table = LocationTable::load(&path).unwrap();
        let results = vec![
            Match {
                key: "a".into(),
                distance: 0.1,
            },
            Match {
                key: "b".into(),
                distance: 0.2,
            },
        ];
        let located = table.with_locations(&results);
        assert_eq!(located[0].latlng, Some(LatLng { lat: 1.0, lng: 2.0 }));
        assert_eq!(located[1].latlng, None);
        assert_eq!(located[0].key, "a");
        assert_eq!(located[1].distance, 0.2);
    }
}
