use std::collections::BTreeMap;

use crate::database::{compare_matches, Database, Match};
use crate::{Desc, Result};

/// Merge two single-modality rankings over a shared key space.
///
/// For every key present in either list the fused distance is the minimum
/// of its per-modality distances: an image that matches closely in either
/// modality ranks well. A key present in only one list keeps that
/// modality's distance unchanged. The minimum rule is deliberate source
/// behavior and is preserved exactly.
pub fn fuse_rankings(a: Vec<Match>, b: Vec<Match>) -> Vec<Match> {
    let mut fused: BTreeMap<String, f32> = BTreeMap::new();
    for m in a.into_iter().chain(b) {
        let d = fused.entry(m.key).or_insert(f32::INFINITY);
        if m.distance < *d {
            *d = m.distance;
        }
    }
    let mut out: Vec<Match> = fused
        .into_iter()
        .map(|(key, distance)| Match { key, distance })
        .collect();
    out.sort_by(compare_matches);
    out
}

/// Query two feature databases of the same corpus (e.g. SIFT and
/// colornames) and fuse their rankings.
///
/// Both databases are queried independently to completion; only then are
/// the rankings merged by [`fuse_rankings`], thresholded on
/// `1 - distance`, and truncated to `k`. A key stored in one database but
/// missing from the other is not an error here; it simply competes with
/// its single available distance.
pub fn query_fused(
    db_a: &Database,
    db_b: &Database,
    query_a: &[Desc],
    query_b: &[Desc],
    k: Option<usize>,
    min_similarity: Option<f32>,
) -> Result<Vec<Match>> {
    let results_a = db_a.query(query_a, None, None)?;
    let results_b = db_b.query(query_b, None, None)?;

    let mut fused = fuse_rankings(results_a, results_b);
    if let Some(s) = min_similarity {
        fused.retain(|m| 1. - m.distance >= s);
    }
    if let Some(k) = k {
        fused.truncate(k);
    }
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Vocabulary;

    fn m(key: &str, distance: f32) -> Match {
        Match {
            key: key.to_string(),
            distance,
        }
    }

    #[test]
    fn minimum_distance_wins() {
        let fused = fuse_rankings(vec![m("key1", 0.2)], vec![m("key1", 0.5)]);
        assert_eq!(fused, vec![m("key1", 0.2)]);
    }

    #[test]
    fn single_modality_keys_keep_their_distance() {
        let fused = fuse_rankings(
            vec![m("both", 0.4), m("only-a", 0.1)],
            vec![m("both", 0.3), m("only-b", 0.6)],
        );
        assert_eq!(fused, vec![m("only-a", 0.1), m("both", 0.3), m("only-b", 0.6)]);
    }

    #[test]
    fn equal_distances_order_by_key() {
        let fused = fuse_rankings(vec![m("b", 0.5), m("a", 0.5)], Vec::new());
        assert_eq!(fused, vec![m("a", 0.5), m("b", 0.5)]);
    }

    #[test]
    fn fused_query_over_two_modalities() {
        // Modality A: 2-d descriptors. Modality B: 1-d descriptors.
        let vocab_a = Vocabulary::new(vec![vec![0., 0.], vec![10., 0.], vec![0., 10.]]).unwrap();
        let vocab_b = Vocabulary::new(vec![vec![0.], vec![100.]]).unwrap();

        let db_a = Database::build(
            vocab_a,
            vec![
                ("x".into(), vec![vec![9., 0.], vec![10., 1.]]),
                ("y".into(), vec![vec![0., 10.], vec![1., 9.]]),
            ],
        )
        .unwrap();
        let db_b = Database::build(
            vocab_b,
            vec![
                ("x".into(), vec![vec![99.], vec![0.]]),
                ("y".into(), vec![vec![1.], vec![2.]]),
            ],
        )
        .unwrap();

        // Query matches "x" strongly in modality A.
        let fused = query_fused(
            &db_a,
            &db_b,
            &[vec![10., 0.], vec![9., 1.]],
            &[vec![1.]],
            None,
            None,
        )
        .unwrap();
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].key, "x");

        // Per-key minimum across the two independent rankings.
        let a = db_a
            .query(&[vec![10., 0.], vec![9., 1.]], None, None)
            .unwrap();
        let b = db_b.query(&[vec![1.]], None, None).unwrap();
        for fm in &fused {
            let da = a.iter().find(|m| m.key == fm.key).map(|m| m.distance);
            let db = b.iter().find(|m| m.key == fm.key).map(|m| m.distance);
            let expected = da.unwrap_or(f32::INFINITY).min(db.unwrap_or(f32::INFINITY));
            assert_eq!(fm.distance, expected);
        }
    }

    #[test]
    fn threshold_and_cap_apply_after_fusion() {
        let vocab = Vocabulary::new(vec![vec![0.], vec![10.]]).unwrap();
        let db = Database::build(
            vocab.clone(),
            vec![
                ("near".into(), vec![vec![0.], vec![10.]]),
                ("far".into(), vec![vec![10.]]),
            ],
        )
        .unwrap();
        let other = Database::build(vocab, Vec::new()).unwrap();

        let query = vec![vec![0.], vec![9.]];
        let all = query_fused(&db, &other, &query, &[], None, None).unwrap();
        let capped = query_fused(&db, &other, &query, &[], Some(1), Some(0.1)).unwrap();
        let expected: Vec<Match> = all
            .into_iter()
            .filter(|m| 1. - m.distance >= 0.1)
            .take(1)
            .collect();
        assert_eq!(capped, expected);
    }
}
