use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bow::{bow_vector, BoWTrait, DocumentFrequency, WordBag};
use crate::features::Keypoint;
use crate::vocab::Vocabulary;
use crate::{BoW, Desc, Result, VsearchError};

/// One ranked query result. Distance is cosine distance in [0, 2];
/// 0 means identical direction.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Match {
    pub key: String,
    pub distance: f32,
}

/// Stored record for one image: its BoW vector plus optionally the raw
/// features it was built from.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct DatabaseEntry {
    pub key: String,
    pub bow: BoW,
    pub descriptors: Option<Vec<Desc>>,
    pub keypoints: Option<Vec<Keypoint>>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
/// Single-modality visual database: a vocabulary, the frozen corpus
/// document-frequency statistic, and one BoW vector per image key.
///
/// The document frequency is computed exactly once, when the database is
/// built from its corpus. Entries added later are weighted against that
/// frozen statistic; neither insertion nor querying ever recomputes it.
pub struct Database {
    vocab: Vocabulary,
    df: DocumentFrequency,
    entries: BTreeMap<String, DatabaseEntry>,
}

/// Database build & persistence
impl Database {
    /// Build a database from a finalized corpus of `(key, descriptors)`
    /// pairs.
    ///
    /// Quantization of the corpus runs in parallel across images. An empty
    /// corpus is valid and yields an empty database whose queries return
    /// empty result lists.
    pub fn build(vocab: Vocabulary, corpus: Vec<(String, Vec<Desc>)>) -> Result<Self> {
        let bags: Vec<(String, WordBag)> = corpus
            .into_par_iter()
            .map(|(key, descriptors)| {
                let bag = vocab.quantize_bag(&descriptors)?;
                Ok((key, bag))
            })
            .collect::<Result<_>>()?;

        let (keys, bags): (Vec<String>, Vec<WordBag>) = bags.into_iter().unzip();
        let df = DocumentFrequency::from_corpus(vocab.size(), &bags);

        let mut entries = BTreeMap::new();
        for (key, bag) in keys.into_iter().zip(bags) {
            if entries.contains_key(&key) {
                return Err(VsearchError::DuplicateKey(key));
            }
            let bow = bow_vector(&bag, &df);
            entries.insert(
                key.clone(),
                DatabaseEntry {
                    key,
                    bow,
                    descriptors: None,
                    keypoints: None,
                },
            );
        }
        tracing::info!(
            images = entries.len(),
            words = vocab.size(),
            "built visual database"
        );
        Ok(Self { vocab, df, entries })
    }

    /// Load a database from a bincode file
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = std::fs::File::open(&path)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        let db: Self = bincode::deserialize(&buffer)?;
        tracing::info!(
            path = %path.as_ref().display(),
            images = db.entries.len(),
            "loaded visual database"
        );
        Ok(db)
    }

    /// Save the database to a bincode file
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(&path)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        tracing::info!(
            path = %path.as_ref().display(),
            images = self.entries.len(),
            "saved visual database"
        );
        Ok(())
    }
}

/// Entry management & queries
impl Database {
    /// Insert one image, weighting it against the frozen document
    /// frequency. Fails with `DuplicateKey` if the key exists; remove it
    /// first to replace. Single-writer: callers serialize insertions.
    pub fn add_entry(
        &mut self,
        key: &str,
        descriptors: &[Desc],
        keypoints: Option<Vec<Keypoint>>,
    ) -> Result<()> {
        self.insert(key, descriptors, None, keypoints)
    }

    /// Like [`add_entry`], but also keeps the raw descriptors in the entry.
    ///
    /// [`add_entry`]: Database::add_entry
    pub fn add_entry_keeping_features(
        &mut self,
        key: &str,
        descriptors: Vec<Desc>,
        keypoints: Option<Vec<Keypoint>>,
    ) -> Result<()> {
        let bag_source = descriptors.clone();
        self.insert(key, &bag_source, Some(descriptors), keypoints)
    }

    fn insert(
        &mut self,
        key: &str,
        descriptors: &[Desc],
        raw: Option<Vec<Desc>>,
        keypoints: Option<Vec<Keypoint>>,
    ) -> Result<()> {
        if self.entries.contains_key(key) {
            return Err(VsearchError::DuplicateKey(key.to_string()));
        }
        let bag = self.vocab.quantize_bag(descriptors)?;
        let bow = bow_vector(&bag, &self.df);
        self.entries.insert(
            key.to_string(),
            DatabaseEntry {
                key: key.to_string(),
                bow,
                descriptors: raw,
                keypoints,
            },
        );
        Ok(())
    }

    /// Rank every stored image against a query descriptor set.
    ///
    /// The query vector is built with the same quantizer and the same
    /// frozen document frequency as the stored entries. Results come back
    /// ascending by cosine distance, ties broken by key. `min_similarity`
    /// filters on `1 - distance` before `k` truncates, so a tight cap can
    /// never drop a match that passes the threshold ahead of one that
    /// does not.
    pub fn query(
        &self,
        descriptors: &[Desc],
        k: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<Match>> {
        let bag = self.vocab.quantize_bag(descriptors)?;
        let q = bow_vector(&bag, &self.df);

        let mut matches: Vec<Match> = self
            .entries
            .par_iter()
            .map(|(key, entry)| Match {
                key: key.clone(),
                distance: q.cosine(&entry.bow),
            })
            .collect();

        if let Some(s) = min_similarity {
            matches.retain(|m| 1. - m.distance >= s);
        }
        matches.sort_by(compare_matches);
        if let Some(k) = k {
            matches.truncate(k);
        }
        Ok(matches)
    }

    /// Look up an entry, or `None` if the key is absent.
    pub fn try_get(&self, key: &str) -> Option<&DatabaseEntry> {
        self.entries.get(key)
    }

    /// Look up an entry, failing with `MissingKey` if absent.
    pub fn get(&self, key: &str) -> Result<&DatabaseEntry> {
        self.try_get(key)
            .ok_or_else(|| VsearchError::MissingKey(key.to_string()))
    }

    /// Remove and return an entry. The frozen document frequency is not
    /// recomputed.
    pub fn remove(&mut self, key: &str) -> Result<DatabaseEntry> {
        self.entries
            .remove(key)
            .ok_or_else(|| VsearchError::MissingKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Corpus size N frozen into the document-frequency statistic. Not
    /// affected by entries added or removed after the build.
    pub fn corpus_size(&self) -> u32 {
        self.df.num_documents()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn document_frequency(&self) -> &DocumentFrequency {
        &self.df
    }
}

/// Ascending distance, ties broken by key for a deterministic order.
pub(crate) fn compare_matches(a: &Match, b: &Match) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.key.cmp(&b.key))
}
