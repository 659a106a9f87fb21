use thiserror::Error;

/// Visual vocabulary and descriptor quantization.
pub mod vocab;
pub use vocab::Vocabulary;

/// Word bags, document frequencies and TF-IDF BoW vectors.
pub mod bow;
pub use bow::{BoWTrait, DocumentFrequency, WordBag};

/// Keypoint/descriptor files produced by the feature extraction stage.
pub mod features;
pub use features::{FeatureFile, Keypoint};

/// Single-modality visual database.
pub mod database;
pub use database::{Database, DatabaseEntry, Match};

/// Multi-modal query fusion.
pub mod fusion;
pub use fusion::query_fused;

/// Optional geographic locations attached to database keys.
pub mod location;
pub use location::{LatLng, LocationTable};

/// Supported descriptor type is a float vector.
///
/// The dimension depends on the feature modality: 128 for SIFT,
/// 11 for colornames descriptors.
pub type Desc = Vec<f32>;

/// Bag-of-Words representation of an image or descriptor set.
///
/// Index: visual word id in the vocabulary.
///
/// Value: TF-IDF weight of that word, L2-normalized over the vector.
pub type BoW = Vec<f32>;

pub type Result<T> = std::result::Result<T, VsearchError>;

#[derive(Error, Debug)]
pub enum VsearchError {
    #[error("Io Error")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "bincode")]
    #[error("Serialization Error")]
    Bincode(#[from] bincode::Error),
    #[error("descriptor has dimension {got}, vocabulary expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("descriptor file {path:?} has dimension {got}, expected {expected}")]
    FeatureDimensionMismatch {
        path: std::path::PathBuf,
        expected: usize,
        got: usize,
    },
    #[error("key '{0}' is already in the database")]
    DuplicateKey(String),
    #[error("key '{0}' is not in the database")]
    MissingKey(String),
    #[error("{path:?} contains no valid records")]
    MalformedRecord { path: std::path::PathBuf },
    #[error("vocabulary must contain at least one centroid")]
    EmptyVocabulary,
}
