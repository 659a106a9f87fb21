use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Desc, Result, VsearchError};

/// A detected image keypoint: position, patch scale and dominant
/// orientation, as produced by the external extraction stage.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub orientation: f32,
}

/// One image's extracted features: N keypoints and the matching N x D
/// descriptor matrix. Produced per image by the extraction collaborator
/// and consumed here.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct FeatureFile {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Desc>,
}

impl FeatureFile {
    /// Load a descriptor file from disk
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = std::fs::File::open(&path)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }

    /// Save a descriptor file to disk
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(path)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }

    /// Check every descriptor against the target modality's dimension.
    ///
    /// `path` identifies the offending file in the error.
    pub fn validate_dim<P: AsRef<Path>>(&self, expected: usize, path: P) -> Result<()> {
        for d in &self.descriptors {
            if d.len() != expected {
                return Err(VsearchError::FeatureDimensionMismatch {
                    path: path.as_ref().to_path_buf(),
                    expected,
                    got: d.len(),
                });
            }
        }
        Ok(())
    }
}

/// Outcome of a bulk descriptor-file load: everything that parsed, plus
/// the per-file failures that were skipped.
#[derive(Debug)]
pub struct BatchReport {
    pub loaded: Vec<(String, FeatureFile)>,
    pub failures: Vec<(PathBuf, VsearchError)>,
}

impl BatchReport {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

/// Load a batch of descriptor files, keyed by file stem.
///
/// One bad file among thousands must not abort the corpus pass: failures
/// (unreadable, unparseable, or wrong descriptor dimension for the target
/// modality) are collected and reported as a batch summary.
#[cfg(feature = "bincode")]
pub fn load_batch<P: AsRef<Path>>(paths: &[P], dim: usize) -> BatchReport {
    let mut report = BatchReport {
        loaded: Vec::with_capacity(paths.len()),
        failures: Vec::new(),
    };
    for path in paths {
        let path = path.as_ref();
        let result = FeatureFile::load(path).and_then(|f| {
            f.validate_dim(dim, path)?;
            Ok(f)
        });
        match result {
            Ok(f) => {
                let key = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                report.loaded.push((key, f));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping descriptor file");
                report.failures.push((path.to_path_buf(), e));
            }
        }
    }
    tracing::info!(
        loaded = report.loaded.len(),
        skipped = report.skipped(),
        "descriptor batch loaded"
    );
    report
}
