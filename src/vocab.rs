use std::convert::TryInto;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bow::WordBag;
use crate::{Desc, Result, VsearchError};

/// Narrow seam for the external clustering collaborator.
///
/// The engine never runs clustering itself; it only consumes the finished
/// centroid set through [`Vocabulary::new`]. Any k-means (or other)
/// implementation can be plugged in behind this trait.
pub trait Clusterer {
    /// Cluster `vectors` into `k` centroids.
    fn cluster(&self, vectors: &[Desc], k: usize) -> Vec<Desc>;
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
/// Visual word vocabulary: a fixed set of K centroid vectors in descriptor
/// space. Immutable once constructed. Can be:
/// 1. Built from an external clusterer's output.
/// 2. Saved to a file & loaded from a file (raw matrix format, or bincode
///    with the bincode feature, enabled by default).
/// 3. Used to quantize descriptors into visual word indices.
pub struct Vocabulary {
    dim: usize,
    centroids: Vec<Desc>,
}

/// Vocabulary API
impl Vocabulary {
    /// Build a vocabulary from a finished centroid set.
    ///
    /// Fails with `EmptyVocabulary` if no centroids are given, and with
    /// `DimensionMismatch` if the centroids do not all share one dimension.
    pub fn new(centroids: Vec<Desc>) -> Result<Self> {
        let dim = match centroids.first() {
            Some(c) => c.len(),
            None => return Err(VsearchError::EmptyVocabulary),
        };
        for c in &centroids {
            if c.len() != dim {
                return Err(VsearchError::DimensionMismatch {
                    expected: dim,
                    got: c.len(),
                });
            }
        }
        Ok(Self { dim, centroids })
    }

    /// Build a vocabulary by running the external clusterer over training
    /// descriptors.
    pub fn from_clusterer<C: Clusterer>(clusterer: &C, vectors: &[Desc], k: usize) -> Result<Self> {
        Self::new(clusterer.cluster(vectors, k))
    }

    /// Number of visual words K.
    pub fn size(&self) -> usize {
        self.centroids.len()
    }

    /// Descriptor dimension D.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Map a descriptor to the index of its nearest centroid under Euclidean
    /// distance. Ties resolve to the lowest centroid index.
    pub fn quantize(&self, descriptor: &[f32]) -> Result<usize> {
        if descriptor.len() != self.dim {
            return Err(VsearchError::DimensionMismatch {
                expected: self.dim,
                got: descriptor.len(),
            });
        }
        let mut best: (f32, usize) = (f32::INFINITY, 0);
        for (i, c) in self.centroids.iter().enumerate() {
            let d = sq_euclidean(descriptor, c);
            if d < best.0 {
                best = (d, i);
            }
        }
        Ok(best.1)
    }

    /// Quantize a full descriptor set into its word bag. Each descriptor is
    /// quantized independently, so input order never affects the multiset.
    pub fn quantize_bag(&self, descriptors: &[Desc]) -> Result<WordBag> {
        let mut bag = WordBag::new(self.size());
        for d in descriptors {
            bag.add(self.quantize(d)?);
        }
        Ok(bag)
    }

    /// Load a vocabulary from the raw matrix format: a little-endian header
    /// `{K: u32, D: u32}` followed by a K x D f32 centroid matrix.
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(&path)?;
        let truncated = || {
            VsearchError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("vocabulary file '{}' is truncated", path.as_ref().display()),
            ))
        };
        if bytes.len() < 8 {
            return Err(truncated());
        }
        let k = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let dim = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        if k == 0 || dim == 0 {
            return Err(VsearchError::EmptyVocabulary);
        }
        let data = &bytes[8..];
        if data.len() != k * dim * 4 {
            return Err(truncated());
        }
        let mut centroids = Vec::with_capacity(k);
        for row in data.chunks(dim * 4) {
            centroids.push(
                row.chunks(4)
                    .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
                    .collect(),
            );
        }
        tracing::info!(
            path = %path.as_ref().display(),
            words = k,
            dim,
            "loaded vocabulary"
        );
        Self::new(centroids)
    }

    /// Save the vocabulary in the raw matrix format read by [`read_from`].
    ///
    /// [`read_from`]: Vocabulary::read_from
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut bytes = Vec::with_capacity(8 + self.size() * self.dim * 4);
        bytes.extend_from_slice(&(self.size() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.dim as u32).to_le_bytes());
        for c in &self.centroids {
            for &x in c {
                bytes.extend_from_slice(&x.to_le_bytes());
            }
        }
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    /// Load a vocabulary from a bincode file
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let mut file = std::fs::File::open(file)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }

    /// Save vocabulary to a bincode file
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(file)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }
}

#[inline]
fn sq_euclidean(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).fold(0., |a, (b, c)| {
        let d = b - c;
        a + d * d
    })
}
