use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::BoW;

/// Multiset of visual word indices for one image.
///
/// Index: word id in the vocabulary. Value: number of descriptors in the
/// image quantized to that word.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct WordBag {
    counts: Vec<u32>,
    total: u32,
}

impl WordBag {
    /// An empty bag over a vocabulary of `vocab_size` words.
    pub fn new(vocab_size: usize) -> Self {
        Self {
            counts: vec![0; vocab_size],
            total: 0,
        }
    }

    /// Record one occurrence of `word`.
    pub fn add(&mut self, word: usize) {
        self.counts[word] += 1;
        self.total += 1;
    }

    /// Occurrences of `word` in this bag.
    pub fn count(&self, word: usize) -> u32 {
        self.counts[word]
    }

    /// Total number of words (descriptors) in the bag.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn vocab_size(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Words present at least once, each reported once regardless of count.
    pub fn distinct_words(&self) -> impl Iterator<Item = usize> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(w, _)| w)
    }
}

/// Corpus-wide document frequency statistic.
///
/// `df[w]` is the number of images whose bag contains word `w` at least
/// once. Built exactly once per finalized database and frozen; queries
/// never mutate it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct DocumentFrequency {
    df: Vec<u32>,
    num_documents: u32,
}

impl DocumentFrequency {
    /// Count document frequencies over a finished corpus of word bags.
    ///
    /// Each image contributes at most 1 to `df[w]` no matter how often `w`
    /// occurs in it. The per-image presence sets are summed with a
    /// commutative, associative reduction, so the corpus pass parallelizes
    /// across images.
    pub fn from_corpus(vocab_size: usize, bags: &[WordBag]) -> Self {
        let df = bags
            .par_iter()
            .fold(
                || vec![0u32; vocab_size],
                |mut acc, bag| {
                    for w in bag.distinct_words() {
                        acc[w] += 1;
                    }
                    acc
                },
            )
            .reduce(
                || vec![0u32; vocab_size],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );
        Self {
            df,
            num_documents: bags.len() as u32,
        }
    }

    /// Number of images that contain `word` at least once.
    pub fn df(&self, word: usize) -> u32 {
        self.df[word]
    }

    /// Corpus size N at the time the statistic was frozen.
    pub fn num_documents(&self) -> u32 {
        self.num_documents
    }

    pub fn vocab_size(&self) -> usize {
        self.df.len()
    }

    /// Inverse document frequency `ln(N / df[w])`.
    ///
    /// A word no image contains has IDF 0, not negative infinity, so it can
    /// never poison a vector that happens to not use it.
    pub fn idf(&self, word: usize) -> f32 {
        let df = self.df[word];
        if df == 0 {
            0.
        } else {
            (self.num_documents as f32 / df as f32).ln()
        }
    }
}

/// Build the TF-IDF weighted, L2-normalized BoW vector for one word bag.
///
/// Pure function: the same bag and the same frozen document frequency give
/// bit-identical output on every call. An empty bag, or a bag whose words
/// all carry zero IDF, produces the all-zero vector rather than dividing
/// by a zero norm.
pub fn bow_vector(bag: &WordBag, df: &DocumentFrequency) -> BoW {
    let k = bag.vocab_size();
    let mut v: BoW = vec![0.; k];
    let total = bag.total();
    if total == 0 {
        return v;
    }
    for w in 0..k {
        let tf = bag.count(w) as f32 / total as f32;
        v[w] = tf * df.idf(w);
    }
    l2_normalize(&mut v);
    v
}

/// Normalize to unit L2 length in place. A zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().fold(0., |a, &x| a + x * x).sqrt();
    if norm > 0. {
        let inv = 1. / norm;
        for x in v.iter_mut() {
            *x *= inv;
        }
    }
}

/// Provides method(s) for computing the distance between BoW vectors.
pub trait BoWTrait {
    fn cosine(&self, other: &Self) -> f32;
}

impl BoWTrait for BoW {
    /// Cosine distance `1 - dot` between two unit-norm vectors.
    ///
    /// Distance involving an all-zero vector (an image with no recognized
    /// words) is defined as 1: maximal-but-neutral, never undefined.
    fn cosine(&self, other: &Self) -> f32 {
        let zero = |v: &[f32]| v.iter().all(|&x| x == 0.);
        if zero(self) || zero(other) {
            return 1.;
        }
        let dot = self.iter().zip(other).fold(0., |a, (b, c)| a + b * c);
        (1. - dot).max(0.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag_from(counts: &[u32]) -> WordBag {
        let mut bag = WordBag::new(counts.len());
        for (w, &c) in counts.iter().enumerate() {
            for _ in 0..c {
                bag.add(w);
            }
        }
        bag
    }

    #[test]
    fn df_counts_distinct_images_not_occurrences() {
        // Word 0 appears three times in one image: still df[0] == 1.
        let bags = vec![bag_from(&[3, 0, 1, 0]), bag_from(&[0, 2, 1, 0])];
        let df = DocumentFrequency::from_corpus(4, &bags);
        assert_eq!(df.df(0), 1);
        assert_eq!(df.df(1), 1);
        assert_eq!(df.df(2), 2);
        assert_eq!(df.df(3), 0);
        assert_eq!(df.num_documents(), 2);
    }

    #[test]
    fn idf_of_unseen_word_is_zero() {
        let df = DocumentFrequency::from_corpus(2, &[bag_from(&[1, 0])]);
        assert_eq!(df.idf(1), 0.);
        assert!(df.idf(1).is_finite());
    }

    #[test]
    fn builder_is_pure() {
        let bags = vec![bag_from(&[2, 1, 0, 0]), bag_from(&[1, 0, 0, 0])];
        let df = DocumentFrequency::from_corpus(4, &bags);
        let a = bow_vector(&bags[0], &df);
        let b = bow_vector(&bags[0], &df);
        assert_eq!(a, b);
    }

    #[test]
    fn nonempty_vector_has_unit_norm() {
        let bags = vec![bag_from(&[2, 1, 4, 0]), bag_from(&[0, 3, 0, 1])];
        let df = DocumentFrequency::from_corpus(4, &bags);
        let v = bow_vector(&bags[0], &df);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.).abs() < 1e-6);
    }

    #[test]
    fn empty_bag_gives_zero_vector() {
        let df = DocumentFrequency::from_corpus(3, &[bag_from(&[1, 1, 0])]);
        let v = bow_vector(&WordBag::new(3), &df);
        assert_eq!(v, vec![0., 0., 0.]);
    }

    #[test]
    fn all_common_words_give_zero_vector() {
        // Every image contains word 0, so idf[0] == 0 and the weighted
        // vector has zero norm.
        let bags = vec![bag_from(&[2, 0]), bag_from(&[1, 0])];
        let df = DocumentFrequency::from_corpus(2, &bags);
        let v = bow_vector(&bags[0], &df);
        assert_eq!(v, vec![0., 0.]);
    }

    #[test]
    fn tfidf_scenario() {
        // Corpus size 2, df = [2, 1, 0, 0]; image bag {0: 2, 1: 1}.
        // idf[0] = ln(2/2) = 0, idf[1] = ln(2), so the weighted vector is
        // [0, ln(2)/3, 0, 0] which normalizes to [0, 1, 0, 0].
        let bags = vec![bag_from(&[2, 1, 0, 0]), bag_from(&[1, 0, 0, 0])];
        let df = DocumentFrequency::from_corpus(4, &bags);
        assert_eq!(df.df(0), 2);
        assert_eq!(df.df(1), 1);
        let v = bow_vector(&bags[0], &df);
        assert!((v[1] - 1.).abs() < 1e-6);
        assert_eq!(v[0], 0.);
        assert_eq!(v[2], 0.);
        assert_eq!(v[3], 0.);
    }

    #[test]
    fn cosine_self_distance_is_zero() {
        let v: BoW = vec![0.6, 0.8, 0.];
        assert!(v.cosine(&v).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_symmetric() {
        let a: BoW = vec![1., 0., 0.];
        let b: BoW = vec![0., 1., 0.];
        assert_eq!(a.cosine(&b), b.cosine(&a));
        assert!((a.cosine(&b) - 1.).abs() < 1e-6);
    }

    #[test]
    fn cosine_against_zero_vector_is_one() {
        let zero: BoW = vec![0., 0.];
        let v: BoW = vec![1., 0.];
        assert_eq!(v.cosine(&zero), 1.);
        assert_eq!(zero.cosine(&v), 1.);
        assert_eq!(zero.cosine(&zero), 1.);
    }
}
