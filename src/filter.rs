use crate::bloom::BloomFilter;
use crate::cmsketch::CountMinSketch;
use crate::error::{FilterError, Result};
use crate::record::{Record, libsvm_line};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

/// Ground truth attached to an encoded record.
///
/// Ordered numerically, so `max` of two labels keeps a fraud mark over
/// the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Label {
    Benign = -1,
    #[default]
    Unknown = 0,
    Fraud = 1,
}

impl Label {
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    pub fn is_known(self) -> bool {
        self != Label::Unknown
    }
}

impl TryFrom<i64> for Label {
    type Error = FilterError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(Label::Fraud),
            -1 => Ok(Label::Benign),
            0 => Ok(Label::Unknown),
            other => Err(FilterError::MalformedRecord(format!(
                "label must be -1, 0 or 1, got {other}"
            ))),
        }
    }
}

impl From<Option<bool>> for Label {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Label::Fraud,
            Some(false) => Label::Benign,
            None => Label::Unknown,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// How [`EncodingFilter::similarity`] compares two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMode {
    /// One minus the Jaccard coefficient of the occupied positions.
    #[default]
    Jaccard,
    /// Ignores positions and compares totals (Bloom) or value sets (sketch).
    Simple,
}

/// Operations shared by every encoding.
///
/// Similarity is reported as a distance: 0.0 for identical tables,
/// 1.0 for tables with nothing in common.
pub trait EncodingFilter {
    fn label(&self) -> Label;
    fn set_label(&mut self, label: Label);

    /// Number of table cells (bits or counters).
    fn size(&self) -> usize;

    /// Percentage of non-zero cells.
    fn fill_level(&self) -> f64;

    /// Adds an element and returns the table indices it touched.
    fn insert(&mut self, elem: &str) -> Result<Vec<u32>>;

    fn contains(&self, elem: &str) -> Result<bool>;

    /// Flattened table, row-major for sketches.
    fn to_vector(&self) -> Vec<i32>;

    /// Raw bytes written into a serialized record.
    fn payload(&self) -> Vec<u8>;

    fn similarity(&self, other: &Self, mode: SimilarityMode) -> Result<f64>;

    fn merge(&mut self, other: &Self) -> Result<()>;

    /// Raises the fill level to `level` percent with random cells.
    fn fill_with_noise(&mut self, level: f64, rng: &mut dyn RngCore) -> Result<()>;

    fn to_record(&self) -> Record {
        Record::new(self.label(), self.payload())
    }

    fn to_line(&self) -> String {
        self.to_record().to_line()
    }

    fn to_libsvm(&self) -> String {
        libsvm_line(self.label(), &self.to_vector())
    }

    /// Hex SHA-256 of the payload, for spotting duplicate encodings.
    fn digest(&self) -> String {
        Sha256::digest(self.payload())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Percentage of non-zero cells in a table of `total` cells.
pub(crate) fn percent(non_zero: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * non_zero as f64 / total as f64
    }
}

/// Number of extra cells needed to reach `level` percent.
pub(crate) fn noise_budget(total: usize, non_zero: usize, level: f64) -> usize {
    let level = level.clamp(0.0, 100.0);
    let target = (total as f64 * level / 100.0).ceil() as usize;
    target.saturating_sub(non_zero)
}

/// One minus `shared / either`; an empty union counts as fully distant.
pub(crate) fn jaccard_distance(shared: usize, either: usize) -> f64 {
    if either == 0 {
        1.0
    } else {
        1.0 - shared as f64 / either as f64
    }
}

/// A filter of either family.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyFilter {
    Bloom(BloomFilter),
    CountMin(CountMinSketch),
}

impl AnyFilter {
    fn kind_name(&self) -> &'static str {
        match self {
            AnyFilter::Bloom(_) => "bloom filter",
            AnyFilter::CountMin(_) => "count-min sketch",
        }
    }

    fn mismatch(&self, other: &Self) -> FilterError {
        FilterError::InvalidConfig(format!(
            "cannot combine a {} with a {}",
            self.kind_name(),
            other.kind_name()
        ))
    }

    pub fn as_bloom(&self) -> Option<&BloomFilter> {
        match self {
            AnyFilter::Bloom(b) => Some(b),
            AnyFilter::CountMin(_) => None,
        }
    }

    pub fn as_count_min(&self) -> Option<&CountMinSketch> {
        match self {
            AnyFilter::CountMin(c) => Some(c),
            AnyFilter::Bloom(_) => None,
        }
    }
}

impl EncodingFilter for AnyFilter {
    fn label(&self) -> Label {
        match self {
            AnyFilter::Bloom(f) => f.label(),
            AnyFilter::CountMin(f) => f.label(),
        }
    }

    fn set_label(&mut self, label: Label) {
        match self {
            AnyFilter::Bloom(f) => f.set_label(label),
            AnyFilter::CountMin(f) => f.set_label(label),
        }
    }

    fn size(&self) -> usize {
        match self {
            AnyFilter::Bloom(f) => f.size(),
            AnyFilter::CountMin(f) => f.size(),
        }
    }

    fn fill_level(&self) -> f64 {
        match self {
            AnyFilter::Bloom(f) => f.fill_level(),
            AnyFilter::CountMin(f) => f.fill_level(),
        }
    }

    fn insert(&mut self, elem: &str) -> Result<Vec<u32>> {
        match self {
            AnyFilter::Bloom(f) => f.insert(elem),
            AnyFilter::CountMin(f) => f.insert(elem),
        }
    }

    fn contains(&self, elem: &str) -> Result<bool> {
        match self {
            AnyFilter::Bloom(f) => f.contains(elem),
            AnyFilter::CountMin(f) => f.contains(elem),
        }
    }

    fn to_vector(&self) -> Vec<i32> {
        match self {
            AnyFilter::Bloom(f) => f.to_vector(),
            AnyFilter::CountMin(f) => f.to_vector(),
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            AnyFilter::Bloom(f) => f.payload(),
            AnyFilter::CountMin(f) => f.payload(),
        }
    }

    fn similarity(&self, other: &Self, mode: SimilarityMode) -> Result<f64> {
        match (self, other) {
            (AnyFilter::Bloom(a), AnyFilter::Bloom(b)) => a.similarity(b, mode),
            (AnyFilter::CountMin(a), AnyFilter::CountMin(b)) => {
                a.similarity(b, mode)
            }
            _ => Err(self.mismatch(other)),
        }
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        match (&mut *self, other) {
            (AnyFilter::Bloom(a), AnyFilter::Bloom(b)) => return a.merge(b),
            (AnyFilter::CountMin(a), AnyFilter::CountMin(b)) => return a.merge(b),
            _ => {}
        }
        Err(self.mismatch(other))
    }

    fn fill_with_noise(&mut self, level: f64, rng: &mut dyn RngCore) -> Result<()> {
        match self {
            AnyFilter::Bloom(f) => f.fill_with_noise(level, rng),
            AnyFilter::CountMin(f) => f.fill_with_noise(level, rng),
        }
    }
}

impl From<BloomFilter> for AnyFilter {
    fn from(filter: BloomFilter) -> Self {
        AnyFilter::Bloom(filter)
    }
}

impl From<CountMinSketch> for AnyFilter {
    fn from(filter: CountMinSketch) -> Self {
        AnyFilter::CountMin(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_max_prefers_fraud() {
        assert_eq!(Label::Fraud.max(Label::Benign), Label::Fraud);
        assert_eq!(Label::Benign.max(Label::Fraud), Label::Fraud);
        assert_eq!(Label::Benign.max(Label::Benign), Label::Benign);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(Label::try_from(-1i64).unwrap(), Label::Benign);
        assert_eq!(Label::from(Some(true)), Label::Fraud);
        assert_eq!(Label::from(None), Label::Unknown);
        assert!(Label::try_from(2i64).is_err());
        assert_eq!(Label::Benign.to_string(), "-1");
    }

    #[test]
    fn test_noise_budget() {
        assert_eq!(noise_budget(24, 6, 50.0), 6);
        assert_eq!(noise_budget(24, 12, 50.0), 0);
        assert_eq!(noise_budget(24, 13, 50.0), 0);
        // ceil(30 * 0.1) = 3
        assert_eq!(noise_budget(30, 0, 10.0), 3);
    }

    #[test]
    fn test_jaccard_distance_empty_union() {
        assert_eq!(jaccard_distance(0, 0), 1.0);
        assert_eq!(jaccard_distance(2, 4), 0.5);
    }
}
