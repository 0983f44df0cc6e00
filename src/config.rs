use crate::bloom::BloomFilter;
use crate::cmsketch::CountMinSketch;
use crate::error::{FilterError, Result};
use crate::filter::AnyFilter;
use crate::hash::HashStrategy;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which filter family and hash strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    #[default]
    UnkeyedBloom,
    KeyedBloom,
    CountMin,
    KeyedCountMin,
}

impl FilterKind {
    pub fn is_keyed(&self) -> bool {
        matches!(self, FilterKind::KeyedBloom | FilterKind::KeyedCountMin)
    }

    pub fn is_count_min(&self) -> bool {
        matches!(self, FilterKind::CountMin | FilterKind::KeyedCountMin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::UnkeyedBloom => "unkeyed-bloom",
            FilterKind::KeyedBloom => "keyed-bloom",
            FilterKind::CountMin => "count-min",
            FilterKind::KeyedCountMin => "keyed-count-min",
        }
    }
}

impl FromStr for FilterKind {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        // the short names are what older pseudonymized datasets were tagged with
        match s.trim().to_ascii_lowercase().as_str() {
            "unkeyed-bloom" | "murmur" | "bloom" => Ok(FilterKind::UnkeyedBloom),
            "keyed-bloom" | "keyed" => Ok(FilterKind::KeyedBloom),
            "count-min" | "count" => Ok(FilterKind::CountMin),
            "keyed-count-min" | "keyedcount" => Ok(FilterKind::KeyedCountMin),
            other => Err(FilterError::UnsupportedFilterType(other.to_string())),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape and hashing of a single filter.
#[derive(Clone, Debug, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct FilterConfig {
    /// Filter family
    #[builder(default)]
    pub kind: FilterKind,

    /// Bits for a Bloom filter (rounded up to a multiple of 8),
    /// counters per row for a Count-Min sketch
    #[builder(default = "1024")]
    pub size: usize,

    /// Hash rounds for a Bloom filter, rows for a Count-Min sketch
    #[builder(default = "3")]
    pub num_hashes: usize,

    /// Secret for the keyed variants
    #[builder(default, setter(into, strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::default(),
            size: 1024,
            num_hashes: 3,
            secret_key: None,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(FilterError::InvalidConfig("Size must be > 0".into()));
        }
        if self.size > u32::MAX as usize {
            return Err(FilterError::InvalidConfig(format!(
                "Size must be <= {}",
                u32::MAX
            )));
        }
        if self.num_hashes == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of hash functions must be >= 1".into(),
            ));
        }
        let has_key = self.secret_key.as_deref().is_some_and(|k| !k.is_empty());
        if self.kind.is_keyed() && !has_key {
            return Err(FilterError::InvalidConfig(format!(
                "Filter type '{}' requires a secret key",
                self.kind
            )));
        }
        if !self.kind.is_keyed() && has_key {
            return Err(FilterError::InvalidConfig(format!(
                "Filter type '{}' does not take a secret key",
                self.kind
            )));
        }
        Ok(())
    }

    pub fn hash_strategy(&self) -> HashStrategy {
        match (&self.secret_key, self.kind.is_keyed()) {
            (Some(key), true) => HashStrategy::keyed(key.clone()),
            _ => HashStrategy::Unkeyed,
        }
    }

    /// Creates an empty filter of the configured kind.
    pub fn build_filter(&self) -> Result<AnyFilter> {
        self.validate()?;
        let strategy = self.hash_strategy();
        Ok(if self.kind.is_count_min() {
            AnyFilter::CountMin(CountMinSketch::new(
                self.size,
                self.num_hashes,
                strategy,
            )?)
        } else {
            AnyFilter::Bloom(BloomFilter::new(
                self.size,
                self.num_hashes,
                strategy,
            )?)
        })
    }
}

/// Which records may be merged with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Only records with the same ground-truth label are merged.
    Train,
    /// Labels are ignored; unlabeled records are dropped.
    #[default]
    Test,
}

impl FromStr for MergeMode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(MergeMode::Train),
            "test" => Ok(MergeMode::Test),
            other => Err(FilterError::InvalidConfig(format!(
                "Unknown merge mode '{other}', expected 'train' or 'test'"
            ))),
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMode::Train => f.write_str("train"),
            MergeMode::Test => f.write_str("test"),
        }
    }
}

/// Settings for a hardening run.
#[derive(Clone, Debug, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct HardeningConfig {
    /// Shape used to decode the incoming records
    #[builder(default)]
    #[serde(default)]
    pub filter: FilterConfig,

    /// Number of records merged into one (k); 1 disables merging
    #[builder(default = "1")]
    pub anonymity_level: usize,

    /// Records buffered before a write; rounded up to a multiple of k
    #[builder(default = "100")]
    pub chunk_size: usize,

    /// Target fill level in percent; 0 disables noise
    #[builder(default = "0.0")]
    pub noise_level: f64,

    #[builder(default)]
    pub merge_mode: MergeMode,

    /// Seed for merge partitioning and noise placement
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl HardeningConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        if !self.noise_level.is_finite()
            || !(0.0..=100.0).contains(&self.noise_level)
        {
            return Err(FilterError::InvalidConfig(format!(
                "Noise level has to be in range [0, 100], got {}",
                self.noise_level
            )));
        }
        if self.anonymity_level == 0 {
            return Err(FilterError::InvalidConfig(
                "Anonymity level must be >= 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(FilterError::InvalidConfig(
                "Chunk size must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Smallest multiple of the anonymity level that is >= `chunk_size`.
    pub fn effective_chunk_size(&self) -> usize {
        let k = self.anonymity_level.max(1);
        self.chunk_size.max(1).div_ceil(k) * k
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Loads a saved profile and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::from_bytes(&std::fs::read(path)?)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_kind_accepts_legacy_tokens() {
        let parse = |name: &str| name.parse::<FilterKind>().unwrap();
        assert_eq!(parse("murmur"), FilterKind::UnkeyedBloom);
        assert_eq!(parse("keyed"), FilterKind::KeyedBloom);
        assert_eq!(parse("count"), FilterKind::CountMin);
        assert_eq!(
            "keyedcount".parse::<FilterKind>().unwrap(),
            FilterKind::KeyedCountMin
        );
        assert_eq!(
            "keyed-count-min".parse::<FilterKind>().unwrap(),
            FilterKind::KeyedCountMin
        );
    }

    #[test]
    fn test_effective_chunk_size_rounds_up() {
        let config = HardeningConfigBuilder::default()
            .anonymity_level(3)
            .chunk_size(10)
            .build()
            .unwrap();
        assert_eq!(config.effective_chunk_size(), 12);

        let config = HardeningConfigBuilder::default()
            .anonymity_level(5)
            .chunk_size(10)
            .build()
            .unwrap();
        assert_eq!(config.effective_chunk_size(), 10);
    }

    #[test]
    fn test_profile_roundtrip() {
        let config = HardeningConfigBuilder::default()
            .filter(
                FilterConfigBuilder::default()
                    .kind(FilterKind::KeyedCountMin)
                    .size(30)
                    .num_hashes(2)
                    .secret_key("k")
                    .build()
                    .unwrap(),
            )
            .anonymity_level(2)
            .noise_level(12.5)
            .merge_mode(MergeMode::Train)
            .seed(7)
            .build()
            .unwrap();
        let bytes = config.to_bytes().unwrap();
        let restored = HardeningConfig::from_bytes(&bytes).unwrap();
        assert_eq!(restored, config);
    }
}
