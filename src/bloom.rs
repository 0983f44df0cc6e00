//! Double-hashing Bloom filter over a byte-aligned bit table.
//!
//! The table is stored least-significant-bit first, so the raw bytes of the
//! bit vector are exactly the serialized payload.
use crate::error::{FilterError, Result};
use crate::filter::{
    EncodingFilter, Label, SimilarityMode, jaccard_distance, noise_budget,
    percent,
};
use crate::hash::{HashStrategy, optimal_bit_vector_size, round_up_to_byte};
use bitvec::{bitvec, order::Lsb0, vec::BitVec};
use rand::RngCore;
use rand::seq::index;

#[derive(Clone, PartialEq)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    num_hashes: usize,
    strategy: HashStrategy,
    label: Label,
}

impl BloomFilter {
    /// Empty filter of at least `num_bits` bits, rounded up to whole bytes.
    pub fn new(
        num_bits: usize,
        num_hashes: usize,
        strategy: HashStrategy,
    ) -> Result<Self> {
        if num_bits == 0 {
            return Err(FilterError::InvalidConfig(
                "Bloom filter needs at least one bit".into(),
            ));
        }
        if num_hashes == 0 {
            return Err(FilterError::InvalidConfig(
                "Number of hash functions must be >= 1".into(),
            ));
        }
        Ok(Self {
            bits: bitvec![u8, Lsb0; 0; round_up_to_byte(num_bits)],
            num_hashes,
            strategy,
            label: Label::Unknown,
        })
    }

    /// Sizes the table for `capacity` elements at `error_rate`.
    pub fn with_capacity(
        capacity: usize,
        error_rate: f64,
        num_hashes: usize,
        strategy: HashStrategy,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(FilterError::InvalidConfig("Capacity must be > 0".into()));
        }
        if error_rate <= 0.0 || error_rate >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "Error rate must be between 0 and 1".into(),
            ));
        }
        Self::new(
            optimal_bit_vector_size(capacity, error_rate),
            num_hashes,
            strategy,
        )
    }

    /// Rebuilds a filter from a serialized payload; the table takes the
    /// payload's length.
    pub fn from_payload(
        payload: Vec<u8>,
        label: Label,
        num_hashes: usize,
        strategy: HashStrategy,
    ) -> Result<Self> {
        if payload.is_empty() {
            return Err(FilterError::MalformedRecord(
                "empty bloom filter payload".into(),
            ));
        }
        let mut filter = Self::new(payload.len() * 8, num_hashes, strategy)?;
        filter.bits = BitVec::from_vec(payload);
        filter.label = label;
        Ok(filter)
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn bits(&self) -> &BitVec<u8, Lsb0> {
        &self.bits
    }

    fn check_size(&self, other: &Self) -> Result<()> {
        if self.bits.len() != other.bits.len() {
            return Err(FilterError::SizeMismatch {
                expected: self.bits.len(),
                actual: other.bits.len(),
            });
        }
        Ok(())
    }

    fn positions(&self, elem: &str) -> Result<Vec<u32>> {
        self.strategy
            .positions(elem, self.bits.len(), self.num_hashes)
    }
}

impl EncodingFilter for BloomFilter {
    fn label(&self) -> Label {
        self.label
    }

    fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    fn size(&self) -> usize {
        self.bits.len()
    }

    fn fill_level(&self) -> f64 {
        percent(self.bits.count_ones(), self.bits.len())
    }

    fn insert(&mut self, elem: &str) -> Result<Vec<u32>> {
        let positions = self.positions(elem)?;
        for &idx in &positions {
            self.bits.set(idx as usize, true);
        }
        Ok(positions)
    }

    fn contains(&self, elem: &str) -> Result<bool> {
        Ok(self
            .positions(elem)?
            .iter()
            .all(|&idx| self.bits[idx as usize]))
    }

    fn to_vector(&self) -> Vec<i32> {
        self.bits.iter().map(|bit| *bit as i32).collect()
    }

    fn payload(&self) -> Vec<u8> {
        self.bits.as_raw_slice().to_vec()
    }

    fn similarity(&self, other: &Self, mode: SimilarityMode) -> Result<f64> {
        self.check_size(other)?;
        match mode {
            SimilarityMode::Jaccard => {
                let (shared, either) = self
                    .bits
                    .as_raw_slice()
                    .iter()
                    .zip(other.bits.as_raw_slice())
                    .fold((0usize, 0usize), |(s, e), (a, b)| {
                        (
                            s + (a & b).count_ones() as usize,
                            e + (a | b).count_ones() as usize,
                        )
                    });
                Ok(jaccard_distance(shared, either))
            }
            SimilarityMode::Simple => {
                let diff = self.count_ones().abs_diff(other.count_ones());
                Ok(diff as f64 / self.bits.len() as f64)
            }
        }
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        self.check_size(other)?;
        for (s, o) in self
            .bits
            .as_raw_mut_slice()
            .iter_mut()
            .zip(other.bits.as_raw_slice())
        {
            *s |= *o;
        }
        self.label = self.label.max(other.label);
        Ok(())
    }

    fn fill_with_noise(&mut self, level: f64, rng: &mut dyn RngCore) -> Result<()> {
        let wanted =
            noise_budget(self.bits.len(), self.bits.count_ones(), level);
        if wanted == 0 {
            return Ok(());
        }
        let zeros: Vec<usize> = self.bits.iter_zeros().collect();
        let amount = wanted.min(zeros.len());
        for pick in index::sample(rng, zeros.len(), amount) {
            self.bits.set(zeros[pick], true);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bits", &self.bits.len())
            .field("num_hashes", &self.num_hashes)
            .field("set", &self.bits.count_ones())
            .field("label", &self.label)
            .field("strategy", &self.strategy)
            .finish()
    }
}
