//! Count-Min sketch with 16-bit counters.
//!
//! Counters are kept row-major in a flat vector. Merging takes the
//! counter-wise maximum, not the sum.
use crate::error::{FilterError, Result};
use crate::filter::{
    EncodingFilter, Label, SimilarityMode, jaccard_distance, noise_budget,
    percent,
};
use crate::hash::HashStrategy;
use rand::seq::index;
use rand::{Rng, RngCore};
use std::collections::BTreeSet;

#[derive(Clone, PartialEq)]
pub struct CountMinSketch {
    counters: Vec<i16>,
    rows: usize,
    width: usize,
    strategy: HashStrategy,
    label: Label,
}

impl CountMinSketch {
    pub fn new(width: usize, rows: usize, strategy: HashStrategy) -> Result<Self> {
        if width == 0 {
            return Err(FilterError::InvalidConfig(
                "Sketch width must be > 0".into(),
            ));
        }
        if rows == 0 {
            return Err(FilterError::InvalidConfig(
                "Sketch needs at least one row".into(),
            ));
        }
        Ok(Self {
            counters: vec![0; rows * width],
            rows,
            width,
            strategy,
            label: Label::Unknown,
        })
    }

    /// Rebuilds a sketch from little-endian `i16` counters; the row count
    /// comes from the caller, the width from the payload length.
    pub fn from_payload(
        payload: &[u8],
        label: Label,
        rows: usize,
        strategy: HashStrategy,
    ) -> Result<Self> {
        if payload.is_empty() || payload.len() % 2 != 0 {
            return Err(FilterError::MalformedRecord(format!(
                "sketch payload of {} bytes is not a list of 16-bit counters",
                payload.len()
            )));
        }
        let cells = payload.len() / 2;
        if rows == 0 || cells % rows != 0 {
            return Err(FilterError::MalformedRecord(format!(
                "{cells} counters cannot be split into {rows} rows"
            )));
        }
        let mut sketch = Self::new(cells / rows, rows, strategy)?;
        sketch.counters = payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        sketch.label = label;
        Ok(sketch)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn counters(&self) -> &[i16] {
        &self.counters
    }

    pub fn max_counter(&self) -> i16 {
        self.counters.iter().copied().max().unwrap_or(0)
    }

    fn cells(&self, elem: &str) -> Result<Vec<usize>> {
        Ok(self
            .strategy
            .positions(elem, self.width, self.rows)?
            .into_iter()
            .enumerate()
            .map(|(row, col)| row * self.width + col as usize)
            .collect())
    }

    /// Upper bound on how often `elem` was inserted.
    pub fn estimate(&self, elem: &str) -> Result<i16> {
        Ok(self
            .cells(elem)?
            .into_iter()
            .map(|cell| self.counters[cell])
            .min()
            .unwrap_or(0))
    }

    fn check_shape(&self, other: &Self) -> Result<()> {
        if self.rows != other.rows || self.width != other.width {
            return Err(FilterError::SizeMismatch {
                expected: self.counters.len(),
                actual: other.counters.len(),
            });
        }
        Ok(())
    }

    fn non_zero(&self) -> usize {
        self.counters.iter().filter(|&&c| c != 0).count()
    }
}

impl EncodingFilter for CountMinSketch {
    fn label(&self) -> Label {
        self.label
    }

    fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    fn size(&self) -> usize {
        self.counters.len()
    }

    fn fill_level(&self) -> f64 {
        percent(self.non_zero(), self.counters.len())
    }

    /// Returns the column hit in each row.
    fn insert(&mut self, elem: &str) -> Result<Vec<u32>> {
        let columns = self.strategy.positions(elem, self.width, self.rows)?;
        for (row, &col) in columns.iter().enumerate() {
            let cell = &mut self.counters[row * self.width + col as usize];
            *cell = cell.wrapping_add(1);
        }
        Ok(columns)
    }

    fn contains(&self, elem: &str) -> Result<bool> {
        Ok(self.estimate(elem)? > 0)
    }

    fn to_vector(&self) -> Vec<i32> {
        self.counters.iter().map(|&c| c as i32).collect()
    }

    fn payload(&self) -> Vec<u8> {
        self.counters.iter().flat_map(|c| c.to_le_bytes()).collect()
    }

    fn similarity(&self, other: &Self, mode: SimilarityMode) -> Result<f64> {
        self.check_shape(other)?;
        match mode {
            SimilarityMode::Jaccard => {
                let (shared, either) = self
                    .counters
                    .iter()
                    .zip(&other.counters)
                    .fold((0usize, 0usize), |(s, e), (&a, &b)| {
                        (
                            s + (a != 0 && b != 0) as usize,
                            e + (a != 0 || b != 0) as usize,
                        )
                    });
                Ok(jaccard_distance(shared, either))
            }
            SimilarityMode::Simple => {
                let mine: BTreeSet<i16> = self.counters.iter().copied().collect();
                let theirs: BTreeSet<i16> =
                    other.counters.iter().copied().collect();
                let shared: i64 =
                    mine.intersection(&theirs).map(|&v| v as i64).sum();
                let either: i64 = mine.union(&theirs).map(|&v| v as i64).sum();
                // two all-zero sketches share no values worth comparing
                if either == 0 {
                    return Ok(1.0);
                }
                Ok(1.0 - shared as f64 / either as f64)
            }
        }
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        self.check_shape(other)?;
        for (s, &o) in self.counters.iter_mut().zip(&other.counters) {
            *s = (*s).max(o);
        }
        self.label = self.label.max(other.label);
        Ok(())
    }

    /// Zero counters picked for noise all receive one shared value drawn
    /// from `1..=max(1, largest counter)`.
    fn fill_with_noise(&mut self, level: f64, rng: &mut dyn RngCore) -> Result<()> {
        let wanted = noise_budget(self.counters.len(), self.non_zero(), level);
        if wanted == 0 {
            return Ok(());
        }
        let zeros: Vec<usize> = self
            .counters
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == 0)
            .map(|(i, _)| i)
            .collect();
        let amount = wanted.min(zeros.len());
        let ceiling = self.max_counter().max(1);
        let value: i16 = rng.random_range(1..=ceiling);
        for pick in index::sample(rng, zeros.len(), amount) {
            self.counters[zeros[pick]] = value;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CountMinSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountMinSketch")
            .field("rows", &self.rows)
            .field("width", &self.width)
            .field("non_zero", &self.non_zero())
            .field("label", &self.label)
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_width_is_not_rounded() {
        let sketch = CountMinSketch::new(30, 1, HashStrategy::Unkeyed).unwrap();
        assert_eq!(sketch.size(), 30);
        assert_eq!(sketch.to_vector().iter().sum::<i32>(), 0);
    }

    #[test]
    fn test_one_counter_per_row() {
        let mut sketch = CountMinSketch::new(30, 3, HashStrategy::Unkeyed).unwrap();
        let columns = sketch.insert("test").unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(sketch.to_vector().iter().sum::<i32>(), 3);
    }

    #[test]
    fn test_payload_is_little_endian() {
        let mut sketch = CountMinSketch::new(30, 1, HashStrategy::Unkeyed).unwrap();
        sketch.insert("test").unwrap();
        // "test" lands in column 26 of a 30-wide row
        let payload = sketch.payload();
        assert_eq!(payload.len(), 60);
        assert_eq!(&payload[52..54], &[1, 0]);
    }

    #[test]
    fn test_from_payload_rejects_odd_bytes() {
        let decode = |payload: &[u8], rows| {
            CountMinSketch::from_payload(
                payload,
                Label::Unknown,
                rows,
                HashStrategy::Unkeyed,
            )
        };
        assert!(decode(&[1, 0, 2], 1).is_err());
        assert!(decode(&[1, 0, 2, 0, 3, 0], 2).is_err());
    }

    #[test]
    fn test_noise_uses_one_shared_value() {
        let mut sketch = CountMinSketch::new(40, 1, HashStrategy::Unkeyed).unwrap();
        for _ in 0..5 {
            sketch.insert("frequent").unwrap();
        }
        let before = sketch.counters().to_vec();
        sketch
            .fill_with_noise(50.0, &mut StdRng::seed_from_u64(3))
            .unwrap();
        let added: BTreeSet<i16> = sketch
            .counters()
            .iter()
            .zip(&before)
            .filter(|(now, was)| now != was)
            .map(|(now, _)| *now)
            .collect();
        assert_eq!(added.len(), 1);
        let value = *added.iter().next().unwrap();
        assert!((1..=5).contains(&value));
        assert_eq!(sketch.fill_level(), 50.0);
    }

    #[test]
    fn test_noise_on_empty_sketch_writes_ones() {
        let mut sketch = CountMinSketch::new(10, 2, HashStrategy::Unkeyed).unwrap();
        sketch
            .fill_with_noise(25.0, &mut StdRng::seed_from_u64(9))
            .unwrap();
        // ceil(20 * 0.25) = 5
        assert_eq!(sketch.counters().iter().filter(|&&c| c == 1).count(), 5);
    }
}
