//! Token to table-position mapping, written next to an encoded dataset so
//! a classifier's heavy features can be traced back to input tokens.
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

#[derive(Debug, Clone, Default)]
pub struct TokenMapping {
    decomposition: String,
    ngram_len: usize,
    /// Bin width per numeric field, declared by tokenizers that discretize
    bin_sizes: BTreeMap<String, u32>,
    index: HashMap<String, usize>,
    entries: Vec<(String, Vec<u32>)>,
}

impl TokenMapping {
    pub fn new(decomposition: impl Into<String>, ngram_len: usize) -> Self {
        Self {
            decomposition: decomposition.into(),
            ngram_len,
            ..Default::default()
        }
    }

    pub fn with_bin_sizes(mut self, bin_sizes: BTreeMap<String, u32>) -> Self {
        self.bin_sizes = bin_sizes;
        self
    }

    /// Keeps the first position list reported for a token.
    pub fn record(&mut self, token: &str, positions: &[u32]) {
        if !self.index.contains_key(token) {
            self.index.insert(token.to_string(), self.entries.len());
            self.entries.push((token.to_string(), positions.to_vec()));
        }
    }

    pub fn get(&self, token: &str) -> Option<&[u32]> {
        self.index
            .get(token)
            .map(|&i| self.entries[i].1.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header lines, then `<token>:[p1, p2, ...]` in first-seen order.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "decomposition_type:{}", self.decomposition)?;
        writeln!(out, "ngram_len:{}", self.ngram_len)?;
        let bin_sizes = serde_json::to_string(&self.bin_sizes)?;
        writeln!(out, "bin_sizes:{bin_sizes}")?;
        for (token, positions) in &self.entries {
            let list = positions
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "{token}:[{list}]")?;
        }
        out.flush()?;
        Ok(())
    }
}
