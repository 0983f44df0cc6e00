use crate::error::{FilterError, Result};
use hmac::{Hmac, Mac};
use md5::Md5;
use murmur3::murmur3_32;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::fmt::Write as _;
use std::io::Cursor;

type HmacMd5 = Hmac<Md5>;
type HmacSha1 = Hmac<Sha1>;

/// Derives `count` table indices from two base hashes.
///
/// The i-th index is `(h1 + i * h2) mod table_size`, computed with unsigned
/// 64-bit wraparound. Repeated indices are kept.
///
/// `table_size` must be non-zero.
pub fn double_hash_positions(
    h1: u64,
    h2: u64,
    table_size: u32,
    count: u32,
) -> Vec<u32> {
    let m = table_size as u64;
    (0..count as u64)
        .map(|i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as u32)
        .collect()
}

/// Renders an element as a JSON string literal with all non-ASCII escaped.
///
/// Hashes are computed over this rendering, not over the raw string.
pub fn canonical_element(elem: &str) -> String {
    let mut out = String::with_capacity(elem.len() + 2);
    out.push('"');
    for ch in elem.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || !c.is_ascii() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    // writing into a String cannot fail
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub(crate) fn hash_murmur32(key: &[u8], seed: u32) -> u32 {
    let mut cursor = Cursor::new(key);
    // reading from an in-memory cursor never fails
    murmur3_32(&mut cursor, seed).unwrap_or_default()
}

/// Sign-extends a 32-bit hash into the 64-bit space used for double hashing.
fn widen_signed(h: u32) -> u64 {
    h as i32 as i64 as u64
}

/// Low 64 bits of a digest read as a big-endian integer.
fn low_u64_be(digest: &[u8]) -> u64 {
    digest[digest.len().saturating_sub(8)..]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Pair of hash functions feeding [`double_hash_positions`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashStrategy {
    /// MurmurHash3 seeded with 0, then seeded with the first result.
    Unkeyed,
    /// HMAC-MD5 and HMAC-SHA1 under a secret key.
    Keyed { key: String },
}

impl HashStrategy {
    pub fn keyed(key: impl Into<String>) -> Self {
        HashStrategy::Keyed { key: key.into() }
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, HashStrategy::Keyed { .. })
    }

    /// Computes `(h1, h2)` for an element.
    pub fn hash_pair(&self, elem: &str) -> Result<(u64, u64)> {
        let canonical = canonical_element(elem);
        let bytes = canonical.as_bytes();
        match self {
            HashStrategy::Unkeyed => {
                let h1 = hash_murmur32(bytes, 0);
                let h2 = hash_murmur32(bytes, h1);
                Ok((widen_signed(h1), widen_signed(h2)))
            }
            HashStrategy::Keyed { key } => {
                let mut md5 = HmacMd5::new_from_slice(key.as_bytes())
                    .map_err(|e| FilterError::InvalidConfig(e.to_string()))?;
                md5.update(bytes);
                let mut sha1 = HmacSha1::new_from_slice(key.as_bytes())
                    .map_err(|e| FilterError::InvalidConfig(e.to_string()))?;
                sha1.update(bytes);
                Ok((
                    low_u64_be(&md5.finalize().into_bytes()),
                    low_u64_be(&sha1.finalize().into_bytes()),
                ))
            }
        }
    }

    /// Table indices for an element, one per hash round.
    pub fn positions(
        &self,
        elem: &str,
        table_size: usize,
        count: usize,
    ) -> Result<Vec<u32>> {
        if table_size == 0 || table_size > u32::MAX as usize {
            return Err(FilterError::InvalidConfig(format!(
                "table size {table_size} is outside 1..=u32::MAX"
            )));
        }
        let (h1, h2) = self.hash_pair(elem)?;
        Ok(double_hash_positions(h1, h2, table_size as u32, count as u32))
    }
}

// The key never shows up in logs or panics.
impl std::fmt::Debug for HashStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashStrategy::Unkeyed => write!(f, "Unkeyed"),
            HashStrategy::Keyed { .. } => write!(f, "Keyed {{ key: <redacted> }}"),
        }
    }
}

/// Number of bits for `n` elements at false positive rate `fpr`,
/// rounded up to whole bytes.
pub fn optimal_bit_vector_size(n: usize, fpr: f64) -> usize {
    let ln2 = std::f64::consts::LN_2;
    let bits = ((-(n as f64) * fpr.ln()) / (ln2 * ln2)).ceil() as usize;
    round_up_to_byte(bits)
}

pub fn round_up_to_byte(bits: usize) -> usize {
    bits.div_ceil(8) * 8
}
