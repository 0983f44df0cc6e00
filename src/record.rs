//! Line format shared by every stage: `<label>\t<base64 payload>`.
use crate::bloom::BloomFilter;
use crate::cmsketch::CountMinSketch;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filter::{AnyFilter, Label};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::fmt::Write as _;
use std::io::BufRead;

/// A serialized filter before it is bound to a filter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub label: Label,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(label: Label, payload: Vec<u8>) -> Self {
        Self { label, payload }
    }

    /// Parses one line; surrounding whitespace and the line break are ignored.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut fields = line.trim().split('\t');
        let (Some(label), Some(payload), None) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(FilterError::MalformedRecord(
                "expected '<label>\\t<payload>'".into(),
            ));
        };
        let label = label.trim().parse::<i64>().map_err(|e| {
            FilterError::MalformedRecord(format!("invalid label '{label}': {e}"))
        })?;
        Ok(Self {
            label: Label::try_from(label)?,
            payload: STANDARD.decode(payload.trim())?,
        })
    }

    /// The line without its trailing newline.
    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.label, STANDARD.encode(&self.payload))
    }
}

/// Splits `input` on `\n` without requiring the stream to be UTF-8.
///
/// A line that does not decode comes back as [`FilterError::MalformedRecord`]
/// so callers can skip it; read failures stay [`FilterError::Io`].
pub fn record_lines<R: BufRead>(
    input: R,
) -> impl Iterator<Item = Result<String>> {
    input.split(b'\n').map(|bytes| -> Result<String> {
        String::from_utf8(bytes?).map_err(|e| {
            FilterError::MalformedRecord(format!(
                "line is not valid UTF-8: {}",
                e.utf8_error()
            ))
        })
    })
}

/// `<label> <index>:<value> ...` with 1-based indices and zeros left out.
pub fn libsvm_line(label: Label, vector: &[i32]) -> String {
    let mut out = label.to_string();
    for (i, value) in vector.iter().enumerate().filter(|(_, v)| **v != 0) {
        // writing into a String cannot fail
        let _ = write!(out, " {}:{}", i + 1, value);
    }
    out
}

impl FilterConfig {
    /// Binds a record to this configuration's filter family and hashing.
    ///
    /// The payload must match the configured shape: `ceil(size / 8)` bytes
    /// for a Bloom filter, `num_hashes * size` counters for a sketch.
    pub fn decode_record(&self, record: Record) -> Result<AnyFilter> {
        self.check_payload_len(record.payload.len())?;
        let strategy = self.hash_strategy();
        if self.kind.is_count_min() {
            CountMinSketch::from_payload(
                &record.payload,
                record.label,
                self.num_hashes,
                strategy,
            )
            .map(AnyFilter::from)
        } else {
            BloomFilter::from_payload(
                record.payload,
                record.label,
                self.num_hashes,
                strategy,
            )
            .map(AnyFilter::from)
        }
    }

    pub fn decode_line(&self, line: &str) -> Result<AnyFilter> {
        self.decode_record(Record::parse_line(line)?)
    }

    fn check_payload_len(&self, actual: usize) -> Result<()> {
        let expected = if self.kind.is_count_min() {
            self.num_hashes
                .checked_mul(self.size)
                .and_then(|cells| cells.checked_mul(2))
        } else {
            Some(self.size.div_ceil(8))
        };
        match expected {
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(FilterError::MalformedRecord(format!(
                "payload has {actual} bytes, a {} of size {} needs {expected}",
                self.kind, self.size
            ))),
            None => Err(FilterError::InvalidConfig(format!(
                "Size {} with {} rows overflows",
                self.size, self.num_hashes
            ))),
        }
    }
}
