//! Pseudonymization of structured records into Bloom filters and Count-Min
//! sketches, plus hardening of the encoded records against frequency and
//! pattern attacks.
//!
//! HowTo:
//!    * Encoding: a record is split into tokens (words, n-grams, ...) by the
//!      caller, every token is inserted into a fresh filter and the filter is
//!      tagged with its ground-truth label.
//!    * Hashing: each token yields two 64-bit hashes, either from MurmurHash3
//!      (unkeyed) or from HMAC-MD5/HMAC-SHA1 under a secret (keyed). The k
//!      table positions are derived by double hashing `h1 + i * h2`.
//!    * Storage: one record per line, `<label>\t<base64 table>`.
//!
//! Hardening:
//!     * Records are buffered into chunks of k filters, per label when
//!       preparing training data.
//!     * Each chunk is collapsed into one filter by OR (Bloom) or counter-wise
//!       max (sketch), so every output stands for k inputs.
//!     * Optionally, random cells are set until each filter reaches a minimum
//!       fill level.
//!
//! Obvious problems:
//!     * Unkeyed filters can be attacked by anyone able to guess tokens; use
//!       the keyed variants for data that leaves the building.
//!     * Sketch counters are 16 bit and are not clamped.

pub mod bloom;
pub mod cmsketch;
pub mod config;
pub mod convert;
pub mod encoder;
mod error;
pub mod filter;
pub mod hardening;
mod hash;
pub mod mapping;
pub mod record;

pub use bloom::BloomFilter;
pub use cmsketch::CountMinSketch;
pub use config::{
    FilterConfig, FilterConfigBuilder, FilterConfigBuilderError, FilterKind,
    HardeningConfig, HardeningConfigBuilder, HardeningConfigBuilderError,
    MergeMode,
};
pub use convert::convert_to_libsvm;
pub use encoder::{Decomposition, EncodeReport, RecordEncoder};
pub use error::{FilterError, Result};
pub use filter::{AnyFilter, EncodingFilter, Label, SimilarityMode};
pub use hardening::{HardeningPipeline, HardeningReport, PipelineState};
pub use hash::{
    HashStrategy, canonical_element, double_hash_positions,
    optimal_bit_vector_size,
};
pub use mapping::TokenMapping;
pub use record::{Record, libsvm_line, record_lines};
