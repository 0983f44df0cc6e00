//! Privacy hardening of serialized filter streams.
//!
//! Records are buffered into label-aware chunks of k filters, each chunk is
//! collapsed into OR/max merges of k records, and every surviving filter can
//! be topped up with random cells until it reaches a minimum fill level.
//! Merging makes a single output indistinguishable among k inputs; noise
//! hides how sparse a record was.
pub mod chunk;
pub mod pipeline;

pub use chunk::{Admission, Chunker, merge_chunk};
pub use pipeline::{HardeningPipeline, HardeningReport, PipelineState};
