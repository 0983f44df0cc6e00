use super::chunk::{Admission, Chunker, merge_chunk};
use crate::config::HardeningConfig;
use crate::error::{FilterError, Result};
use crate::filter::{AnyFilter, EncodingFilter};
use crate::record::record_lines;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Reading,
    Merging,
    Noising,
    Writing,
    Done,
}

/// Counters for one hardening run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardeningReport {
    pub lines_read: usize,
    pub malformed: usize,
    pub unlabeled_dropped: usize,
    pub chunks: usize,
    pub merged_groups: usize,
    pub filters_written: usize,
    /// Filters still buffered at end of input; they are not written.
    pub leftover: usize,
}

/// Streams serialized filters through chunking, merging and noise.
///
/// Every random choice comes from the generator handed to
/// [`HardeningPipeline::new`], so a fixed seed gives a fixed output.
pub struct HardeningPipeline<R: RngCore> {
    config: HardeningConfig,
    rng: R,
    state: PipelineState,
}

impl HardeningPipeline<StdRng> {
    /// Builds a pipeline from the seed stored in the configuration.
    pub fn seeded(config: HardeningConfig) -> Result<Self> {
        let seed = config.seed.ok_or_else(|| {
            FilterError::InvalidConfig(
                "A seed is required to build a seeded pipeline".into(),
            )
        })?;
        Self::new(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: RngCore> HardeningPipeline<R> {
    pub fn new(config: HardeningConfig, rng: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng,
            state: PipelineState::Reading,
        })
    }

    pub fn config(&self) -> &HardeningConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "Pipeline state change");
            self.state = next;
        }
    }

    /// Hardens `input` into `output`, which is written from the start;
    /// truncating an existing file is the caller's job (see
    /// [`HardeningPipeline::run_files`]).
    ///
    /// On a fatal error the chunks hardened so far are still written.
    pub fn run<I: BufRead, W: Write>(
        &mut self,
        input: I,
        mut output: W,
    ) -> Result<HardeningReport> {
        let mut report = HardeningReport::default();
        let mut batch = Vec::with_capacity(self.config.effective_chunk_size());

        self.transition(PipelineState::Reading);
        let consumed =
            self.consume(input, &mut output, &mut batch, &mut report);
        if let Err(e) = consumed {
            warn!(
                written = report.filters_written,
                "Hardening aborted: {}", e
            );
            write_batch(&mut output, &mut batch)?;
            output.flush()?;
            return Err(e);
        }

        self.transition(PipelineState::Writing);
        write_batch(&mut output, &mut batch)?;
        output.flush()?;
        self.transition(PipelineState::Done);

        info!(
            lines = report.lines_read,
            malformed = report.malformed,
            dropped = report.unlabeled_dropped,
            chunks = report.chunks,
            written = report.filters_written,
            "Hardening finished"
        );
        Ok(report)
    }

    fn consume<I: BufRead, W: Write>(
        &mut self,
        input: I,
        output: &mut W,
        batch: &mut Vec<String>,
        report: &mut HardeningReport,
    ) -> Result<()> {
        let mut chunker = Chunker::new(
            self.config.merge_mode,
            self.config.anonymity_level,
        );
        let batch_size = self.config.effective_chunk_size();

        for (idx, line) in record_lines(input).enumerate() {
            report.lines_read += 1;
            let decoded =
                line.and_then(|line| self.config.filter.decode_line(&line));
            let filter = match decoded {
                Ok(filter) => filter,
                Err(e) if e.is_recoverable() => {
                    warn!(
                        line = idx + 1,
                        "Could not parse filter, skipping: {}", e
                    );
                    report.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match chunker.push(filter) {
                Admission::Buffered => {}
                Admission::Dropped => report.unlabeled_dropped += 1,
                Admission::Flushed(chunk) => {
                    let hardened = self.harden_chunk(chunk, report)?;
                    self.transition(PipelineState::Writing);
                    batch.extend(hardened.iter().map(EncodingFilter::to_line));
                    report.filters_written += hardened.len();
                    if batch.len() >= batch_size {
                        write_batch(output, batch)?;
                    }
                    self.transition(PipelineState::Reading);
                }
            }
        }

        report.leftover = chunker.pending();
        if report.leftover > 0 {
            warn!(
                leftover = report.leftover,
                k = self.config.anonymity_level,
                "Input ended before the last chunks were complete; \
                 those filters are not written"
            );
        }
        Ok(())
    }

    /// Creates (or empties) `output` before reading `input`.
    pub fn run_files(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<HardeningReport> {
        let writer = BufWriter::new(File::create(output.as_ref())?);
        let reader = BufReader::new(File::open(input.as_ref())?);
        self.run(reader, writer)
    }

    fn harden_chunk(
        &mut self,
        mut chunk: Vec<AnyFilter>,
        report: &mut HardeningReport,
    ) -> Result<Vec<AnyFilter>> {
        report.chunks += 1;
        let k = self.config.anonymity_level;

        if k > 1 && chunk.len() >= k {
            self.transition(PipelineState::Merging);
            let inputs = chunk.len();
            chunk = merge_chunk(chunk, k, &mut self.rng)?;
            report.merged_groups += chunk.len();
            debug!(inputs, outputs = chunk.len(), "Merged chunk");
        }

        let noise_level = self.config.noise_level;
        if noise_level > 0.0 {
            self.transition(PipelineState::Noising);
            for filter in chunk.iter_mut() {
                filter.fill_with_noise(noise_level, &mut self.rng)?;
            }
        }

        Ok(chunk)
    }
}

fn write_batch<W: Write>(
    output: &mut W,
    batch: &mut Vec<String>,
) -> Result<()> {
    for line in batch.drain(..) {
        writeln!(output, "{line}")?;
    }
    Ok(())
}

impl<R: RngCore> std::fmt::Debug for HardeningPipeline<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardeningPipeline")
            .field("kind", &self.config.filter.kind)
            .field("k", &self.config.anonymity_level)
            .field("noise_level", &self.config.noise_level)
            .field("mode", &self.config.merge_mode)
            .field("chunk_size", &self.config.effective_chunk_size())
            .field("state", &self.state)
            .finish()
    }
}
