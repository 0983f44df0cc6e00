use crate::config::MergeMode;
use crate::error::Result;
use crate::filter::{AnyFilter, EncodingFilter, Label};
use rand::RngCore;
use rand::seq::SliceRandom;
use tracing::debug;

/// What happened to a filter handed to [`Chunker::push`].
#[derive(Debug)]
pub enum Admission {
    /// Held until its bucket reaches a multiple of k.
    Buffered,
    /// The bucket filled up and is handed back as a chunk.
    Flushed(Vec<AnyFilter>),
    /// Unlabeled records never take part in hardening.
    Dropped,
}

/// Buffers filters into chunks whose length is a multiple of k.
///
/// In train mode fraud and benign records are kept apart so a merge never
/// mixes classes; in test mode all labeled records share one bucket.
#[derive(Debug)]
pub struct Chunker {
    mode: MergeMode,
    k: usize,
    fraud: Vec<AnyFilter>,
    benign: Vec<AnyFilter>,
    mixed: Vec<AnyFilter>,
}

impl Chunker {
    pub fn new(mode: MergeMode, k: usize) -> Self {
        Self {
            mode,
            k: k.max(1),
            fraud: Vec::new(),
            benign: Vec::new(),
            mixed: Vec::new(),
        }
    }

    pub fn push(&mut self, filter: AnyFilter) -> Admission {
        let k = self.k;
        let bucket = match (self.mode, filter.label()) {
            (_, Label::Unknown) => return Admission::Dropped,
            (MergeMode::Train, Label::Fraud) => &mut self.fraud,
            (MergeMode::Train, Label::Benign) => &mut self.benign,
            (MergeMode::Test, _) => &mut self.mixed,
        };
        bucket.push(filter);
        if bucket.len() % k == 0 {
            Admission::Flushed(std::mem::take(bucket))
        } else {
            Admission::Buffered
        }
    }

    /// Filters still waiting for a full chunk.
    pub fn pending(&self) -> usize {
        self.fraud.len() + self.benign.len() + self.mixed.len()
    }

    /// Filters that never completed a chunk.
    pub fn into_leftover(self) -> Vec<AnyFilter> {
        let mut rest = self.fraud;
        rest.extend(self.benign);
        rest.extend(self.mixed);
        rest
    }
}

/// Collapses a chunk into `len / k` filters, each the merge of exactly k
/// inputs.
///
/// The first `len / k` filters are anchors; the rest are shuffled and
/// handed out k - 1 at a time, so no filter is used twice. Filters beyond
/// `(len / k) * k` are discarded.
pub fn merge_chunk(
    mut chunk: Vec<AnyFilter>,
    k: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<AnyFilter>> {
    let groups = chunk.len() / k.max(1);
    if k <= 1 || groups == 0 {
        return Ok(chunk);
    }

    let mut donors: Vec<usize> = (groups..chunk.len()).collect();
    donors.shuffle(rng);

    let (anchors, rest) = chunk.split_at_mut(groups);
    for (i, anchor) in anchors.iter_mut().enumerate() {
        let members: Vec<usize> =
            donors.split_off(donors.len() - (k - 1));
        for &j in &members {
            anchor.merge(&rest[j - groups])?;
        }
        debug!(anchor = i, ?members, "Merged filters");
    }

    chunk.truncate(groups);
    Ok(chunk)
}
