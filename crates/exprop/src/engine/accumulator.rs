//! 🧺 Accumulator -- hold lines until the basket is full, then hand the basket over.
//!
//! 🎬 *[a line of JSON arrives. then another. then forty thousand more.]*
//! *[the basket fills. somewhere, a rate limiter checks its watch.]*
//!
//! 🧠 Knowledge graph:
//! - One accumulator per exported object. Created before the first line, dropped after the drain.
//! - `accumulate` appends and, the instant `pending_size_bytes >= size_threshold_bytes`, flushes.
//!   The check happens after the append, so a chunk may overshoot the threshold by at most one
//!   entry. Soft bound, on purpose.
//! - A flush is: throttle, propagate, record the outcome, reset. All under `&mut self`, so no
//!   other flush can sneak in between.
//! - `combine` folds a donor accumulator into this one so partitioned folds can be merged back
//!   in source order. Both operands are taken by value: an accumulator cannot be combined with
//!   itself, and nobody can be mutating either one mid-merge.

use std::sync::Arc;

use tracing::debug;

use crate::common::PropagationOutcome;
use crate::engine::throttler::Throttler;
use crate::error::EngineError;
use crate::propagators::Propagator;

/// 🧺 Pending entries, their running byte total, and the outcomes produced so far.
pub struct Accumulator {
    pending_entries: Vec<String>,
    pending_size_bytes: usize,
    size_threshold_bytes: usize,
    source_location: String,
    outcomes: Vec<PropagationOutcome>,
    propagator: Arc<dyn Propagator>,
    throttler: Throttler,
}

// 🐛 propagator is a trait object with no Debug bound. Nobody debugging an accumulator wants
// to read its sink's connection pool anyway.
impl std::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator")
            .field("source_location", &self.source_location)
            .field("pending_entries", &self.pending_entries.len())
            .field("pending_size_bytes", &self.pending_size_bytes)
            .field("size_threshold_bytes", &self.size_threshold_bytes)
            .field("outcomes", &self.outcomes.len())
            .field("throttler", &self.throttler)
            .finish()
    }
}

impl Accumulator {
    /// 🏗️ An empty accumulator bound to one source object.
    pub fn new(
        size_threshold_bytes: usize,
        source_location: impl Into<String>,
        propagator: Arc<dyn Propagator>,
        throttler: Throttler,
    ) -> Self {
        Self {
            pending_entries: Vec::new(),
            pending_size_bytes: 0,
            size_threshold_bytes,
            source_location: source_location.into(),
            outcomes: Vec::new(),
            propagator,
            throttler,
        }
    }

    /// 📥 Append one entry, and flush right now if that pushed us to the threshold.
    ///
    /// Duplicates are kept. The same line twice is two entries, two times the bytes.
    pub async fn accumulate(&mut self, entry: String) -> Result<&mut Self, EngineError> {
        self.pending_size_bytes += entry.len();
        self.pending_entries.push(entry);
        if self.pending_size_bytes >= self.size_threshold_bytes {
            self.trigger_propagation().await?;
        }
        Ok(self)
    }

    /// 🚿 Flush whatever is pending, threshold or not. No-op when nothing is pending.
    ///
    /// Called once at end of input so the last partial chunk is not left behind.
    pub async fn drain(&mut self) -> Result<&mut Self, EngineError> {
        if self.pending_size_bytes > 0 {
            self.trigger_propagation().await?;
        }
        Ok(self)
    }

    /// 🧾 Outcomes so far, in emission order.
    pub fn results(&self) -> &[PropagationOutcome] {
        &self.outcomes
    }

    pub fn into_results(self) -> Vec<PropagationOutcome> {
        self.outcomes
    }

    /// 🔀 Merge `donor` into `self`, keeping every entry in source order.
    ///
    /// `self` must hold the earlier partition and `donor` the later one. If the donor already
    /// propagated chunks, those chunks came after our pending remainder in the source, so our
    /// remainder is flushed first, then the donor's outcomes are appended. The donor's own
    /// pending entries are then re-accumulated through [`Accumulator::accumulate`], which may
    /// trigger threshold flushes of its own. When the donor has no outcomes this is plain
    /// re-accumulation.
    ///
    /// 💀 Refuses donors bound to a different source location.
    pub async fn combine(mut self, donor: Accumulator) -> Result<Accumulator, EngineError> {
        if self.source_location != donor.source_location {
            return Err(EngineError::SourceMismatch {
                receiver: self.source_location,
                donor: donor.source_location,
            });
        }

        let Accumulator {
            pending_entries: donor_pending,
            outcomes: donor_outcomes,
            ..
        } = donor;

        if !donor_outcomes.is_empty() {
            self.drain().await?;
            self.outcomes.extend(donor_outcomes);
        }
        for entry in donor_pending {
            self.accumulate(entry).await?;
        }
        Ok(self)
    }

    pub fn pending_entries(&self) -> &[String] {
        &self.pending_entries
    }

    pub fn pending_size_bytes(&self) -> usize {
        self.pending_size_bytes
    }

    pub fn size_threshold_bytes(&self) -> usize {
        self.size_threshold_bytes
    }

    pub fn source_location(&self) -> &str {
        &self.source_location
    }

    /// 🚀 throttle → propagate → record → reset. The whole flush, nothing interleaved.
    async fn trigger_propagation(&mut self) -> Result<(), EngineError> {
        self.throttler.throttle().await?;
        debug!(
            "🚀 propagating {} entries ({} bytes) from {}",
            self.pending_entries.len(),
            self.pending_size_bytes,
            self.source_location
        );
        let outcome = self
            .propagator
            .propagate(&self.source_location, &self.pending_entries)
            .await;
        self.outcomes.push(outcome);
        self.pending_entries.clear();
        self.pending_size_bytes = 0;
        Ok(())
    }
}
