//! 🎬 *[an object lands in the channel. a worker picks it up. nobody says thank you.]*
//!
//! 📄 The FileWorker: one object at a time, one accumulator per object, one receipt per object.
//!
//! 🧠 Knowledge graph:
//! - Every object gets a fresh `Accumulator` and a fresh `Throttler`. The minimum interval is
//!   per file; two workers on two files do not wait on each other.
//! - Read faults end the file, never the worker. They come back as a [`FileReport`] carrying
//!   the reason and whatever chunks made it out before the fault.
//! - A throttle interruption ends the worker. The report for the interrupted file still goes
//!   out first, so the chunks it already sent are counted and logged; then the worker returns
//!   `Err` and the supervisor stops the run.
//! - Progress is fed from the side: [`MeteredLines`] watches the lines go by, and
//!   [`TallyingPropagator`] counts chunks. The engine knows about neither.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use indicatif::MultiProgress;
use object_store::ObjectStore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Worker;
use crate::app_config::PropagationConfig;
use crate::common::PropagationOutcome;
use crate::engine::{Accumulator, InterruptSignal, LineSource, Throttler, process_lines};
use crate::error::FileFailure;
use crate::progress::ProgressMetrics;
use crate::propagators::Propagator;
use crate::sources::ObjectLines;
use crate::storage::ExportedObject;

/// 🧾 What one object produced. `failure` is set when the object stopped early.
#[derive(Debug)]
pub(crate) struct FileReport {
    /// 🔢 Position in the listing, so the supervisor can put reports back in order.
    pub(crate) sequence: usize,
    pub(crate) source_location: String,
    pub(crate) outcomes: Vec<PropagationOutcome>,
    pub(crate) lines_read: u64,
    pub(crate) failure: Option<String>,
    /// 🚨 The file stopped because the interrupt button was pressed during a throttle wait.
    pub(crate) interrupted: bool,
}

/// 📄 Pulls `(sequence, object)` pairs off the channel and propagates each object's lines.
pub(crate) struct FileWorker {
    worker_id: usize,
    rx: Receiver<(usize, ExportedObject)>,
    reports: Sender<FileReport>,
    store: Arc<dyn ObjectStore>,
    propagator: Arc<dyn Propagator>,
    propagation: PropagationConfig,
    interrupt: InterruptSignal,
    board: MultiProgress,
}

impl FileWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        worker_id: usize,
        rx: Receiver<(usize, ExportedObject)>,
        reports: Sender<FileReport>,
        store: Arc<dyn ObjectStore>,
        propagator: Arc<dyn Propagator>,
        propagation: PropagationConfig,
        interrupt: InterruptSignal,
        board: MultiProgress,
    ) -> Self {
        Self {
            worker_id,
            rx,
            reports,
            store,
            propagator,
            propagation,
            interrupt,
            board,
        }
    }

    /// 📖 Run one object start to finish. Whatever happens, there is a report.
    async fn process(&self, sequence: usize, object: ExportedObject) -> FileReport {
        debug!(
            "📄 worker {} picked up '{}' ({} bytes)",
            self.worker_id, object.source_location, object.size_bytes
        );

        let lines = match ObjectLines::open(&*self.store, &object).await {
            Ok(lines) => lines,
            Err(err) => {
                let reason = format!("{err:#}");
                warn!("💀 skipping '{}': {}", object.source_location, reason);
                return FileReport {
                    sequence,
                    source_location: object.source_location,
                    outcomes: Vec::new(),
                    lines_read: 0,
                    failure: Some(reason),
                    interrupted: false,
                };
            }
        };

        // -- the listed size of a gzipped object says nothing about how many bytes come out
        let total_size = if lines.is_inflated() { 0 } else { object.size_bytes };
        let metrics = ProgressMetrics::new(&self.board, object.source_location.clone(), total_size);
        let chunks = Arc::new(AtomicU64::new(0));
        let propagator = Arc::new(TallyingPropagator {
            inner: self.propagator.clone(),
            chunks: chunks.clone(),
        });

        let throttler = Throttler::from_millis(self.propagation.min_interval_millis)
            .with_interrupt(self.interrupt.clone());
        let accumulator = Accumulator::new(
            self.propagation.size_threshold_bytes,
            object.source_location.clone(),
            propagator,
            throttler,
        );

        let mut metered = MeteredLines::new(lines, metrics, chunks);
        let result = process_lines(&mut metered, accumulator).await;
        let lines_read = metered.finish();

        match result {
            Ok(outcomes) => {
                debug!(
                    "✅ worker {} finished '{}': {} line(s), {} chunk(s)",
                    self.worker_id,
                    object.source_location,
                    lines_read,
                    outcomes.len()
                );
                FileReport {
                    sequence,
                    source_location: object.source_location,
                    outcomes,
                    lines_read,
                    failure: None,
                    interrupted: false,
                }
            }
            Err(failure) => {
                let interrupted = failure.is_interruption();
                let FileFailure {
                    source_location,
                    outcomes,
                    error,
                } = failure;
                let reason = format!("{:#}", anyhow::Error::new(error));
                FileReport {
                    sequence,
                    source_location,
                    outcomes,
                    lines_read,
                    failure: Some(reason),
                    interrupted,
                }
            }
        }
    }
}

impl Worker for FileWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("📥 FileWorker {} started draining channel...", self.worker_id);
            while let Ok((sequence, object)) = self.rx.recv().await {
                let report = self.process(sequence, object).await;
                // -- the receipt goes out before the bail, the chunks in it have already left
                let interruption = report.interrupted.then(|| {
                    format!(
                        "💀 worker {} was interrupted on '{}' after {} propagated chunk(s): {}",
                        self.worker_id,
                        report.source_location,
                        report.outcomes.len(),
                        report.failure.as_deref().unwrap_or_default()
                    )
                });
                self.reports
                    .send(report)
                    .await
                    .context("💀 The report channel closed under a running worker")?;
                if let Some(interruption) = interruption {
                    anyhow::bail!(interruption);
                }
            }
            debug!("🏁 FileWorker {}: channel closed. Shutting down.", self.worker_id);
            Ok(())
        })
    }
}

/// 🔢 Passes chunks through to the real propagator and counts them on the way.
struct TallyingPropagator {
    inner: Arc<dyn Propagator>,
    chunks: Arc<AtomicU64>,
}

#[async_trait]
impl Propagator for TallyingPropagator {
    async fn propagate(&self, source_location: &str, entries: &[String]) -> PropagationOutcome {
        let outcome = self.inner.propagate(source_location, entries).await;
        self.chunks.fetch_add(1, Ordering::Relaxed);
        outcome
    }
}

/// 📊 A line source that reports its own progress.
///
/// The bar moves whenever another piece of the object has been pulled off the stream, and one
/// last time at the end.
struct MeteredLines<L> {
    inner: L,
    metrics: ProgressMetrics,
    chunks: Arc<AtomicU64>,
    reported_bytes: u64,
    unreported_lines: u64,
}

impl<L> MeteredLines<L> {
    fn new(inner: L, metrics: ProgressMetrics, chunks: Arc<AtomicU64>) -> Self {
        Self {
            inner,
            metrics,
            chunks,
            reported_bytes: 0,
            unreported_lines: 0,
        }
    }

    fn report(&mut self, bytes_now: u64) {
        let bytes_delta = bytes_now.saturating_sub(self.reported_bytes);
        self.metrics.update(
            bytes_delta,
            self.unreported_lines,
            self.chunks.load(Ordering::Relaxed),
        );
        self.reported_bytes = bytes_now;
        self.unreported_lines = 0;
    }

    /// ✅ Final redraw, clear the bar, and say how many lines went by.
    fn finish(mut self) -> u64 {
        let bytes_now = self.reported_bytes;
        self.report(bytes_now);
        self.metrics.finish();
        self.metrics.total_lines()
    }
}

/// 📏 Something that knows how many bytes it has consumed.
trait BytesRead {
    fn bytes_read(&self) -> u64;
}

impl BytesRead for ObjectLines {
    fn bytes_read(&self) -> u64 {
        ObjectLines::bytes_read(self)
    }
}

#[async_trait]
impl<L> LineSource for MeteredLines<L>
where
    L: LineSource + BytesRead,
{
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let line = self.inner.next_line().await?;
        if line.is_some() {
            self.unreported_lines += 1;
        }
        let bytes_now = self.inner.bytes_read();
        if bytes_now != self.reported_bytes || line.is_none() {
            self.report(bytes_now);
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;
    use crate::progress::progress_board;
    use crate::propagators::recording::RecordingPropagator;

    fn metered(chunks: Vec<&'static str>) -> MeteredLines<ObjectLines> {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes()))),
        );
        let lines = ObjectLines::from_stream("memory:///metered", stream.boxed());
        let metrics = ProgressMetrics::new(&progress_board(false), "memory:///metered".into(), 0);
        MeteredLines::new(lines, metrics, Arc::new(AtomicU64::new(0)))
    }

    #[tokio::test]
    async fn the_one_where_the_meter_counts_every_line_and_byte() -> anyhow::Result<()> {
        let mut the_meter = metered(vec!["{\"a\":1}\n{\"b\"", ":2}\n\n{\"c\":3}"]);
        let mut seen = 0;
        while the_meter.next_line().await?.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert_eq!(the_meter.metrics.total_bytes(), 24);
        assert_eq!(the_meter.finish(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_tally_counts_every_chunk() {
        let recording = Arc::new(RecordingPropagator::default());
        let chunks = Arc::new(AtomicU64::new(0));
        let the_tally = TallyingPropagator {
            inner: recording.clone(),
            chunks: chunks.clone(),
        };
        the_tally.propagate("memory:///x", &["1".to_string()]).await;
        the_tally.propagate("memory:///x", &["2".to_string()]).await;
        assert_eq!(chunks.load(Ordering::Relaxed), 2);
        assert_eq!(recording.chunks().len(), 2);
    }
}
