//! 🎬 *[camera pans across a bucket full of exported files]*
//! 🎬 "In a world where every file must be chunked, throttled and sent..."
//! 🎬 "One supervisor dared to hand them out."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor lists the export, feeds the objects through a bounded channel to the file
//! workers, collects what each file produced, and writes the report.
//!
//! 🧠 Knowledge graph:
//! - One listing producer (this module) → `async_channel` (capacity `queue_capacity`) →
//!   `file_parallelism` file workers. With the default of one worker, files are processed
//!   strictly one after another, in listing order.
//! - A file that fails to read is reported and skipped. A throttle interruption is not: it
//!   stops the listing, and the run ends with an error once the workers have wound down. The
//!   interrupted file's report still arrives, so its sent chunks are logged and counted.
//! - Reports are put back in listing order before anything is logged, whatever order the
//!   workers finished in.
//!
//! ⚠️ Workers are the supervisor's private little minions. They stay private.

mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::app_config::AppConfig;
use crate::common::PropagationOutcome;
use crate::engine::InterruptSignal;
use crate::progress::progress_board;
use crate::propagators::{Propagator, SinkPropagator};
use crate::storage::ExportLocation;
use workers::{FileReport, FileWorker, Worker};

/// 🧾 What a whole run produced.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// 📜 Every outcome of every file, files in listing order, chunks in emission order.
    pub outcomes: Vec<PropagationOutcome>,
    /// 💀 Files that stopped early. Their partial outcomes are in `outcomes` too.
    pub failed_files: Vec<FailedFile>,
    /// 📄 One entry per file that reached a worker, in listing order. Files that produced
    /// nothing are here too.
    pub files: Vec<FileSummary>,
    pub files_processed: usize,
    pub lines_read: u64,
}

/// 💀 A file that did not make it to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub source_location: String,
    pub propagated_chunks: usize,
    pub reason: String,
}

/// 📄 The per-file line of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub source_location: String,
    pub lines_read: u64,
    pub chunks: usize,
    pub refused: usize,
    /// 📏 Payload bytes the sink accepted for this file.
    pub bytes_sent: usize,
    pub failure: Option<String>,
}

impl PipelineReport {
    pub fn successful_propagations(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed_propagations(&self) -> usize {
        self.outcomes.len() - self.successful_propagations()
    }

    /// 📏 Bytes of payload that the sink accepted.
    pub fn propagated_bytes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.payload_size_bytes)
            .sum()
    }

    fn absorb(&mut self, report: FileReport) {
        self.files_processed += 1;
        self.lines_read += report.lines_read;
        let refused = report.outcomes.iter().filter(|o| !o.success).count();
        self.files.push(FileSummary {
            source_location: report.source_location.clone(),
            lines_read: report.lines_read,
            chunks: report.outcomes.len(),
            refused,
            bytes_sent: report
                .outcomes
                .iter()
                .filter(|o| o.success)
                .map(|o| o.payload_size_bytes)
                .sum(),
            failure: report.failure.clone(),
        });
        if let Some(reason) = report.failure {
            self.failed_files.push(FailedFile {
                source_location: report.source_location,
                propagated_chunks: report.outcomes.len(),
                reason,
            });
        }
        self.outcomes.extend(report.outcomes);
    }
}

/// 📦 Hands out files and collects receipts.
pub(crate) struct Supervisor {
    app_config: AppConfig,
    interrupt: InterruptSignal,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig, interrupt: InterruptSignal) -> Self {
        Self {
            app_config,
            interrupt,
        }
    }

    /// 🧵 List, dispatch, wait, report, close the sink.
    pub(crate) async fn run(
        &self,
        location: ExportLocation,
        propagator: SinkPropagator,
    ) -> Result<PipelineReport> {
        let runtime = &self.app_config.runtime;
        let propagator = Arc::new(propagator);
        let board = progress_board(runtime.show_progress);

        let (object_tx, object_rx) = async_channel::bounded(runtime.queue_capacity.max(1));
        let (report_tx, report_rx) = async_channel::unbounded::<FileReport>();

        let workers: Vec<_> = (0..runtime.file_parallelism.max(1))
            .map(|worker_id| {
                FileWorker::new(
                    worker_id,
                    object_rx.clone(),
                    report_tx.clone(),
                    location.store(),
                    propagator.clone() as Arc<dyn Propagator>,
                    self.app_config.propagation.clone(),
                    self.interrupt.clone(),
                    board.clone(),
                )
                .start()
            })
            .collect();
        // -- the workers hold their own ends now. ours would keep the channels open forever.
        drop(object_rx);
        drop(report_tx);
        debug!("🧵 {} file worker(s) started", workers.len());

        let mut listing_failure = None;
        let mut interrupted = false;
        let mut sequence = 0usize;
        let page_size = self.app_config.export.page_size;
        let mut pages = std::pin::pin!(location.list_exported_objects(page_size));
        'listing: while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(err) => {
                    listing_failure = Some(err);
                    break;
                }
            };
            for object in page {
                if self.interrupt.is_interrupted() {
                    warn!("🚨 interrupted, no more files will be handed out");
                    interrupted = true;
                    break 'listing;
                }
                if object_tx.send((sequence, object)).await.is_err() {
                    // -- every worker has exited, which only happens when something went wrong
                    break 'listing;
                }
                sequence += 1;
            }
        }
        drop(object_tx);
        debug!("📚 listing done, {} file(s) handed out", sequence);

        let mut worker_failure = None;
        for handle in workers {
            let outcome = handle
                .await
                .context("💀 A file worker panicked")
                .and_then(|result| result);
            if let Err(err) = outcome {
                error!("💀 file worker stopped: {:#}", err);
                worker_failure.get_or_insert(err);
            }
        }

        let mut reports = Vec::new();
        while let Ok(report) = report_rx.try_recv() {
            reports.push(report);
        }
        reports.sort_by_key(|report| report.sequence);

        let mut pipeline_report = PipelineReport::default();
        for report in reports {
            pipeline_report.absorb(report);
        }
        for outcome in pipeline_report.outcomes.iter().filter(|o| o.has_message()) {
            info!("{}", outcome);
        }
        for failed in &pipeline_report.failed_files {
            warn!(
                "💀 {} stopped after {} chunk(s): {}",
                failed.source_location, failed.propagated_chunks, failed.reason
            );
        }

        let closed = propagator.close().await.context("💀 The sink did not close cleanly");

        if let Some(err) = worker_failure {
            return Err(err.context(format!(
                "💀 Run aborted after {} file(s) and {} propagation(s)",
                pipeline_report.files_processed,
                pipeline_report.outcomes.len()
            )));
        }
        if let Some(err) = listing_failure {
            return Err(err.context("💀 Could not list the exported objects"));
        }
        if interrupted {
            anyhow::bail!(
                "💀 Run interrupted after {} of the listed file(s) were handed out",
                sequence
            );
        }
        closed?;

        info!(
            "✅ {} file(s), {} line(s), {} propagation(s), {} failed",
            pipeline_report.files_processed,
            pipeline_report.lines_read,
            pipeline_report.outcomes.len(),
            pipeline_report.failed_propagations()
        );
        Ok(pipeline_report)
    }
}
