//! 🚀 exprop -- propagate a data-warehouse export, one throttled chunk at a time.
//!
//! 🎬 *[the warehouse finished its export an hour ago. the endpoint takes a megabyte at a time,
//! and not too often. somebody has to stand in between.]*
//!
//! 🧠 Knowledge graph:
//! - [`storage`] lists the exported objects under a `gs://`, `s3://`, `file://` or `memory://`
//!   location, page by page.
//! - [`sources`] turns one object into lines.
//! - [`engine`] accumulates lines into byte-bounded chunks, throttles, and propagates.
//! - [`propagators`] composes the `{"records":[...]}` payload and hands it to a sink from
//!   [`backends`].
//! - The supervisor wires all of that to a channel and a handful of file workers.
//!
//! [`run`] is the whole thing for a loaded [`AppConfig`](app_config::AppConfig).

pub mod app_config;
pub mod backends;
pub mod common;
mod composers;
pub mod engine;
pub mod error;
mod progress;
pub mod propagators;
pub mod sources;
pub mod storage;
mod supervisors;

use anyhow::{Context, Result};
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::SinkBackend;
use crate::propagators::SinkPropagator;
use crate::storage::ExportLocation;
use crate::supervisors::Supervisor;

pub use crate::common::PropagationOutcome;
pub use crate::engine::{InterruptSignal, Interrupter};
pub use crate::supervisors::{FailedFile, FileSummary, PipelineReport};

/// 🚀 List the export, propagate every object, and report what happened.
///
/// `interrupt` stops the run at the next throttle wait. The run then ends with an error; the
/// chunks already sent are not undone.
pub async fn run(app_config: AppConfig, interrupt: InterruptSignal) -> Result<PipelineReport> {
    info!(
        "🚀 propagating '{}' with {} byte chunks, at most one per {}ms per file",
        app_config.export.location,
        app_config.propagation.size_threshold_bytes,
        app_config.propagation.min_interval_millis
    );

    let location = ExportLocation::parse(&app_config.export.location)
        .context("💀 The export location in the config is not usable")?;
    let sink = SinkBackend::from_config(&app_config.sink_config)
        .await
        .context("💀 The sink could not be set up")?;

    Supervisor::new(app_config, interrupt)
        .run(location, SinkPropagator::new(sink))
        .await
}
