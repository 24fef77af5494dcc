//! 📡 Propagators -- the one-method contract between the accumulator and the outside world.
//!
//! 🎬 *[a chunk closes. the accumulator turns to the propagator.]*
//! *["send this," it says. "and tell me how it went. do NOT throw."]*
//!
//! 🧠 Knowledge graph:
//! - [`Propagator`]: `(source_location, entries) -> PropagationOutcome`. Infallible by signature.
//!   Failure is a field on the outcome, not an `Err`, so the accumulation loop stays a loop.
//! - Any `Fn(&str, &[String]) -> PropagationOutcome` closure is a propagator. Capability, not
//!   class hierarchy.
//! - [`SinkPropagator`]: the real one. Composes `{"records":[...]}` with the
//!   [`RecordsComposer`], sends it through a [`SinkBackend`], and reports.
//! - File workers share one propagator via `Arc`, and `Sink::send` takes `&self`, so sends
//!   from different files run side by side. Nothing here holds a lock across a send.
//!
//! 🦆 The duck propagates nothing. The duck is a reader.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::backends::{Sink, SinkBackend};
use crate::common::PropagationOutcome;
use crate::composers::RecordsComposer;

// -- 📏 how much of the payload we quote back in the outcome message
const PREVIEW_CHARS: usize = 30;

/// 📡 Send one chunk of entries somewhere, and say how it went.
///
/// # Contract 📜
/// - Must eventually return, success or not.
/// - Must return a [`PropagationOutcome`] even on failure, with `success = false` and the
///   reason in `message`. Retries, if any, happen in here and not in the engine.
#[async_trait]
pub trait Propagator: Send + Sync {
    async fn propagate(&self, source_location: &str, entries: &[String]) -> PropagationOutcome;
}

#[async_trait]
impl<F> Propagator for F
where
    F: Fn(&str, &[String]) -> PropagationOutcome + Send + Sync,
{
    async fn propagate(&self, source_location: &str, entries: &[String]) -> PropagationOutcome {
        self(source_location, entries)
    }
}

/// 🚰 Composes the records payload and pushes it through a sink. I/O errors become outcomes.
#[derive(Debug)]
pub struct SinkPropagator {
    sink: SinkBackend,
    composer: RecordsComposer,
}

impl SinkPropagator {
    pub fn new(sink: SinkBackend) -> Self {
        Self {
            sink,
            composer: RecordsComposer,
        }
    }

    /// 🗑️ Close the underlying sink. Call once, after the last file is done.
    pub async fn close(&self) -> Result<()> {
        self.sink.close().await
    }
}

#[async_trait]
impl Propagator for SinkPropagator {
    async fn propagate(&self, source_location: &str, entries: &[String]) -> PropagationOutcome {
        let payload = match self.composer.compose(entries) {
            Ok(payload) => payload,
            Err(err) => {
                // -- nothing was sent, so nothing was measured
                warn!("💀 could not compose payload for {}: {:#}", source_location, err);
                return PropagationOutcome::new(
                    source_location,
                    0,
                    Some(format!("Failed to compose payload: {err:#}")),
                    false,
                );
            }
        };

        let payload_size_bytes = payload.len();
        let preview: String = payload.chars().take(PREVIEW_CHARS).collect();
        let sent = self.sink.send(payload).await;

        let outcome = match sent {
            Ok(()) => PropagationOutcome::new(
                source_location,
                payload_size_bytes,
                Some(format!("Sent to endpoint payload {preview}...")),
                true,
            ),
            Err(err) => {
                warn!(
                    "💀 sink refused {} bytes from {}: {:#}",
                    payload_size_bytes, source_location, err
                );
                PropagationOutcome::new(
                    source_location,
                    payload_size_bytes,
                    Some(format!("Failed to send payload {preview}...: {err:#}")),
                    false,
                )
            }
        };

        debug!(
            "📬 Propagated {} bytes from {} with message {} at {}",
            outcome.payload_size_bytes,
            outcome.source_location,
            outcome.message.as_deref().unwrap_or_default(),
            outcome.occurred_at
        );
        outcome
    }
}
