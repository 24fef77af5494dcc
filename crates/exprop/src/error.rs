//! 💀 Engine errors -- the short list of ways a file can stop being propagated.
//!
//! Propagation failures are NOT in here. A sink that says no is reported inside the
//! [`PropagationOutcome`] and the loop keeps going. What IS in here are the things that
//! must stop a file cold: the source stopped giving us bytes, the rate limiter was
//! interrupted, or somebody tried to merge two accumulators from different files.
//!
//! Orchestration code above the engine wraps these with `anyhow` context, like the rest of
//! the crate. The engine itself stays typed so callers can match on what went wrong. 🦆

use std::io;

use thiserror::Error;

use crate::common::PropagationOutcome;

/// 💀 Everything the accumulation engine refuses to paper over.
#[derive(Debug, Error)]
pub enum EngineError {
    /// ⏱️ The throttle wait was cut short. Returning early would break the rate limit, so we don't.
    #[error(
        "💀 throttle wait interrupted with {remaining_millis}ms still to go; \
         refusing to propagate early and break the rate limit"
    )]
    ThrottleInterrupted { remaining_millis: u64 },

    /// 🔀 Two accumulators bound to different objects walked into a combine.
    #[error(
        "💀 cannot combine accumulator for '{receiver}' with accumulator for '{donor}': \
         outcomes would carry the wrong provenance"
    )]
    SourceMismatch { receiver: String, donor: String },

    /// 📖 The line source broke partway through.
    #[error("💀 failed reading lines from '{source_location}'")]
    SourceRead {
        source_location: String,
        #[source]
        source: io::Error,
    },
}

/// 📉 A file that stopped early, plus every chunk it managed to propagate before it did.
///
/// The outcomes are real: those chunks left the building. Keeping them lets the caller
/// report what was sent and replay only the rest.
#[derive(Debug, Error)]
#[error("💀 processing of '{source_location}' stopped after {} propagated chunk(s)", .outcomes.len())]
pub struct FileFailure {
    pub source_location: String,
    pub outcomes: Vec<PropagationOutcome>,
    #[source]
    pub error: EngineError,
}

impl FileFailure {
    /// ⏱️ Was this a rate-limit interruption? Those abort the whole run, not just the file.
    pub fn is_interruption(&self) -> bool {
        matches!(self.error, EngineError::ThrottleInterrupted { .. })
    }
}
