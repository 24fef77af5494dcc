//! 📦 Common data structures -- the receipts of the exprop pipeline.
//!
//! 🎬 COLD OPEN -- INT. OBJECT STORAGE BUCKET -- 2:13 AM
//!
//! A warehouse has dumped its soul into a bucket, one newline-delimited JSON file at a time.
//! Somebody downstream wants those records. Somebody downstream also has a rate limit and a
//! payload cap. Between them stands the accumulator, and every time it lets a chunk go, it
//! writes down what happened in a [`PropagationOutcome`]. This module is where those receipts live.
//!
//! 🦆 The duck keeps the receipts. The duck is an accountant now.

use std::fmt;

use serde::Serialize;

/// 🕰️ `yyyyMMddHHmmssSSS` -- compact, sortable, and shaped like a file name on purpose.
pub const OCCURRED_AT_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// 🕰️ Stamp "now" in [`OCCURRED_AT_FORMAT`], local time.
pub fn occurred_at_now() -> String {
    chrono::Local::now().format(OCCURRED_AT_FORMAT).to_string()
}

/// 🧾 What happened when one chunk was propagated.
///
/// Created exactly once per propagation attempt and never mutated afterwards. Success and
/// failure both produce one of these: a propagator that hits a wall writes the wall's name in
/// `message` and sets `success = false` instead of throwing, so the accumulation loop never
/// has to grow a failure-recovery branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationOutcome {
    /// 📍 The object the chunk came from.
    pub source_location: String,
    /// 🕰️ When the propagation was attempted, see [`OCCURRED_AT_FORMAT`].
    pub occurred_at: String,
    /// 📏 UTF-8 byte length of the payload actually sent.
    pub payload_size_bytes: usize,
    /// 💬 Status or diagnostic. `None` when the propagator had nothing to say.
    pub message: Option<String>,
    /// ✅ Did the sink accept it?
    pub success: bool,
}

impl PropagationOutcome {
    /// 🏗️ Build an outcome stamped with the current time.
    pub fn new(
        source_location: impl Into<String>,
        payload_size_bytes: usize,
        message: Option<String>,
        success: bool,
    ) -> Self {
        Self {
            source_location: source_location.into(),
            occurred_at: occurred_at_now(),
            payload_size_bytes,
            message,
            success,
        }
    }

    /// 📐 Payload size in whole KiB. Integer division, so 2047 bytes is 1 and not 2.
    pub fn payload_size_kb(&self) -> usize {
        self.payload_size_bytes / 1024
    }

    /// 💬 Is there something worth reporting? `None` and `Some("")` both say no.
    pub fn has_message(&self) -> bool {
        self.message.as_deref().is_some_and(|m| !m.is_empty())
    }
}

impl fmt::Display for PropagationOutcome {
    /// 📣 The one-line report shape the pipeline logs for every outcome with a message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Propagated {}Kb from {} with message {} at {}",
            self.payload_size_kb(),
            self.source_location,
            self.message.as_deref().unwrap_or("No Message."),
            self.occurred_at
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome_weighing(payload_size_bytes: usize) -> PropagationOutcome {
        PropagationOutcome {
            source_location: "gs://bucket/export/1/000000000000-file".to_string(),
            occurred_at: "20240102030405678".to_string(),
            payload_size_bytes,
            message: Some("Sent to endpoint payload {\"records\":[]}...".to_string()),
            success: true,
        }
    }

    #[test]
    fn the_one_where_2048_bytes_is_exactly_two_kb() {
        assert_eq!(outcome_weighing(2048).payload_size_kb(), 2);
    }

    #[test]
    fn the_one_where_2047_bytes_rounds_down_like_a_pessimist() {
        assert_eq!(outcome_weighing(2047).payload_size_kb(), 1);
        assert_eq!(outcome_weighing(1023).payload_size_kb(), 0);
    }

    #[test]
    fn the_one_where_display_matches_the_report_shape() {
        let the_outcome = outcome_weighing(4096);
        assert_eq!(
            the_outcome.to_string(),
            "Propagated 4Kb from gs://bucket/export/1/000000000000-file with message \
             Sent to endpoint payload {\"records\":[]}... at 20240102030405678"
        );
    }

    #[test]
    fn the_one_where_an_empty_message_counts_as_silence() {
        let mut the_outcome = outcome_weighing(10);
        assert!(the_outcome.has_message());
        the_outcome.message = Some(String::new());
        assert!(!the_outcome.has_message());
        the_outcome.message = None;
        assert!(!the_outcome.has_message());
        assert!(the_outcome.to_string().contains("with message No Message."));
    }

    #[test]
    fn the_one_where_the_timestamp_is_seventeen_digits_of_now() {
        let the_stamp = occurred_at_now();
        assert_eq!(the_stamp.len(), 17, "yyyyMMddHHmmssSSS is 17 chars, got '{the_stamp}'");
        assert!(the_stamp.chars().all(|c| c.is_ascii_digit()));
    }
}
