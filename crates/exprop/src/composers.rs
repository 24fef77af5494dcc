//! 🎼 Composers -- a chunk of lines goes in, one request body comes out.
//!
//! 🎬 *[the basket is full. the propagator needs one document, not forty thousand lines.]*
//! *["wrap us," say the records. the composer reaches for a pair of square brackets.]*
//!
//! 🧠 Knowledge graph:
//! - Wire shape: `{"records":[<line 1>,<line 2>,...]}`. One object, one array, every line an element.
//! - Each line must already be a JSON value. We validate it with `RawValue` and splice the raw
//!   text in as-is: no parse into a `Value` map, no re-serialization, key order untouched.
//! - A line that is not JSON fails the whole chunk. The propagator turns that into an
//!   unsuccessful outcome; nothing half-built leaves the building.
//!
//! 🦆 The duck checked. Every record still has its quotes.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::value::RawValue;

// -- 📏 how much of a broken line we quote in the error
const BROKEN_LINE_PREVIEW_CHARS: usize = 64;

#[derive(Serialize)]
struct RecordsPayload<'a> {
    records: Vec<&'a RawValue>,
}

/// 🎼 Composes `{"records":[...]}` payloads.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RecordsComposer;

impl RecordsComposer {
    pub(crate) fn compose(&self, entries: &[String]) -> Result<String> {
        let records = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                serde_json::from_str::<&RawValue>(entry).with_context(|| {
                    let preview: String = entry.chars().take(BROKEN_LINE_PREVIEW_CHARS).collect();
                    format!("entry #{position} of the chunk is not a JSON value: '{preview}'")
                })
            })
            .collect::<Result<Vec<_>>>()?;

        serde_json::to_string(&RecordsPayload { records })
            .context("💀 could not serialize the records payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn the_one_where_lines_become_array_elements() -> Result<()> {
        let the_payload =
            RecordsComposer.compose(&records(&[r#"{"b":2,"a":1}"#, "42", r#""text""#]))?;
        assert_eq!(the_payload, r#"{"records":[{"b":2,"a":1},42,"text"]}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_the_raw_text_is_spliced_untouched() -> Result<()> {
        // -- inner whitespace survives, surrounding whitespace does not belong to the value
        let the_payload = RecordsComposer.compose(&records(&[r#"  {"a": [1, 2]}  "#]))?;
        assert_eq!(the_payload, r#"{"records":[{"a": [1, 2]}]}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_chunk_is_an_empty_array() -> Result<()> {
        assert_eq!(RecordsComposer.compose(&[])?, r#"{"records":[]}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_one_bad_line_spoils_the_chunk() {
        let the_error = RecordsComposer
            .compose(&records(&[r#"{"ok":1}"#, r#"{"ok":"#]))
            .expect_err("a truncated record cannot be composed");
        assert!(the_error.to_string().contains("entry #1"), "got: {the_error}");
    }
}
