//! 📖 Line processor -- one file in, a list of outcomes out.
//!
//! 🎬 *[the file opens. the first line steps forward.]*
//! *[it will not be the last. there are 400,000 of them and they all brought friends.]*
//!
//! Every line goes through [`Accumulator::accumulate`] in source order, then a single drain
//! picks up the remainder. If the source breaks partway through, we stop right there: no drain,
//! because draining would propagate a chunk of a file we did not finish reading, and the caller
//! would have no way to tell the half-chunk from a whole one. The outcomes already flushed are
//! returned inside the [`FileFailure`] so nobody loses the receipts.

use std::io;

use async_trait::async_trait;

use crate::common::PropagationOutcome;
use crate::engine::accumulator::Accumulator;
use crate::error::{EngineError, FileFailure};

/// 🚰 A lazy, finite, forward-only sequence of lines.
///
/// # Contract 📜
/// - `Ok(Some(line))` while lines remain, `Ok(None)` once, at the end.
/// - `Err(..)` when the underlying bytes stop making sense or stop arriving.
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// 📖 Fold every line of `lines` into `accumulator`, drain, and hand back the outcomes.
pub async fn process_lines<L>(
    lines: &mut L,
    mut accumulator: Accumulator,
) -> Result<Vec<PropagationOutcome>, FileFailure>
where
    L: LineSource + ?Sized,
{
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(source) => {
                let error = EngineError::SourceRead {
                    source_location: accumulator.source_location().to_string(),
                    source,
                };
                return Err(stopped(accumulator, error));
            }
        };
        let step = accumulator.accumulate(line).await.map(|_| ());
        if let Err(error) = step {
            return Err(stopped(accumulator, error));
        }
    }

    let step = accumulator.drain().await.map(|_| ());
    match step {
        Ok(()) => Ok(accumulator.into_results()),
        Err(error) => Err(stopped(accumulator, error)),
    }
}

fn stopped(accumulator: Accumulator, error: EngineError) -> FileFailure {
    FileFailure {
        source_location: accumulator.source_location().to_string(),
        outcomes: accumulator.into_results(),
        error,
    }
}
