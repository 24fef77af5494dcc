//! 🧵 Workers: the ones who actually read the files while the Supervisor takes the credit.
//!
//! There is one kind for now, the [`FileWorker`]. It pulls objects off the channel until the
//! channel closes, and runs each one through its own accumulator.

use anyhow::Result;
use tokio::task::JoinHandle;

mod file_worker;
pub(crate) use file_worker::{FileReport, FileWorker};

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Start the worker. `Err` means the worker gave up, not that a file went bad.
    fn start(self) -> JoinHandle<Result<()>>;
}
