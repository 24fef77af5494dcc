//! 📂 The file sink -- every payload becomes its own file, named after the moment it was written.
//!
//! 🎬 *[no endpoint yet. the downstream team is "two sprints out". the payloads need to go
//! somewhere they can be looked at.]*
//!
//! 🧠 Knowledge graph:
//! - One payload per file, in `directory` (default `temps`), created on first use.
//! - File name: `yyyyMMddHHmmssSSS`, the same stamp outcomes use. Two payloads inside the same
//!   millisecond get `-1`, `-2`, ... appended instead of overwriting each other.
//! - `create_new` does the collision check, so two workers racing for the same name cannot both win.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::backends::Sink;
use crate::common::occurred_at_now;

/// 📂 Where the file sink writes. Co-located with its sink, like every backend config.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FileSinkConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_directory() -> PathBuf {
    PathBuf::from("temps")
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
        }
    }
}

/// 📂 Writes each payload to a fresh, timestamp-named file.
#[derive(Debug)]
pub struct FileSink {
    sink_config: FileSinkConfig,
    files_written: AtomicUsize,
}

impl FileSink {
    /// 🚀 Makes sure the directory exists. Existing files in it are left alone.
    pub async fn new(sink_config: FileSinkConfig) -> Result<Self> {
        fs::create_dir_all(&sink_config.directory)
            .await
            .with_context(|| {
                format!(
                    "💀 The sink directory '{}' could not be created. Check the path and its permissions.",
                    sink_config.directory.display()
                )
            })?;
        Ok(Self {
            sink_config,
            files_written: AtomicUsize::new(0),
        })
    }

    /// 🔧 Create a file that did not exist before, stamped with now, suffixed on collision.
    async fn create_fresh_file(&self) -> Result<(PathBuf, fs::File)> {
        let stamp = occurred_at_now();
        let mut attempt = 0usize;
        loop {
            let name = match attempt {
                0 => stamp.clone(),
                n => format!("{stamp}-{n}"),
            };
            let path = self.sink_config.directory.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("💀 Could not create '{}'", path.display()));
                }
            }
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&self, payload: String) -> Result<()> {
        let (path, mut file) = self.create_fresh_file().await?;
        file.write_all(payload.as_bytes())
            .await
            .with_context(|| format!("💀 Could not write the payload to '{}'", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("💀 Could not flush '{}'", path.display()))?;
        self.files_written.fetch_add(1, Ordering::Relaxed);
        trace!("📬 {} bytes written to '{}'", payload.len(), path.display());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(
            "🗑️ file sink closing after {} file(s) in '{}'",
            self.files_written.load(Ordering::Relaxed),
            self.sink_config.directory.display()
        );
        Ok(())
    }
}
