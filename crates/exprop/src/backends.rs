//! 🔌 Backends -- where a composed payload finally leaves the process.
//!
//! 🕳️ Sinks are I/O and nothing else. They get a finished `{"records":[...]}` string and
//! write it to disk, POST it, or stash it in a `Vec`. Composing, measuring, and deciding what
//! a failure means all happen upstream in the propagator.
//!
//! 🧠 Knowledge graph:
//! - Pattern: `Sink` trait → concrete sinks (`FileSink`, `HttpSink`, `InMemorySink`) →
//!   `SinkBackend` enum that dispatches. Same shape as every other pluggable piece in here.
//! - One backend = one config = one file. The configs live next to their sinks.
//!
//! 🦆 Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;

pub mod file;
pub mod http;
pub mod in_mem;

pub use file::FileSinkConfig;
pub use http::HttpSinkConfig;

use crate::app_config::SinkConfig;

/// 🕳️ A sink that sends fully composed payloads.
///
/// # Contract 📜
/// - `send` writes or transmits one payload. An `Err` means this payload did not arrive.
/// - `close` releases whatever the sink holds. Call it once, after the last `send`.
/// - Both take `&self`: file workers share one sink, and their sends may overlap.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug + Send + Sync {
    /// 📡 Send one composed payload to the destination.
    async fn send(&self, payload: String) -> Result<()>;
    /// 🗑️ Flush, finalize, release.
    async fn close(&self) -> Result<()>;
}

/// 🎭 Every sink we know how to build, behind one type.
#[derive(Debug)]
pub enum SinkBackend {
    InMemory(in_mem::InMemorySink),
    File(file::FileSink),
    Http(http::HttpSink),
}

impl SinkBackend {
    /// 🏗️ Build the sink a config asks for.
    pub async fn from_config(sink_config: &SinkConfig) -> Result<Self> {
        Ok(match sink_config {
            SinkConfig::InMemory => SinkBackend::InMemory(in_mem::InMemorySink::new().await?),
            SinkConfig::File(config) => SinkBackend::File(file::FileSink::new(config.clone()).await?),
            SinkConfig::Http(config) => SinkBackend::Http(http::HttpSink::new(config.clone()).await?),
        })
    }
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&self, payload: String) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.send(payload).await,
            SinkBackend::File(sink) => sink.send(payload).await,
            SinkBackend::Http(sink) => sink.send(payload).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::File(sink) => sink.close().await,
            SinkBackend::Http(sink) => sink.close().await,
        }
    }
}
