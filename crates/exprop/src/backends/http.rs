//! 📡 The HTTP sink -- POST the records document, read the status, move on.
//!
//! 🧠 Knowledge graph:
//! - One POST per payload, `Content-Type: application/json`, optional bearer token.
//! - 2xx is success. Anything else is an error carrying the status and the response body, which
//!   the propagator writes into an unsuccessful outcome. No retries here.
//! - The client is built once and reused, so connections are pooled across payloads and files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::Sink;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpSinkConfig {
    /// 📡 Full endpoint URL, path included.
    pub url: String,
    /// 🔒 Sent as `Authorization: Bearer <token>` when present.
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// 📡 POSTs payloads to a fixed endpoint.
#[derive(Debug)]
pub struct HttpSink {
    client: reqwest::Client,
    sink_config: HttpSinkConfig,
    payloads_sent: AtomicUsize,
}

impl HttpSink {
    pub async fn new(sink_config: HttpSinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(sink_config.connect_timeout_secs))
            .timeout(Duration::from_secs(sink_config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be built. Usually a TLS backend problem.")?;
        Ok(Self {
            client,
            sink_config,
            payloads_sent: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn send(&self, payload: String) -> Result<()> {
        let payload_size_bytes = payload.len();
        let mut request = self
            .client
            .post(&self.sink_config.url)
            .header("Content-Type", "application/json");
        if let Some(token) = self.sink_config.bearer_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.body(payload).send().await.with_context(|| {
            format!(
                "💀 The POST to '{}' never got an answer. Check the URL and whether the endpoint is up.",
                self.sink_config.url
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 '{}' answered {} to a {} byte payload: '{}'",
                self.sink_config.url,
                status,
                payload_size_bytes,
                body
            );
        }

        self.payloads_sent.fetch_add(1, Ordering::Relaxed);
        trace!(
            "🚀 {} bytes accepted by '{}' with {}",
            payload_size_bytes, self.sink_config.url, status
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(
            "🗑️ http sink closing after {} accepted payload(s) to '{}'",
            self.payloads_sent.load(Ordering::Relaxed),
            self.sink_config.url
        );
        Ok(())
    }
}
