//! 🧠 The in-memory sink: payloads go into a `Vec`, and anyone holding a clone can read them.
//!
//! Used for tests and for dry runs (`sink_config = "InMemory"`), where you want the whole
//! pipeline to run, listing and throttling included, without anything leaving the machine.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backends::Sink;

/// 📦 A sink that never forgets.
///
/// Clone-able because tests need to peek inside after handing the sink to the pipeline. Every
/// clone shares the same `Vec`.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    /// 🔒 One entry per payload, in send order.
    pub received: Arc<Mutex<Vec<String>>>,
}

impl InMemorySink {
    pub async fn new() -> Result<Self> {
        Ok(Self::default())
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&self, payload: String) -> Result<()> {
        self.received.lock().await.push(payload);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(
            "🗑️ in-memory sink closing with {} payload(s) on the shelf",
            self.received.lock().await.len()
        );
        Ok(())
    }
}
