//! Delivery collaborators. The core produces a structured
//! processed-intelligence bundle; sinks render and send it. Human-readable
//! formatting stays at this boundary, never inside the core.

pub mod discord;

use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::IntelligenceBundle;

/// One delivery channel for a finished bundle.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, bundle: &IntelligenceBundle) -> Result<()>;
}

/// Fan-out over every configured sink. Per-sink failures are logged and do
/// not block the other sinks.
pub struct DeliveryMux {
    sinks: Vec<Box<dyn DeliverySink>>,
}

impl DeliveryMux {
    pub fn new(sinks: Vec<Box<dyn DeliverySink>>) -> Self {
        Self { sinks }
    }

    /// Build from environment: Discord when `DISCORD_WEBHOOK_URL` is set.
    pub fn from_env() -> Self {
        let mut sinks: Vec<Box<dyn DeliverySink>> = Vec::new();
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            sinks.push(Box::new(discord::DiscordDelivery::new(url)));
        }
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn deliver(&self, bundle: &IntelligenceBundle) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(bundle).await {
                tracing::warn!(sink = sink.name(), error = %e, "bundle delivery failed");
            }
        }
    }
}
