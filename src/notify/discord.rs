use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::DeliverySink;
use crate::pipeline::IntelligenceBundle;

#[derive(Clone)]
pub struct DiscordDelivery {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordDelivery {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    fn render(bundle: &IntelligenceBundle) -> (String, String) {
        let title = format!("{} — {}", bundle.kind, bundle.date);
        let pulse = &bundle.market_pulse;
        let opportunities: String = if bundle.opportunities.is_empty() {
            "none".to_string()
        } else {
            bundle
                .opportunities
                .iter()
                .map(|a| format!("{} [{}] {:.0}%", a.asset, a.urgency.label(), a.confidence * 100.0))
                .collect::<Vec<_>>()
                .join(" · ")
        };
        let description = format!(
            "**Items analyzed:** {}\n**Assets in focus:** {}\n**Opportunities:** {}\n**Digest:** {} predictions, {} signals",
            pulse.items_analyzed,
            if pulse.assets_in_focus.is_empty() {
                "—".to_string()
            } else {
                pulse.assets_in_focus.join(", ")
            },
            opportunities,
            bundle.knowledge_digest.top_predictions.len(),
            bundle.knowledge_digest.top_signals.len(),
        );
        (title, description)
    }
}

#[async_trait]
impl DeliverySink for DiscordDelivery {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, bundle: &IntelligenceBundle) -> Result<()> {
        let (title, description) = Self::render(bundle);
        let payload = DiscordWebhookPayload::embed(&title, &description);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: description.to_string(),
            }],
        }
    }
}
