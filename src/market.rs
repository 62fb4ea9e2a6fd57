//! Market-data collaborator seam and the price-target outcome evaluator.
//!
//! The pipeline never fetches market data itself; it consumes a
//! `MarketDataProvider` supplied at construction time. The evaluator scores
//! an expired prediction against observed prices: direction hit plus
//! proximity to the predicted target, with profitability as the signed
//! percent move since the prediction was created.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::predict::{OutcomeEvaluator, Prediction, PredictionOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub asset: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
}

/// Current and historical price/volume/marketCap for an asset.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn snapshot(&self, asset: &str) -> Result<MarketSnapshot>;
    async fn price_at(&self, asset: &str, at: DateTime<Utc>) -> Result<f64>;
}

/// CoinGecko-backed provider. Assets are addressed by their canonical ids
/// ("bitcoin", "ethereum", ...), which is also what the extractor emits.
pub struct CoinGeckoMarketData {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoMarketData {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Base URL from `MARKET_DATA_URL`, defaulting to the public API.
    pub fn from_env() -> Self {
        let base = std::env::var("MARKET_DATA_URL")
            .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string());
        Self::new(base)
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoMarketData {
    async fn snapshot(&self, asset: &str) -> Result<MarketSnapshot> {
        let url = format!(
            "{}/simple/price?ids={asset}&vs_currencies=usd&include_24hr_vol=true&include_market_cap=true",
            self.base_url
        );
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let entry = body
            .get(asset)
            .ok_or_else(|| anyhow::anyhow!("no market data for '{asset}'"))?;
        let price = entry
            .get("usd")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("no usd price for '{asset}'"))?;
        Ok(MarketSnapshot {
            asset: asset.to_string(),
            price,
            volume_24h: entry.get("usd_24h_vol").and_then(|v| v.as_f64()),
            market_cap: entry.get("usd_market_cap").and_then(|v| v.as_f64()),
        })
    }

    async fn price_at(&self, asset: &str, at: DateTime<Utc>) -> Result<f64> {
        let url = format!(
            "{}/coins/{asset}/history?date={}",
            self.base_url,
            at.format("%d-%m-%Y")
        );
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.pointer("/market_data/current_price/usd")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("no historical price for '{asset}'"))
    }
}

/// Deterministic, market-data-backed scorer for expired predictions.
pub struct PriceTargetEvaluator {
    market: Arc<dyn MarketDataProvider>,
}

impl PriceTargetEvaluator {
    pub fn new(market: Arc<dyn MarketDataProvider>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl OutcomeEvaluator for PriceTargetEvaluator {
    async fn evaluate(
        &self,
        prediction: &Prediction,
        now: DateTime<Utc>,
    ) -> Result<PredictionOutcome> {
        let entry = self
            .market
            .price_at(&prediction.asset, prediction.created_at)
            .await?;
        let current = self.market.snapshot(&prediction.asset).await?.price;

        let move_pct = if entry > 0.0 {
            (current - entry) / entry * 100.0
        } else {
            0.0
        };

        let accuracy = match prediction.predicted_price {
            Some(target) => score_against_target(entry, target, current),
            // Tracked claims without an explicit target are read as upside
            // calls; score on direction alone.
            None => {
                if move_pct > 0.0 {
                    0.7
                } else {
                    0.3
                }
            }
        };

        Ok(PredictionOutcome {
            prediction_id: prediction.id.clone(),
            actual_price: Some(current),
            actual_outcome: format!("price moved {move_pct:+.2}% from {entry:.2} to {current:.2}"),
            accuracy,
            profitability: Some(move_pct),
            days_to_realization: Some((now - prediction.created_at).num_days()),
            evaluated_at: now,
            notes: prediction
                .predicted_price
                .map(|t| format!("target was {t:.2}"))
                .unwrap_or_default(),
        })
    }
}

/// Direction hit earns the base; the rest scales with how close the observed
/// price landed to the target, relative to the predicted move size.
fn score_against_target(entry: f64, target: f64, actual: f64) -> f64 {
    let predicted_move = target - entry;
    let actual_move = actual - entry;
    let direction_hit = predicted_move.signum() == actual_move.signum() && actual_move != 0.0;

    let denom = predicted_move.abs().max(f64::EPSILON);
    let proximity = 1.0 - ((actual - target).abs() / denom).min(1.0);

    if direction_hit {
        (0.5 + 0.5 * proximity).clamp(0.0, 1.0)
    } else {
        (0.25 * proximity).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;

    struct TableMarket {
        entry: HashMap<String, f64>,
        current: HashMap<String, f64>,
    }

    #[async_trait]
    impl MarketDataProvider for TableMarket {
        async fn snapshot(&self, asset: &str) -> Result<MarketSnapshot> {
            Ok(MarketSnapshot {
                asset: asset.to_string(),
                price: *self.current.get(asset).unwrap_or(&0.0),
                volume_24h: None,
                market_cap: None,
            })
        }
        async fn price_at(&self, asset: &str, _at: DateTime<Utc>) -> Result<f64> {
            Ok(*self.entry.get(asset).unwrap_or(&0.0))
        }
    }

    fn prediction(target: Option<f64>) -> Prediction {
        Prediction {
            id: "pred-1".into(),
            asset: "bitcoin".into(),
            text: "btc to the target".into(),
            confidence: 0.9,
            timeframe: "1 week".into(),
            predicted_price: target,
            price_range: None,
            catalysts: vec![],
            source: "test".into(),
            created_at: Utc::now() - Duration::days(7),
            expires_at: Utc::now(),
            status: crate::predict::PredictionStatus::Active,
        }
    }

    #[tokio::test]
    async fn exact_target_hit_scores_full() {
        let market = TableMarket {
            entry: HashMap::from([("bitcoin".to_string(), 100.0)]),
            current: HashMap::from([("bitcoin".to_string(), 120.0)]),
        };
        let eval = PriceTargetEvaluator::new(Arc::new(market));
        let o = eval.evaluate(&prediction(Some(120.0)), Utc::now()).await.unwrap();
        assert!((o.accuracy - 1.0).abs() < 1e-9);
        assert!((o.profitability.unwrap() - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn wrong_direction_scores_low() {
        let market = TableMarket {
            entry: HashMap::from([("bitcoin".to_string(), 100.0)]),
            current: HashMap::from([("bitcoin".to_string(), 80.0)]),
        };
        let eval = PriceTargetEvaluator::new(Arc::new(market));
        let o = eval.evaluate(&prediction(Some(120.0)), Utc::now()).await.unwrap();
        assert!(o.accuracy <= 0.25);
        assert!(o.profitability.unwrap() < 0.0);
    }

    #[tokio::test]
    async fn no_target_scores_on_direction() {
        let market = TableMarket {
            entry: HashMap::from([("bitcoin".to_string(), 100.0)]),
            current: HashMap::from([("bitcoin".to_string(), 101.0)]),
        };
        let eval = PriceTargetEvaluator::new(Arc::new(market));
        let o = eval.evaluate(&prediction(None), Utc::now()).await.unwrap();
        assert!((o.accuracy - 0.7).abs() < 1e-9);
    }
}
