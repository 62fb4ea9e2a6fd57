//! Signal Sentinel — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the intelligence core, scheduler,
//! delivery sinks, and the Prometheus exporter.

use std::sync::Arc;

use signal_sentinel::content_store::QUERY_CACHE_TTL;
use signal_sentinel::criteria::CriteriaRegistry;
use signal_sentinel::market::{CoinGeckoMarketData, PriceTargetEvaluator};
use signal_sentinel::notify::DeliveryMux;
use signal_sentinel::pipeline::IntelligenceCore;
use signal_sentinel::schedule::ScheduleConfig;
use signal_sentinel::sources::ContentProvider;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENV_CRITERIA_PATH: &str = "CRITERIA_CONFIG_PATH";
const DEFAULT_CRITERIA_PATH: &str = "config/alert_criteria.json";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("signal_sentinel=info,warn"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = signal_sentinel::metrics::install_recorder(QUERY_CACHE_TTL.as_secs());

    let criteria_path =
        std::env::var(ENV_CRITERIA_PATH).unwrap_or_else(|_| DEFAULT_CRITERIA_PATH.to_string());
    let criteria = CriteriaRegistry::load_from_file(&criteria_path);

    let market = Arc::new(CoinGeckoMarketData::from_env());
    let evaluator = Arc::new(PriceTargetEvaluator::new(market.clone()));

    // Content providers are wired per deployment; the server runs fine with
    // none and simply has nothing to ingest on content checks.
    let providers: Vec<Box<dyn ContentProvider>> = Vec::new();
    if providers.is_empty() {
        tracing::info!("no content providers configured; content checks will be empty");
    }

    let delivery = DeliveryMux::from_env();
    if delivery.is_empty() {
        tracing::info!("no delivery sinks configured; bundles stay internal");
    }

    let core = Arc::new(IntelligenceCore::new(
        criteria,
        evaluator,
        providers,
        Some(market),
        delivery,
    ));
    core.start(ScheduleConfig::load_default());

    let router =
        signal_sentinel::api::create_router(core.clone(), criteria_path, Some(metrics));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "signal sentinel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    core.stop().await;
    Ok(())
}
