//! Allocator service entry point.
//!
//! Wires the indexer and price-feed clients into an [`Allocator`] and
//! exposes it, together with committed distributions stored in SQLite,
//! through a small Axum REST API.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use allocator::api;
use allocator::config::Config;
use allocator::db;
use allocator::rpc::{HttpFetcher, HttpPriceSource, IndexerClient};
use allocator::service::Allocator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = db::init_pool(&config.database_url).await?;

    // One HTTP client shared by the indexer and price-feed collaborators.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
        .build()?;
    let http = HttpFetcher::new(client, config.max_retries);

    let indexer = Arc::new(IndexerClient::new(http.clone(), &config.indexer_url));
    let prices = Arc::new(HttpPriceSource::new(http, &config.price_api_url));
    let allocator = Allocator::new(indexer.clone(), indexer, prices);

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { pool, allocator });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/data/summary", get(api::get_project_summary))
        .route("/rounds/:chain_id/:round_id/matches", get(api::get_round_matches))
        .route(
            "/rounds/:chain_id/:round_id/distribution",
            get(api::get_distribution).post(api::commit_distribution),
        )
        .route(
            "/rounds/:chain_id/:round_id/distribution/proofs/:index",
            get(api::get_proof),
        )
        .route(
            "/rounds/:chain_id/:round_id/distribution/publish",
            post(api::publish_distribution),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
