//! # airank: Token-Usage Leaderboard Service
//!
//! `airank` ranks users by AI-assistant token usage reported via
//! OpenTelemetry (OTLP) metrics. Agents push metric envelopes carrying
//! their handle and API key as resource attributes; the service
//! authenticates the reporter, extracts token counts by category, and
//! applies them to durable per-user counters, an append-only usage log,
//! time-windowed rankings, and a peak-throughput tracker. Leaderboard
//! endpoints serve the ranked results back to the web frontend.
//!
//! ## Architecture
//!
//! The service is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer with PostgreSQL as the system of record and an optional
//! Redis layer for fast-path aggregation.
//!
//! ### Request Flow
//!
//! An ingestion request to `/api/v1/metrics` passes through the
//! credential verifier ([`auth::verifier`]), the metric extractor
//! ([`ingest`]), and the aggregation engine ([`aggregation::Engine`]),
//! which fans the event out to both storage layers. The two layers have
//! independent failure domains: volatile ranking updates run under a
//! short deadline and fail open, durable writes decide the request's
//! fate. Reads (`/api/leaderboard`, `/api/user/{handle}`) rank from the
//! durable store alone and only borrow the peak-throughput figure from
//! the cache, degrading to zero when it is unavailable.
//!
//! Delivery is at-least-once with no deduplication: a reporter retrying
//! a failed request may double count. That tradeoff is deliberate and
//! documented in the ingestion endpoint's contract.
//!
//! ### Core Components
//!
//! The **storage seams** ([`db::DurableStore`], [`cache::RankingCache`])
//! separate the authoritative store from the advisory one. Production
//! wires them to [`db::postgres::PgStore`] and either
//! [`cache::redis::RedisCache`] or the in-process
//! [`cache::memory::MemoryCache`] when no Redis URL is configured.
//!
//! The **aggregation engine** ([`aggregation`]) owns the effect order and
//! the consistency contract across both stores. It is the only writer of
//! profile counters and volatile ranking state.
//!
//! The **API layer** ([`api`]) carries the ingestion endpoint, the
//! leaderboard reads, key verification, profile sync, and the server side
//! of the device-code login flow.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use airank::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = airank::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     airank::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod aggregation;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
mod crypto;
pub mod db;
pub mod errors;
pub mod ingest;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::aggregation::Engine;
use crate::api::handlers::{auth as auth_handlers, device, leaderboard, metrics, users};
use crate::cache::memory::MemoryCache;
use crate::cache::redis::RedisCache;
use crate::cache::RankingCache;
use crate::db::postgres::PgStore;
use crate::db::DurableStore;
use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, instrument, warn, Level};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::UserId;

/// Application state shared across all request handlers.
///
/// Holds both storage seams, the aggregation engine wired over them, and
/// the loaded configuration.
#[derive(Clone, Builder)]
pub struct AppState {
    pub durable: Arc<dyn DurableStore>,
    pub cache: Arc<dyn RankingCache>,
    pub engine: Arc<Engine>,
    pub config: Config,
}

/// Get the airank database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect the durable store and run migrations.
async fn setup_database(config: &Config) -> anyhow::Result<PgStore> {
    let store = PgStore::connect(&config.database).await?;
    migrator().run(store.pool()).await?;
    Ok(store)
}

/// Pick the ranking cache implementation.
///
/// A configured-but-unreachable Redis degrades to the in-process cache
/// rather than failing startup; the volatile layer is never allowed to
/// take the service down.
async fn setup_cache(config: &Config) -> Arc<dyn RankingCache> {
    match &config.cache.url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => {
                info!("Using Redis ranking cache");
                Arc::new(cache)
            }
            Err(error) => {
                warn!(%error, "Redis unavailable, falling back to the in-process ranking cache");
                Arc::new(MemoryCache::new())
            }
        },
        None => {
            info!("No cache URL configured, using the in-process ranking cache");
            Arc::new(MemoryCache::new())
        }
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.cors.allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        origins.push(origin.parse::<HeaderValue>()?);
    }

    Ok(CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any))
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;

    let api_routes = Router::new()
        .route("/v1/metrics", post(metrics::ingest_metrics))
        .route("/leaderboard", get(leaderboard::get_leaderboard))
        .route("/user/{handle}", get(users::get_user))
        .route("/auth/verify", post(auth_handlers::verify_api_key))
        .route("/auth/sync", post(auth_handlers::sync_profile))
        .route(
            "/auth/device",
            post(device::create_device_code)
                .get(device::poll_device_code)
                .put(device::approve_device_code),
        )
        .with_state(state);

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(openapi::ApiDoc::openapi()) }),
        )
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", openapi::ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects the stores, runs
///    migrations, and builds the router
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting airank with configuration: {:#?}", config);

        let store = setup_database(&config).await?;
        let pool = store.pool().clone();
        let cache = setup_cache(&config).await;

        let durable: Arc<dyn DurableStore> = Arc::new(store);
        let engine = Arc::new(Engine::new(
            durable.clone(),
            cache.clone(),
            config.cache.command_timeout,
            config.cache.throughput_window,
        ));

        let state = AppState::builder()
            .durable(durable)
            .cache(cache)
            .engine(engine)
            .config(config.clone())
            .build();

        let router = build_router(state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "airank listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
