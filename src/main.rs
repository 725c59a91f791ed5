//! koda-gateway server entry point.
//!
//! Starts the Axum HTTP server and, unless disabled, the background sync
//! scheduler and cache purger.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use koda_gateway::api;
use koda_gateway::app_state::AppState;
use koda_gateway::config::{AppConfig, LogFormat};
use koda_gateway::persistence::{CalendarStore, InMemoryStore, KeyValueStore, PostgresStore};
use koda_gateway::provider::GoogleCalendarClient;
use koda_gateway::scheduler::{CachePurger, SyncScheduler};
use koda_gateway::service::{SuggestionService, SyncService};
use koda_gateway::suggestions::{
    CachedFetcher, OsmClient, SuggestionCache, SuggestionFetcher, TicketmasterClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting koda-gateway");

    // Build persistence layer
    let (store, kv, persistence): (Arc<dyn CalendarStore>, Arc<dyn KeyValueStore>, &'static str) =
        if config.persistence_enabled {
            let pg = PostgresStore::connect(&config)
                .await
                .context("connecting to PostgreSQL")?;
            pg.migrate().await.context("running migrations")?;
            let pg = Arc::new(pg);
            (
                Arc::clone(&pg) as Arc<dyn CalendarStore>,
                pg as Arc<dyn KeyValueStore>,
                "postgres",
            )
        } else {
            tracing::warn!("persistence disabled, using in-memory store");
            let mem = Arc::new(InMemoryStore::new());
            (
                Arc::clone(&mem) as Arc<dyn CalendarStore>,
                mem as Arc<dyn KeyValueStore>,
                "memory",
            )
        };

    // Build service layer
    let http = reqwest::Client::new();
    let provider = Arc::new(GoogleCalendarClient::with_client(
        http.clone(),
        config.google_api_base_url.clone(),
    ));
    let sync_service = Arc::new(SyncService::new(
        Arc::clone(&store),
        provider,
        config.provider_timeout,
    ));

    let cache = Arc::new(SuggestionCache::from_kind(
        config.suggestion_cache_backend,
        Arc::clone(&kv),
        config.suggestion_cache_ttl,
    ));
    let ticketed: Arc<dyn SuggestionFetcher> = Arc::new(CachedFetcher::new(
        Arc::new(TicketmasterClient::new(
            http.clone(),
            config.ticketmaster_base_url.clone(),
            config.ticketmaster_api_key.clone(),
        )),
        Arc::clone(&cache),
    ));
    let places: Arc<dyn SuggestionFetcher> = Arc::new(CachedFetcher::new(
        Arc::new(OsmClient::new(
            http,
            config.nominatim_url.clone(),
            config.overpass_url.clone(),
        )),
        cache,
    ));
    let suggestion_service = Arc::new(SuggestionService::new(
        ticketed,
        places,
        config.suggestion_timeout,
    ));

    // Start background jobs
    match config.sync_interval() {
        Some(period) => {
            let _scheduler = SyncScheduler::new(Arc::clone(&sync_service), period).spawn();
        }
        None => tracing::info!("sync scheduler disabled"),
    }
    if let Some(period) = config.cache_purge_interval() {
        let _purger = CachePurger::new(kv, period).spawn();
    }

    // Build application state
    let app_state = AppState {
        sync_service,
        suggestion_service,
        persistence,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
