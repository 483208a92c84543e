mod config;
mod error;
mod metrics;
mod models;
mod routes;
mod services;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{ledger::Ledger, m3u::M3uService, store::JsonStore};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
    pub m3u: M3uService,
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "painel_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting Painel Server v{}", env!("CARGO_PKG_VERSION"));

    // Flat-file store and account ledger
    let store = JsonStore::new(&config.data_dir);
    let ledger = Ledger::load(store, &config.admin_user, &config.admin_password).await;
    tracing::info!("Ledger loaded from {}", config.data_dir);

    // Playlist ingestion engine
    let m3u = M3uService::new(
        &config.m3u_url,
        &config.user_agent,
        config.fetch_timeout_ms,
        config.cache_ttl_secs,
        config.max_attempts,
    );
    if config.m3u_url.is_empty() {
        tracing::warn!("M3U_URL is not set, playlists will be empty");
    }

    // Build application state
    let state = Arc::new(AppState {
        config,
        ledger,
        m3u,
        start_time: Instant::now(),
    });

    // Warm the channel cache so the first playback request is fast
    let warm_state = state.clone();
    tokio::spawn(async move {
        let channels = warm_state.m3u.channels().await;
        tracing::info!("Channel cache warmed: {} channels", channels.len());
    });

    // Build router
    let app = Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        // Xtream-compatible playback endpoints
        .route("/get.php", get(routes::xtream::get_playlist))
        .route("/player_api.php", get(routes::xtream::player_api))
        .route("/xmltv.php", get(routes::xtream::xmltv))
        // Panel API
        .route("/api/login", post(routes::panel::login))
        .route("/api/dashboard", get(routes::panel::dashboard))
        .route(
            "/api/clients",
            get(routes::panel::list_clients).post(routes::panel::create_client),
        )
        .route("/api/clients/:id", delete(routes::panel::delete_client))
        .route("/api/clients/:id/block", post(routes::panel::toggle_block))
        .route("/api/clients/:id/info", get(routes::panel::client_info))
        .route(
            "/api/resellers",
            get(routes::panel::list_resellers).post(routes::panel::create_reseller),
        )
        .route(
            "/api/resellers/:name",
            delete(routes::panel::delete_reseller),
        )
        .route(
            "/api/profile",
            get(routes::panel::get_profile).put(routes::panel::update_profile),
        )
        .route(
            "/api/settings",
            get(routes::panel::get_settings).put(routes::panel::update_settings),
        )
        .route(
            "/api/settings/maintenance",
            post(routes::panel::toggle_maintenance),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
