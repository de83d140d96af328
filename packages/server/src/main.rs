// ABOUTME: Vantage server entry point
// ABOUTME: Wires config, database, AI service, and the HTTP router together

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, Method};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod config;

use config::Config;
use vantage_ai::AIService;
use vantage_api::{create_api_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            std::process::exit(1);
        }
    };

    info!("Starting Vantage server on port {}", config.port);
    info!("Database: {}", config.db_path);

    let pool = if config.db_path == ":memory:" {
        vantage_storage::connect_memory().await?
    } else {
        vantage_storage::connect(Path::new(&config.db_path)).await?
    };
    vantage_storage::run_migrations(&pool).await?;

    let generator = Arc::new(AIService::new(
        config.anthropic_api_key.clone(),
        config.generation_timeout_secs,
    )?);

    let state = AppState::with_replay_delay(
        pool,
        generator,
        Duration::from_millis(config.replay_delay_ms),
    );

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<axum::http::HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-org-id"),
            HeaderName::from_static("x-actor-email"),
        ]);

    let app = create_api_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
