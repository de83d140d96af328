// ABOUTME: HTTP API layer for Vantage providing REST endpoints and routing
// ABOUTME: Integration layer that depends on all domain packages

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use vantage_ai::TextGenerator;
use vantage_digests::DigestManager;
use vantage_insights::SnapshotStorage;
use vantage_reports::ReportManager;

pub mod context;
pub mod digests_handlers;
pub mod reports_handlers;
pub mod response;
pub mod snapshots_handlers;
pub mod sse;

/// Default pacing delay between replayed audit events.
pub const DEFAULT_REPLAY_DELAY_MS: u64 = 150;

/// Shared handler state: one manager per feature area over one pool.
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<ReportManager>,
    pub digests: Arc<DigestManager>,
    pub snapshots: Arc<SnapshotStorage>,
    pub replay_delay: Duration,
}

impl AppState {
    pub fn new(pool: SqlitePool, generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_replay_delay(
            pool,
            generator,
            Duration::from_millis(DEFAULT_REPLAY_DELAY_MS),
        )
    }

    pub fn with_replay_delay(
        pool: SqlitePool,
        generator: Arc<dyn TextGenerator>,
        replay_delay: Duration,
    ) -> Self {
        AppState {
            reports: Arc::new(ReportManager::new(pool.clone(), generator)),
            digests: Arc::new(DigestManager::new(pool.clone())),
            snapshots: Arc::new(SnapshotStorage::new(pool)),
            replay_delay,
        }
    }
}

async fn health_check() -> Json<Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    Json(json!({
        "status": "healthy",
        "timestamp": timestamp,
        "version": env!("CARGO_PKG_VERSION"),
        "service": "vantage",
    }))
}

/// Creates the reports API router
pub fn create_reports_router() -> Router<AppState> {
    Router::new()
        .route("/", post(reports_handlers::create_report))
        .route("/", get(reports_handlers::list_reports))
        .route("/{id}", get(reports_handlers::get_report))
        .route("/{id}", patch(reports_handlers::update_report))
        .route("/{id}", delete(reports_handlers::delete_report))
        .route("/{id}/generate", post(reports_handlers::generate_report))
        .route("/{id}/approve", post(reports_handlers::approve_report))
        .route("/{id}/publish", post(reports_handlers::publish_report))
        .route("/{id}/archive", post(reports_handlers::archive_report))
        .route("/{id}/sections", get(reports_handlers::list_sections))
        .route(
            "/{id}/sections/reorder",
            post(reports_handlers::reorder_sections),
        )
        .route(
            "/{id}/sections/{section_id}",
            patch(reports_handlers::edit_section),
        )
        .route(
            "/{id}/sections/{section_id}/regenerate",
            post(reports_handlers::regenerate_section),
        )
        .route("/{id}/sources", get(reports_handlers::list_sources))
        .route(
            "/{id}/insights/refresh",
            post(reports_handlers::refresh_insights),
        )
        .route("/{id}/audit-log", get(reports_handlers::get_audit_log))
        .route(
            "/{id}/audit-log/replay",
            get(reports_handlers::replay_audit_log),
        )
}

/// Creates the digests API router
pub fn create_digests_router() -> Router<AppState> {
    Router::new()
        .route("/", post(digests_handlers::create_digest))
        .route("/", get(digests_handlers::list_digests))
        .route("/due", get(digests_handlers::get_due_digests))
        .route("/stats", get(digests_handlers::get_digest_stats))
        .route("/{id}", get(digests_handlers::get_digest))
        .route("/{id}", patch(digests_handlers::update_digest))
        .route("/{id}", delete(digests_handlers::delete_digest))
        .route("/{id}/archive", post(digests_handlers::archive_digest))
        .route("/{id}/recipients", post(digests_handlers::add_recipient))
        .route("/{id}/recipients", get(digests_handlers::list_recipients))
        .route(
            "/{id}/recipients/{recipient_id}",
            delete(digests_handlers::remove_recipient),
        )
        .route("/{id}/deliveries", post(digests_handlers::record_delivery))
}

/// Creates the snapshots API router
pub fn create_snapshots_router() -> Router<AppState> {
    Router::new()
        .route("/", post(snapshots_handlers::ingest_snapshot))
        .route("/", get(snapshots_handlers::list_snapshots))
        .route("/{id}", get(snapshots_handlers::get_snapshot))
        .route("/{id}", delete(snapshots_handlers::delete_snapshot))
}

/// Full API router with every feature area nested under /api
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/reports", create_reports_router())
        .nest("/api/digests", create_digests_router())
        .nest("/api/snapshots", create_snapshots_router())
        .with_state(state)
}
