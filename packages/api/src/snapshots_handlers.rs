// ABOUTME: HTTP request handlers for insight snapshot ingestion and the risk radar
// ABOUTME: Upstream feature areas write snapshots here; the radar and aggregator read them

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson},
    Json,
};
use tracing::info;

use vantage_core::{require_non_empty, require_unit_range};
use vantage_insights::{SnapshotCreateInput, SnapshotFilter};

use crate::context::ApiContext;
use crate::response::{ApiError, ApiResponse, ListData};
use crate::AppState;

fn validate_snapshot(input: &SnapshotCreateInput) -> Result<(), ApiError> {
    require_non_empty("title", &input.title)?;
    require_non_empty("sourceRef", &input.source_ref)?;
    if let Some(score) = input.relevance_score {
        require_unit_range("relevanceScore", score)?;
    }
    if let Some(score) = input.quality_score {
        require_unit_range("qualityScore", score)?;
    }
    Ok(())
}

/// Ingest one snapshot from an upstream feed
pub async fn ingest_snapshot(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Json(input): Json<SnapshotCreateInput>,
) -> impl IntoResponse {
    info!(
        "Ingesting snapshot from {} for org: {}",
        input.system, ctx.org_id
    );

    if let Err(err) = validate_snapshot(&input) {
        return err.into_response();
    }

    match state.snapshots.create(&ctx.org_id, input).await {
        Ok(snapshot) => {
            (StatusCode::CREATED, ResponseJson(ApiResponse::success(snapshot))).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Risk radar listing. An empty window is an empty page, not an error.
pub async fn list_snapshots(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Query(filter): Query<SnapshotFilter>,
) -> impl IntoResponse {
    let offset = filter.offset.unwrap_or(0);

    match state.snapshots.list(&ctx.org_id, &filter).await {
        Ok((snapshots, total)) => ResponseJson(ApiResponse::success(ListData::new(
            snapshots, total, offset,
        )))
        .into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(snapshot_id): Path<String>,
) -> impl IntoResponse {
    match state.snapshots.get(&ctx.org_id, &snapshot_id).await {
        Ok(Some(snapshot)) => ResponseJson(ApiResponse::success(snapshot)).into_response(),
        Ok(None) => ResponseJson(ApiResponse::<()>::null()).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Hard delete. Snapshots are feed data, not compliance records.
pub async fn delete_snapshot(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(snapshot_id): Path<String>,
) -> impl IntoResponse {
    info!("Deleting snapshot: {}", snapshot_id);

    match state.snapshots.delete(&ctx.org_id, &snapshot_id).await {
        Ok(true) => {
            ResponseJson(ApiResponse::success(serde_json::json!({ "deleted": true })))
                .into_response()
        }
        Ok(false) => ApiError::NotFound("Snapshot").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::{create_snapshots_router, AppState};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use vantage_ai::{AIServiceResult, GeneratedText, GenerationRequest, TextGenerator, Usage};

    struct NoopGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for NoopGenerator {
        async fn generate_text(
            &self,
            _request: GenerationRequest,
        ) -> AIServiceResult<GeneratedText> {
            Ok(GeneratedText {
                text: String::new(),
                usage: Usage::default(),
            })
        }
    }

    async fn test_app() -> Router {
        let pool = vantage_storage::connect_memory().await.unwrap();
        vantage_storage::run_migrations(&pool).await.unwrap();
        let state = AppState::with_replay_delay(
            pool,
            Arc::new(NoopGenerator),
            Duration::from_millis(0),
        );
        create_snapshots_router().with_state(state)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-org-id", "org-a");
        match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_and_filter_by_risk() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/",
                Some(json!({
                    "system": "crisis_detection",
                    "sourceRef": "feed://crisis/221",
                    "title": "Recall chatter spiking",
                    "riskLevel": "high",
                    "relevanceScore": 0.9
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["data"]["system"], "crisis_detection");
        assert_eq!(created["data"]["riskLevel"], "high");

        let response = app
            .oneshot(request(Method::GET, "/?riskLevel=high", None))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed["data"]["total"], 1);
        assert_eq!(listed["data"]["items"][0]["title"], "Recall chatter spiking");
    }

    #[tokio::test]
    async fn test_ingest_rejects_out_of_range_score() {
        let app = test_app().await;

        let response = app
            .oneshot(request(
                Method::POST,
                "/",
                Some(json!({
                    "system": "media_monitoring",
                    "sourceRef": "feed://mm/1",
                    "title": "Front page",
                    "relevanceScore": 1.5
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_missing_snapshot_is_not_found() {
        let app = test_app().await;

        let response = app
            .oneshot(request(Method::DELETE, "/snp-missing", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
