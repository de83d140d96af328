// ABOUTME: HTTP request handlers for digest shells, recipient rosters, and delivery callbacks
// ABOUTME: Includes the scheduler-facing due query and the degraded stats endpoint

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use vantage_digests::{
    DeliveryOutcome, DigestCreateInput, DigestFilter, DigestUpdateInput, RecipientInput,
};

use crate::context::ApiContext;
use crate::response::{ApiError, ApiResponse, ListData};
use crate::AppState;

/// Create a digest shell
pub async fn create_digest(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Json(input): Json<DigestCreateInput>,
) -> impl IntoResponse {
    info!("Creating digest '{}' for org: {}", input.title, ctx.org_id);

    match state.digests.create(&ctx, input).await {
        Ok(digest) => {
            (StatusCode::CREATED, ResponseJson(ApiResponse::success(digest))).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn list_digests(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Query(filter): Query<DigestFilter>,
) -> impl IntoResponse {
    let offset = filter.offset.unwrap_or(0);

    match state.digests.list(&ctx, &filter).await {
        Ok((digests, total)) => ResponseJson(ApiResponse::success(ListData::new(
            digests, total, offset,
        )))
        .into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Get a single digest; missing rows are `data: null`
pub async fn get_digest(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(digest_id): Path<String>,
) -> impl IntoResponse {
    match state.digests.get(&ctx, &digest_id).await {
        Ok(Some(digest)) => ResponseJson(ApiResponse::success(digest)).into_response(),
        Ok(None) => ResponseJson(ApiResponse::<()>::null()).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn update_digest(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(digest_id): Path<String>,
    Json(patch): Json<DigestUpdateInput>,
) -> impl IntoResponse {
    info!("Updating digest: {}", digest_id);

    match state.digests.update(&ctx, &digest_id, patch).await {
        Ok(Some(digest)) => ResponseJson(ApiResponse::success(digest)).into_response(),
        Ok(None) => ApiError::NotFound("Digest").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn archive_digest(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(digest_id): Path<String>,
) -> impl IntoResponse {
    info!("Archiving digest: {}", digest_id);

    match state.digests.archive(&ctx, &digest_id).await {
        Ok(Some(digest)) => ResponseJson(ApiResponse::success(digest)).into_response(),
        Ok(None) => ApiError::NotFound("Digest").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn delete_digest(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(digest_id): Path<String>,
) -> impl IntoResponse {
    info!("Deleting digest: {}", digest_id);

    match state.digests.delete(&ctx, &digest_id).await {
        Ok(true) => {
            ResponseJson(ApiResponse::success(serde_json::json!({ "deleted": true })))
                .into_response()
        }
        Ok(false) => ApiError::NotFound("Digest").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct DueParams {
    pub at: Option<DateTime<Utc>>,
}

/// Scheduler read: active digests due at or before `at` (default now)
pub async fn get_due_digests(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Query(params): Query<DueParams>,
) -> impl IntoResponse {
    let at = params.at.unwrap_or_else(Utc::now);

    match state.digests.get_due(&ctx, at).await {
        Ok(digests) => ResponseJson(ApiResponse::success(digests)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct StatsParams {
    #[serde(rename = "digestId")]
    pub digest_id: Option<String>,
}

/// Aggregate counts. Degrades to zeros when the aggregate query fails,
/// so this endpoint never errors on storage trouble.
pub async fn get_digest_stats(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Query(params): Query<StatsParams>,
) -> impl IntoResponse {
    let stats = state
        .digests
        .get_stats(&ctx, params.digest_id.as_deref())
        .await;

    ResponseJson(ApiResponse::success(stats))
}

/// Add (or refresh) a roster entry
pub async fn add_recipient(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(digest_id): Path<String>,
    Json(input): Json<RecipientInput>,
) -> impl IntoResponse {
    info!("Adding recipient to digest: {}", digest_id);

    match state.digests.add_recipient(&ctx, &digest_id, input).await {
        Ok(Some(recipient)) => {
            (StatusCode::CREATED, ResponseJson(ApiResponse::success(recipient))).into_response()
        }
        Ok(None) => ApiError::NotFound("Digest").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn list_recipients(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(digest_id): Path<String>,
) -> impl IntoResponse {
    match state.digests.list_recipients(&ctx, &digest_id).await {
        Ok(recipients) => ResponseJson(ApiResponse::success(recipients)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn remove_recipient(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path((digest_id, recipient_id)): Path<(String, String)>,
) -> impl IntoResponse {
    info!(
        "Removing recipient {} from digest {}",
        recipient_id, digest_id
    );

    match state
        .digests
        .remove_recipient(&ctx, &digest_id, &recipient_id)
        .await
    {
        Ok(true) => {
            ResponseJson(ApiResponse::success(serde_json::json!({ "removed": true })))
                .into_response()
        }
        Ok(false) => ApiError::NotFound("Recipient").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Scheduler callback: record a dispatch attempt and roll the schedule
pub async fn record_delivery(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(digest_id): Path<String>,
    Json(outcome): Json<DeliveryOutcome>,
) -> impl IntoResponse {
    info!("Recording delivery for digest: {}", digest_id);

    match state.digests.record_delivery(&ctx, &digest_id, outcome).await {
        Ok(Some(record)) => {
            (StatusCode::CREATED, ResponseJson(ApiResponse::success(record))).into_response()
        }
        Ok(None) => ApiError::NotFound("Digest").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::{create_digests_router, AppState};
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
        create_digests_router().with_state(state)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-org-id", "org-a")
            .header("x-actor-email", "ops@acme.test");
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

    async fn create_digest(app: &Router, body: Value) -> Value {
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn test_create_digest_with_only_title_uses_defaults() {
        let app = test_app().await;

        let json = create_digest(&app, json!({ "title": "Basic Digest" })).await;

        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["title"], "Basic Digest");
        assert_eq!(json["data"]["deliveryPeriod"], "weekly");
        assert_eq!(json["data"]["timeWindow"], "7d");
        assert_eq!(json["data"]["scheduleHour"], 8);
        assert_eq!(json["data"]["status"], "active");
        assert!(json["data"]["nextDeliveryAt"].is_string());
    }

    #[tokio::test]
    async fn test_create_digest_rejects_out_of_range_hour() {
        let app = test_app().await;

        let response = app
            .oneshot(request(
                Method::POST,
                "/",
                Some(json!({ "title": "Late shift", "scheduleHour": 24 })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_due_endpoint_honors_at_parameter() {
        let app = test_app().await;
        create_digest(&app, json!({ "title": "Weekly wrap" })).await;

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/due", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let now = body_json(response).await;
        assert_eq!(now["data"].as_array().unwrap().len(), 0);

        let response = app
            .oneshot(request(Method::GET, "/due?at=2099-01-01T00:00:00Z", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let later = body_json(response).await;
        assert_eq!(later["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recipient_roster_roundtrip() {
        let app = test_app().await;
        let digest = create_digest(&app, json!({ "title": "Roster" })).await;
        let digest_id = digest["data"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/{}/recipients", digest_id),
                Some(json!({ "email": "  CEO@Acme.test ", "name": "Pat" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let added = body_json(response).await;
        assert_eq!(added["data"]["email"], "ceo@acme.test");
        let recipient_id = added["data"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request(
                Method::GET,
                &format!("/{}/recipients", digest_id),
                None,
            ))
            .await
            .unwrap();
        let roster = body_json(response).await;
        assert_eq!(roster["data"].as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(request(
                Method::DELETE,
                &format!("/{}/recipients/{}", digest_id, recipient_id),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let removed = body_json(response).await;
        assert_eq!(removed["data"]["removed"], true);
    }

    #[tokio::test]
    async fn test_add_recipient_to_missing_digest_is_not_found() {
        let app = test_app().await;

        let response = app
            .oneshot(request(
                Method::POST,
                "/dig-missing/recipients",
                Some(json!({ "email": "ceo@acme.test" })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Digest not found");
    }

    #[tokio::test]
    async fn test_delivery_callback_records_and_reschedules() {
        let app = test_app().await;
        let digest = create_digest(&app, json!({ "title": "Callback" })).await;
        let digest_id = digest["data"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/{}/deliveries", digest_id),
                Some(json!({ "status": "sent", "recipientCount": 4 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let record = body_json(response).await;
        assert_eq!(record["data"]["status"], "sent");
        assert_eq!(record["data"]["recipientCount"], 4);

        let response = app
            .oneshot(request(Method::GET, &format!("/{}", digest_id), None))
            .await
            .unwrap();
        let refreshed = body_json(response).await;
        assert!(refreshed["data"]["lastDeliveryAt"].is_string());
        let next: chrono::DateTime<chrono::Utc> = refreshed["data"]["nextDeliveryAt"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(next > chrono::Utc::now());
    }

    #[tokio::test]
    async fn test_stats_endpoint_always_answers() {
        let app = test_app().await;
        create_digest(&app, json!({ "title": "Counted" })).await;

        let response = app
            .oneshot(request(Method::GET, "/stats", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["totalDigests"], 1);
        assert_eq!(json["data"]["activeDigests"], 1);
    }
}
