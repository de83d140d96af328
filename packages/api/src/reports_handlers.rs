// ABOUTME: HTTP request handlers for report lifecycle operations
// ABOUTME: Create through publish, section editing, insight refresh, audit reads and replay

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{sse::Event, IntoResponse, Json as ResponseJson, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{info, warn};

use vantage_core::generate_id;
use vantage_reports::{
    GenerateOptions, PublishOptions, RefreshOptions, ReportCreateInput, ReportFilter,
    ReportUpdateInput,
};

use crate::context::ApiContext;
use crate::response::{ApiError, ApiResponse, ListData};
use crate::sse::{create_sse_event, create_sse_response};
use crate::AppState;

/// Create a new report in draft
pub async fn create_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Json(input): Json<ReportCreateInput>,
) -> impl IntoResponse {
    info!("Creating report '{}' for org: {}", input.title, ctx.org_id);

    match state.reports.create(&ctx, input).await {
        Ok(report) => {
            (StatusCode::CREATED, ResponseJson(ApiResponse::success(report))).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// List reports with filters and pagination
pub async fn list_reports(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Query(filter): Query<ReportFilter>,
) -> impl IntoResponse {
    let offset = filter.offset.unwrap_or(0);

    match state.reports.list(&ctx, &filter).await {
        Ok((reports, total)) => ResponseJson(ApiResponse::success(ListData::new(
            reports, total, offset,
        )))
        .into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Get a single report. A missing (or foreign) report is `data: null`,
/// not a 404: reads never reveal whether a row exists elsewhere.
pub async fn get_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    match state.reports.get(&ctx, &report_id).await {
        Ok(Some(report)) => ResponseJson(ApiResponse::success(report)).into_response(),
        Ok(None) => ResponseJson(ApiResponse::<()>::null()).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Patch report fields
pub async fn update_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
    Json(patch): Json<ReportUpdateInput>,
) -> impl IntoResponse {
    info!("Updating report: {}", report_id);

    match state.reports.update(&ctx, &report_id, patch).await {
        Ok(Some(report)) => ResponseJson(ApiResponse::success(report)).into_response(),
        Ok(None) => ApiError::NotFound("Report").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Run a full generation pass over the report's planned sections
pub async fn generate_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
    options: Option<Json<GenerateOptions>>,
) -> impl IntoResponse {
    info!("Generating report: {}", report_id);
    let options = options.map(|Json(o)| o).unwrap_or_default();

    match state.reports.generate(&ctx, &report_id, options).await {
        Ok(run) => ResponseJson(ApiResponse::success(run)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn approve_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    info!("Approving report: {}", report_id);

    match state.reports.approve(&ctx, &report_id).await {
        Ok(report) => ResponseJson(ApiResponse::success(report)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn publish_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
    options: Option<Json<PublishOptions>>,
) -> impl IntoResponse {
    info!("Publishing report: {}", report_id);
    let options = options.map(|Json(o)| o).unwrap_or_default();

    match state.reports.publish(&ctx, &report_id, options).await {
        Ok(report) => ResponseJson(ApiResponse::success(report)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn archive_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    info!("Archiving report: {}", report_id);

    match state.reports.archive(&ctx, &report_id).await {
        Ok(report) => ResponseJson(ApiResponse::success(report)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub hard: bool,
}

/// Delete a report. Soft delete archives; `?hard=true` removes the row
/// while the audit trail survives.
pub async fn delete_report(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> impl IntoResponse {
    info!("Deleting report: {} (hard: {})", report_id, params.hard);

    match state.reports.delete(&ctx, &report_id, params.hard).await {
        Ok(true) => ResponseJson(ApiResponse::success(serde_json::json!({
            "deleted": true,
            "hard": params.hard,
        })))
        .into_response(),
        Ok(false) => ApiError::NotFound("Report").into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn list_sections(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    match state.reports.sections(&ctx, &report_id).await {
        Ok(sections) => ResponseJson(ApiResponse::success(sections)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct EditSectionRequest {
    pub content: String,
}

/// Manually edit one section's markdown
pub async fn edit_section(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path((report_id, section_id)): Path<(String, String)>,
    Json(request): Json<EditSectionRequest>,
) -> impl IntoResponse {
    info!("Editing section {} of report {}", section_id, report_id);

    match state
        .reports
        .edit_section(&ctx, &report_id, &section_id, &request.content)
        .await
    {
        Ok(section) => ResponseJson(ApiResponse::success(section)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Regenerate one section while the report is in review
pub async fn regenerate_section(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path((report_id, section_id)): Path<(String, String)>,
) -> impl IntoResponse {
    info!("Regenerating section {} of report {}", section_id, report_id);

    match state
        .reports
        .regenerate_section(&ctx, &report_id, &section_id)
        .await
    {
        Ok(section) => ResponseJson(ApiResponse::success(section)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    #[serde(rename = "orderedIds")]
    pub ordered_ids: Vec<String>,
}

/// Reorder sections; the id set must match exactly or nothing moves
pub async fn reorder_sections(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> impl IntoResponse {
    info!("Reordering sections of report {}", report_id);

    match state
        .reports
        .reorder_sections(&ctx, &report_id, &request.ordered_ids)
        .await
    {
        Ok(sections) => ResponseJson(ApiResponse::success(sections)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn list_sources(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    match state.reports.sources(&ctx, &report_id).await {
        Ok(sources) => ResponseJson(ApiResponse::success(sources)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Re-aggregate upstream insights and re-attach sources
pub async fn refresh_insights(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
    options: Option<Json<RefreshOptions>>,
) -> impl IntoResponse {
    info!("Refreshing insights for report: {}", report_id);
    let options = options.map(|Json(o)| o).unwrap_or_default();

    match state.reports.refresh_insights(&ctx, &report_id, options).await {
        Ok(refresh) => ResponseJson(ApiResponse::success(refresh)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Chronological audit trail for a report
pub async fn get_audit_log(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    match state.reports.audit_log(&ctx, &report_id).await {
        Ok(entries) => ResponseJson(ApiResponse::success(entries)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// SSE replay of a report's audit trail: `connected`, `replay.started`,
/// one `replay.progress` per entry in chronological order with a short
/// pacing delay, then `replay.completed`.
pub async fn replay_audit_log(
    State(state): State<AppState>,
    ApiContext(ctx): ApiContext,
    Path(report_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Starting audit replay stream for report: {}", report_id);

    let entries = match state.reports.audit_log(&ctx, &report_id).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Audit replay read failed for report {}: {}", report_id, err);
            Vec::new()
        }
    };
    let delay = state.replay_delay;

    let stream = async_stream::stream! {
        yield Ok(create_sse_event(
            "connected",
            &serde_json::json!({ "reportId": report_id }),
        ));

        let run_id = generate_id("replay");
        let total_events = entries.len();

        yield Ok(create_sse_event(
            "replay.started",
            &serde_json::json!({ "runId": run_id, "totalEvents": total_events }),
        ));

        for (index, entry) in entries.iter().enumerate() {
            tokio::time::sleep(delay).await;
            let progress = ((index + 1) * 100 / total_events.max(1)) as u32;
            yield Ok(create_sse_event(
                "replay.progress",
                &serde_json::json!({
                    "runId": run_id,
                    "progress": progress,
                    "currentEvent": entry,
                    "totalEvents": total_events,
                }),
            ));
        }

        yield Ok(create_sse_event(
            "replay.completed",
            &serde_json::json!({ "runId": run_id, "totalEvents": total_events }),
        ));
    };

    create_sse_response(stream)
}
