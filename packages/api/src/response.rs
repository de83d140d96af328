// ABOUTME: Shared API response types and error handling
// ABOUTME: Every endpoint answers with the same {success, data, error} envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson},
};
use serde::Serialize;
use tracing::error;

use vantage_core::ValidationError;
use vantage_digests::DigestError;
use vantage_reports::ReportError;
use vantage_storage::StorageError;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Success with an explicit `data: null`. Single-entity reads use
    /// this for rows that do not exist (or belong to another org).
    pub fn null() -> ApiResponse<T> {
        ApiResponse {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Payload for list endpoints: the page plus enough to keep paging.
#[derive(Serialize)]
pub struct ListData<T> {
    pub items: Vec<T>,
    pub total: i64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

impl<T> ListData<T> {
    pub fn new(items: Vec<T>, total: i64, offset: i64) -> Self {
        let has_more = offset + (items.len() as i64) < total;
        ListData {
            items,
            total,
            has_more,
        }
    }
}

/// Domain errors funneled into one HTTP mapping. Storage detail is
/// logged here and never leaks into the response body.
pub enum ApiError {
    Report(ReportError),
    Digest(DigestError),
    Storage(StorageError),
    Validation(ValidationError),
    NotFound(&'static str),
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Report(err)
    }
}

impl From<DigestError> for ApiError {
    fn from(err: DigestError) -> Self {
        ApiError::Digest(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

fn storage_response(err: StorageError) -> (StatusCode, String) {
    match err {
        StorageError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        other => {
            error!("Storage error: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Report(err) => match err {
                ReportError::Storage(storage) => storage_response(storage),
                ReportError::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
                ReportError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "Report not found".to_string())
                }
                ReportError::SectionNotFound(_) => {
                    (StatusCode::NOT_FOUND, "Section not found".to_string())
                }
                ReportError::InvalidTransition { .. } | ReportError::InvalidState(_) => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                ReportError::Generation(detail) => {
                    error!("Generation failed: {}", detail);
                    (
                        StatusCode::BAD_GATEWAY,
                        "Failed to generate report content".to_string(),
                    )
                }
            },
            ApiError::Digest(err) => match err {
                DigestError::Storage(storage) => storage_response(storage),
                DigestError::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
            },
            ApiError::Storage(storage) => storage_response(storage),
            ApiError::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{} not found", what))
            }
        };

        (status, ResponseJson(ApiResponse::<()>::error(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_data_has_more() {
        let page = ListData::new(vec![1, 2, 3], 10, 0);
        assert!(page.has_more);

        let last_page = ListData::new(vec![9, 10], 10, 8);
        assert!(!last_page.has_more);

        let exact = ListData::new(vec![1, 2], 2, 0);
        assert!(!exact.has_more);
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = serde_json::to_value(ApiResponse::success(5)).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["data"], 5);
        assert!(ok["error"].is_null());

        let null = serde_json::to_value(ApiResponse::<i64>::null()).unwrap();
        assert_eq!(null["success"], true);
        assert!(null["data"].is_null());

        let err = serde_json::to_value(ApiResponse::<()>::error("boom".to_string())).unwrap();
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "boom");
    }
}
