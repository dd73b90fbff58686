//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Catalog store error.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(err) => store_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::Duplicate { .. } => (StatusCode::CONFLICT, err.to_string()),
        StoreError::ForeignKey(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => {
            tracing::error!(error = %err, "store error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let duplicate = ApiError::from(StoreError::Duplicate {
            entity: "order",
            id: 1,
        });
        assert_eq!(duplicate.into_response().status(), StatusCode::CONFLICT);

        let missing = ApiError::NotFound("Product 3 not found".to_string());
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let commit = ApiError::from(StoreError::Commit("rejected".to_string()));
        assert_eq!(
            commit.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
