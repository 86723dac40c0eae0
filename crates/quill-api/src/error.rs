//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! The domain error taxonomy maps onto HTTP statuses here and nowhere else;
//! handlers convert store errors with [`ApiError::store`] and let `?` do the
//! rest.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use quill_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  /// Lift a store-backend error into the domain taxonomy.
  pub fn store<E: Into<CoreError>>(e: E) -> Self { Self::Core(e.into()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => {
        (StatusCode::BAD_REQUEST, json!({ "error": m }))
      }
      ApiError::Core(e) => match e {
        CoreError::VersionNotFound(_)
        | CoreError::ActionNotFound(_)
        | CoreError::TriggerNotFound(_) => {
          (StatusCode::NOT_FOUND, json!({ "error": e.to_string() }))
        }
        CoreError::ChainConflict { .. }
        | CoreError::VersionLocked(_)
        | CoreError::ActionClosed(_)
        | CoreError::InvalidTransition { .. } => {
          (StatusCode::CONFLICT, json!({ "error": e.to_string() }))
        }
        // Every failing precondition in one response.
        CoreError::IssueValidation(failed) => (
          StatusCode::UNPROCESSABLE_ENTITY,
          json!({
            "error": "issue preconditions failed",
            "preconditions": failed,
          }),
        ),
        CoreError::ArtifactGenerationFailed(_) => {
          (StatusCode::BAD_GATEWAY, json!({ "error": e.to_string() }))
        }
        CoreError::PermissionDenied(_) => {
          (StatusCode::FORBIDDEN, json!({ "error": e.to_string() }))
        }
        CoreError::Serialization(_) => {
          (StatusCode::BAD_REQUEST, json!({ "error": e.to_string() }))
        }
        CoreError::Storage(_) => (
          StatusCode::INTERNAL_SERVER_ERROR,
          json!({ "error": e.to_string() }),
        ),
      },
    };
    (status, Json(body)).into_response()
  }
}
