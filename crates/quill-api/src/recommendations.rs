//! Handlers for the recommendation trigger table and materialised instances.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/triggers` | Body: [`NewTrigger`]; returns 201 |
//! | `GET`  | `/triggers` | `?active_only=true` to hide disabled rules |
//! | `PUT`  | `/triggers/:id/active` | Body: `{"active":false}` |
//! | `GET`  | `/versions/:id/recommendations` | `?include_retracted=true` for audit |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use quill_core::{
  recommendation::{NewTrigger, RecommendationInstance, RecommendationTrigger},
  store::DocumentStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `POST /triggers` — returns 201 + the stored trigger with its normalised
/// rating value.
pub async fn create_trigger<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Json(body): Json<NewTrigger>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore,
{
  let trigger = state
    .store
    .add_trigger(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(trigger)))
}

#[derive(Debug, Deserialize)]
pub struct TriggerListParams {
  #[serde(default)]
  pub active_only: bool,
}

/// `GET /triggers[?active_only=true]`
pub async fn list_triggers<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Query(params): Query<TriggerListParams>,
) -> Result<Json<Vec<RecommendationTrigger>>, ApiError>
where
  S: DocumentStore,
{
  let triggers = state
    .store
    .list_triggers(params.active_only)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(triggers))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub active: bool,
}

/// `PUT /triggers/:id/active`
pub async fn set_trigger_active<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<RecommendationTrigger>, ApiError>
where
  S: DocumentStore,
{
  let trigger = state
    .store
    .set_trigger_active(id, body.active)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(trigger))
}

#[derive(Debug, Deserialize)]
pub struct InstanceListParams {
  #[serde(default)]
  pub include_retracted: bool,
}

/// `GET /versions/:id/recommendations[?include_retracted=true]`
pub async fn list_for_version<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(version_id): Path<Uuid>,
  Query(params): Query<InstanceListParams>,
) -> Result<Json<Vec<RecommendationInstance>>, ApiError>
where
  S: DocumentStore,
{
  let instances = state
    .store
    .list_recommendations(version_id, params.include_retracted)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(instances))
}
