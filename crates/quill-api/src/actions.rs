//! Handlers for the action ledger.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/versions/:id/actions` | Body: [`NewActionBody`]; returns 201 |
//! | `GET`    | `/versions/:id/actions` | `?include_deleted=true` for audit views |
//! | `GET`    | `/actions/:id` | Single action |
//! | `POST`   | `/actions/:id/close` | Body: `{"note":"..."}` (optional) |
//! | `POST`   | `/actions/:id/reopen` | Admin-gated; body: `{"note":"..."}` |
//! | `POST`   | `/actions/:id/status` | Non-closure status moves only |
//! | `DELETE` | `/actions/:id` | Soft delete; returns 204 |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use quill_core::{
  action::{Action, ActionStatus, NewAction},
  store::DocumentStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, actor::ActorContext, error::ApiError};

// ─── Create / list ───────────────────────────────────────────────────────────

/// JSON body accepted by `POST /versions/:id/actions`.
#[derive(Debug, Deserialize)]
pub struct NewActionBody {
  pub title:       String,
  pub description: Option<String>,
}

/// `POST /versions/:id/actions` — the reference number is allocated by the
/// store and returned on the stored action.
pub async fn create<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(version_id): Path<Uuid>,
  ActorContext(actor): ActorContext,
  Json(body): Json<NewActionBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore,
{
  let action = state
    .store
    .add_action(
      NewAction {
        version_id,
        title: body.title,
        description: body.description,
      },
      actor,
    )
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(action)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_deleted: bool,
}

/// `GET /versions/:id/actions[?include_deleted=true]`
pub async fn list<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(version_id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Action>>, ApiError>
where
  S: DocumentStore,
{
  let actions = state
    .store
    .list_actions(version_id, params.include_deleted)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(actions))
}

/// `GET /actions/:id`
pub async fn get_one<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Action>, ApiError>
where
  S: DocumentStore,
{
  let action = state
    .store
    .get_action(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("action {id} not found")))?;
  Ok(Json(action))
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NoteBody {
  pub note: Option<String>,
}

/// `POST /actions/:id/close`
pub async fn close<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
  Json(body): Json<NoteBody>,
) -> Result<Json<Action>, ApiError>
where
  S: DocumentStore,
{
  let action = state
    .store
    .close_action(id, actor, body.note)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(action))
}

/// `POST /actions/:id/reopen` — requires the elevated role.
pub async fn reopen<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
  Json(body): Json<NoteBody>,
) -> Result<Json<Action>, ApiError>
where
  S: DocumentStore,
{
  let action = state
    .store
    .reopen_action(id, actor, body.note)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(action))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: ActionStatus,
}

/// `POST /actions/:id/status` — closure must go through `/close` so the
/// audit fields are recorded.
pub async fn set_status<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
  Json(body): Json<StatusBody>,
) -> Result<Json<Action>, ApiError>
where
  S: DocumentStore,
{
  let action = state
    .store
    .set_action_status(id, body.status, actor)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(action))
}

/// `DELETE /actions/:id` — soft delete, returns 204.
pub async fn delete_one<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
) -> Result<StatusCode, ApiError>
where
  S: DocumentStore,
{
  state
    .store
    .delete_action(id, actor)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
