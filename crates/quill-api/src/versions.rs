//! Handlers for version-chain, answer, and artifact endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/versions` | Body: [`NewDraftBody`]; returns 201 + the draft |
//! | `GET`   | `/versions/:id` | Single version |
//! | `PATCH` | `/versions/:id` | Body: [`DraftPatch`]; drafts only |
//! | `POST`  | `/versions/:id/approve` | Record internal approval |
//! | `POST`  | `/versions/:id/issue` | Render, stage, and commit atomically |
//! | `POST`  | `/versions/:id/next` | New draft from an issued version |
//! | `GET`   | `/versions/:id/artifact` | Signed URL + checksum of the locked export |
//! | `GET`   | `/versions/:id/integrity` | `?checksum=` comparison |
//! | `GET`   | `/versions/:id/summary` | Change summary generated at issuance |
//! | `GET`   | `/chains/:chain_id/versions` | Whole chain, ordered |
//! | `PUT`   | `/versions/:id/answers` | Body: [`RatedAnswer`]; runs the rule engine |
//! | `GET`   | `/versions/:id/answers` | All answers of the version |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use quill_artifact::{ArtifactDecision, BlobStore, Renderer, artifact_decision};
use quill_core::{
  answer::{Answer, RatedAnswer},
  recommendation::RatingOutcome,
  store::DocumentStore,
  summary::ChangeSummary,
  version::{DocumentVersion, DraftPatch, IssueOutcome, NewDraft},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, actor::ActorContext, error::ApiError};

// ─── Create ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /versions`.
#[derive(Debug, Deserialize)]
pub struct NewDraftBody {
  /// Omit to mint a fresh chain.
  pub chain_id:          Option<Uuid>,
  pub title:             String,
  pub document_type:     String,
  pub scope:             Option<String>,
  #[serde(default)]
  pub requires_approval: bool,
}

/// `POST /versions` — returns 201 + the stored draft.
pub async fn create<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  ActorContext(actor): ActorContext,
  Json(body): Json<NewDraftBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore,
{
  let draft = state
    .store
    .create_draft(
      NewDraft {
        chain_id:          body.chain_id,
        title:             body.title,
        document_type:     body.document_type,
        scope:             body.scope,
        requires_approval: body.requires_approval,
      },
      actor,
    )
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(draft)))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /versions/:id`
pub async fn get_one<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<DocumentVersion>, ApiError>
where
  S: DocumentStore,
{
  let version = state
    .store
    .get_version(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("version {id} not found")))?;
  Ok(Json(version))
}

/// `GET /chains/:chain_id/versions`
pub async fn list_chain<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(chain_id): Path<Uuid>,
) -> Result<Json<Vec<DocumentVersion>>, ApiError>
where
  S: DocumentStore,
{
  let versions = state
    .store
    .list_chain(chain_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(versions))
}

// ─── Mutate ──────────────────────────────────────────────────────────────────

/// `PATCH /versions/:id` — body is a [`DraftPatch`].
pub async fn update<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
  Json(patch): Json<DraftPatch>,
) -> Result<Json<DocumentVersion>, ApiError>
where
  S: DocumentStore,
{
  if patch.is_empty() {
    return Err(ApiError::BadRequest("empty patch".into()));
  }
  let version = state
    .store
    .update_draft(id, patch, actor)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(version))
}

/// `POST /versions/:id/approve`
pub async fn approve<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
) -> Result<Json<DocumentVersion>, ApiError>
where
  S: DocumentStore,
{
  let version = state
    .store
    .record_approval(id, actor)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(version))
}

/// `POST /versions/:id/issue` — the full render-then-commit flow.
pub async fn issue<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
) -> Result<Json<IssueOutcome>, ApiError>
where
  S: DocumentStore,
  R: Renderer,
  B: BlobStore,
{
  let outcome = state.issuer.issue(state.store.as_ref(), id, actor).await?;
  Ok(Json(outcome))
}

/// `POST /versions/:id/next` — returns 201 + the new draft with carried
/// actions.
pub async fn next_version<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore,
{
  let draft = state
    .store
    .create_new_version_from(id, actor)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(draft)))
}

// ─── Artifact ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ArtifactParams {
  /// Signed-URL lifetime in seconds. Default 300.
  pub ttl: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactInfo {
  pub url:          String,
  pub checksum:     String,
  pub size_bytes:   u64,
  pub generated_at: DateTime<Utc>,
}

/// `GET /versions/:id/artifact[?ttl=300]`
///
/// Issued and superseded versions serve the locked artifact; drafts have
/// none yet.
pub async fn artifact<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ArtifactParams>,
) -> Result<Json<ArtifactInfo>, ApiError>
where
  S: DocumentStore,
  R: Renderer,
  B: BlobStore,
{
  let version = state
    .store
    .get_version(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("version {id} not found")))?;

  match artifact_decision(&version) {
    ArtifactDecision::Regenerate => Err(ApiError::BadRequest(
      "version is a draft; issue it to lock an artifact".into(),
    )),
    ArtifactDecision::LegacyMissing => Err(ApiError::NotFound(format!(
      "version {id} has no locked artifact"
    ))),
    ArtifactDecision::Cached => {
      let locked = version.artifact.ok_or_else(|| {
        ApiError::NotFound(format!("version {id} has no locked artifact"))
      })?;
      let url = state
        .issuer
        .artifact_url(state.store.as_ref(), id, params.ttl.unwrap_or(300))
        .await?;
      Ok(Json(ArtifactInfo {
        url,
        checksum:     locked.checksum,
        size_bytes:   locked.size_bytes,
        generated_at: locked.generated_at,
      }))
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct IntegrityParams {
  pub checksum: String,
}

/// `GET /versions/:id/integrity?checksum=<sha256-hex>`
pub async fn integrity<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  Query(params): Query<IntegrityParams>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DocumentStore,
  R: Renderer,
  B: BlobStore,
{
  let valid = state
    .issuer
    .verify_integrity(state.store.as_ref(), id, &params.checksum)
    .await?;
  Ok(Json(serde_json::json!({ "valid": valid })))
}

// ─── Change summary ──────────────────────────────────────────────────────────

/// `GET /versions/:id/summary`
pub async fn summary<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ChangeSummary>, ApiError>
where
  S: DocumentStore,
{
  let summary = state
    .store
    .change_summary(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("no change summary for version {id}"))
    })?;
  Ok(Json(summary))
}

// ─── Answers ─────────────────────────────────────────────────────────────────

/// `PUT /versions/:id/answers` — body is a [`RatedAnswer`]; runs the
/// recommendation rule engine synchronously and reports what it did.
pub async fn save_answer<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
  ActorContext(actor): ActorContext,
  Json(body): Json<RatedAnswer>,
) -> Result<Json<RatingOutcome>, ApiError>
where
  S: DocumentStore,
{
  let outcome = state
    .store
    .save_rating(id, body, actor)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}

/// `GET /versions/:id/answers`
pub async fn list_answers<S, R, B>(
  State(state): State<AppState<S, R, B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Answer>>, ApiError>
where
  S: DocumentStore,
{
  let answers = state
    .store
    .list_answers(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(answers))
}
