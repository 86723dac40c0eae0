//! The issuance coordinator.
//!
//! Rendering may be slow, so it happens outside the datastore transaction:
//! the export is rendered and staged in the blob store first, then the
//! pointer and the state flip commit atomically via
//! [`DocumentStore::commit_issue`]. If the commit is rejected the staged
//! blob is deleted best-effort; an orphaned blob is never observable as an
//! issued artifact because only the committed pointer counts.

use chrono::Utc;
use uuid::Uuid;

use quill_core::{
  Error, Result,
  actor::Actor,
  issue::validate_issue,
  store::DocumentStore,
  version::{DocumentVersion, IssueOutcome, IssueState, LockedArtifact},
};

use crate::{
  blob::BlobStore,
  checksum::{checksums_match, sha256_hex},
  renderer::{ExportSnapshot, Renderer},
};

// ─── Regeneration policy ─────────────────────────────────────────────────────

/// What to do when an export of a version is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDecision {
  /// Drafts are always rendered fresh.
  Regenerate,
  /// Issued/superseded versions serve the locked artifact.
  Cached,
  /// Immutable version with no artifact — pre-migration data. Served as
  /// not-regenerable, surfaced as a warning.
  LegacyMissing,
}

/// Decide whether an export request should re-render.
pub fn artifact_decision(version: &DocumentVersion) -> ArtifactDecision {
  match version.issue_state {
    IssueState::Draft => ArtifactDecision::Regenerate,
    IssueState::Issued | IssueState::Superseded => {
      if version.artifact.is_some() {
        ArtifactDecision::Cached
      } else {
        tracing::warn!(version = %version.id, "immutable version has no locked artifact");
        ArtifactDecision::LegacyMissing
      }
    }
  }
}

// ─── Issuer ──────────────────────────────────────────────────────────────────

/// Couples a renderer and a blob store into the issuance flow.
#[derive(Debug, Clone)]
pub struct Issuer<R, B> {
  renderer: R,
  blobs:    B,
}

impl<R, B> Issuer<R, B>
where
  R: Renderer,
  B: BlobStore,
{
  pub fn new(renderer: R, blobs: B) -> Self { Self { renderer, blobs } }

  /// Issue a draft version: validate preconditions, render and stage the
  /// export, then commit the artifact pointer and state flip atomically.
  ///
  /// On renderer or blob failure the version remains a draft with the
  /// failure message persisted; retries are the caller's responsibility and
  /// re-enter here from scratch.
  pub async fn issue<S>(
    &self,
    store: &S,
    version_id: Uuid,
    actor: Actor,
  ) -> Result<IssueOutcome>
  where
    S: DocumentStore,
  {
    let version = store
      .get_version(version_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::VersionNotFound(version_id))?;

    let answers = store.list_answers(version_id).await.map_err(Into::into)?;
    let actions = store
      .list_actions(version_id, false)
      .await
      .map_err(Into::into)?;

    validate_issue(&version, answers.len(), actor)
      .map_err(Error::IssueValidation)?;

    let snapshot = ExportSnapshot { version, answers, actions };

    let rendered = match self.renderer.render(&snapshot).await {
      Ok(r)  => r,
      Err(e) => return self.abort(store, version_id, e.to_string()).await,
    };

    let checksum = sha256_hex(&rendered.bytes);
    let size_bytes = rendered.bytes.len() as u64;
    let staging_path =
      format!("artifacts/{version_id}/{}", Uuid::new_v4());

    let blob_ref = match self.blobs.put(staging_path, rendered.bytes).await {
      Ok(r)  => r,
      Err(e) => return self.abort(store, version_id, e.to_string()).await,
    };

    let artifact = LockedArtifact {
      blob_ref:     blob_ref.clone(),
      checksum,
      size_bytes,
      generated_at: Utc::now(),
    };

    match store.commit_issue(version_id, actor, artifact).await {
      Ok(outcome) => {
        tracing::info!(
          version = %version_id,
          superseded = ?outcome.superseded,
          "issued version"
        );
        Ok(outcome)
      }
      Err(e) => {
        // The staged blob is unreferenced; drop it so it cannot linger.
        if let Err(cleanup) = self.blobs.delete(blob_ref).await {
          tracing::warn!(version = %version_id, error = %cleanup, "staged artifact cleanup failed");
        }
        Err(e.into())
      }
    }
  }

  async fn abort<S>(
    &self,
    store: &S,
    version_id: Uuid,
    message: String,
  ) -> Result<IssueOutcome>
  where
    S: DocumentStore,
  {
    tracing::warn!(version = %version_id, error = %message, "issuance aborted");
    store
      .record_issue_failure(version_id, message.clone())
      .await
      .map_err(Into::into)?;
    Err(Error::ArtifactGenerationFailed(message))
  }

  /// Compare a supplied checksum against the stored one. `false` when the
  /// version has no locked artifact.
  pub async fn verify_integrity<S>(
    &self,
    store: &S,
    version_id: Uuid,
    supplied: &str,
  ) -> Result<bool>
  where
    S: DocumentStore,
  {
    let version = store
      .get_version(version_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::VersionNotFound(version_id))?;

    Ok(
      version
        .artifact
        .map(|a| checksums_match(&a.checksum, supplied))
        .unwrap_or(false),
    )
  }

  /// A time-limited sharing URL for a version's locked artifact.
  pub async fn artifact_url<S>(
    &self,
    store: &S,
    version_id: Uuid,
    ttl_seconds: u64,
  ) -> Result<String>
  where
    S: DocumentStore,
  {
    let version = store
      .get_version(version_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::VersionNotFound(version_id))?;

    let artifact = version
      .artifact
      .ok_or_else(|| Error::Storage(format!("version {version_id} has no artifact")))?;

    self
      .blobs
      .signed_url(artifact.blob_ref, ttl_seconds)
      .await
      .map_err(|e| Error::Storage(e.to_string()))
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use quill_core::{
    answer::RatedAnswer,
    issue::IssuePrecondition,
    version::NewDraft,
  };
  use quill_store_sqlite::SqliteStore;

  use super::*;
  use crate::renderer::{FailingRenderer, JsonSnapshotRenderer};
  use crate::MemoryBlobStore;

  fn editor() -> Actor { Actor::editor(Uuid::new_v4()) }

  fn draft_input() -> NewDraft {
    NewDraft {
      chain_id:          None,
      title:             "Warehouse survey".into(),
      document_type:     "risk_assessment".into(),
      scope:             None,
      requires_approval: false,
    }
  }

  async fn draft_with_answer(store: &SqliteStore) -> (DocumentVersion, Actor) {
    let actor = editor();
    let v = store.create_draft(draft_input(), actor).await.unwrap();
    store
      .save_rating(
        v.id,
        RatedAnswer {
          section_key: "FP_09".into(),
          field_key:   "hotWork".into(),
          value:       serde_json::json!("controlled"),
          rating:      Some("good".into()),
        },
        actor,
      )
      .await
      .unwrap();
    (v, actor)
  }

  #[tokio::test]
  async fn issue_locks_artifact_and_flips_state() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let blobs = MemoryBlobStore::new();
    let issuer = Issuer::new(JsonSnapshotRenderer, blobs.clone());
    let (v, actor) = draft_with_answer(&store).await;

    let outcome = issuer.issue(&store, v.id, actor).await.unwrap();

    assert_eq!(outcome.version.issue_state, IssueState::Issued);
    let artifact = outcome.version.artifact.unwrap();
    assert_eq!(artifact.checksum.len(), 64);
    assert!(artifact.size_bytes > 0);

    // The staged blob is the committed one.
    let bytes = blobs.get(artifact.blob_ref.clone()).await.unwrap();
    assert_eq!(sha256_hex(&bytes), artifact.checksum);
  }

  #[tokio::test]
  async fn render_failure_leaves_version_draft() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let blobs = MemoryBlobStore::new();
    let issuer = Issuer::new(FailingRenderer, blobs.clone());
    let (v, actor) = draft_with_answer(&store).await;

    let err = issuer.issue(&store, v.id, actor).await.unwrap_err();
    assert!(matches!(err, Error::ArtifactGenerationFailed(_)));

    let after = store.get_version(v.id).await.unwrap().unwrap();
    assert_eq!(after.issue_state, IssueState::Draft);
    assert!(after.artifact.is_none());
    assert!(after.issue_error.is_some());
    assert!(blobs.is_empty());
  }

  #[tokio::test]
  async fn failed_issue_is_retryable_from_scratch() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let (v, actor) = draft_with_answer(&store).await;

    let failing = Issuer::new(FailingRenderer, MemoryBlobStore::new());
    failing.issue(&store, v.id, actor).await.unwrap_err();

    let working = Issuer::new(JsonSnapshotRenderer, MemoryBlobStore::new());
    let outcome = working.issue(&store, v.id, actor).await.unwrap();
    assert_eq!(outcome.version.issue_state, IssueState::Issued);
    // The stale failure message is cleared by the successful issue.
    assert!(outcome.version.issue_error.is_none());
  }

  #[tokio::test]
  async fn preconditions_reported_together() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let issuer = Issuer::new(JsonSnapshotRenderer, MemoryBlobStore::new());
    let actor = editor();
    // No answers saved, and the viewer lacks permission.
    let v = store.create_draft(draft_input(), actor).await.unwrap();

    let err = issuer
      .issue(&store, v.id, Actor::viewer(Uuid::new_v4()))
      .await
      .unwrap_err();

    let Error::IssueValidation(failed) = err else {
      panic!("expected IssueValidation, got {err:?}");
    };
    assert!(failed.contains(&IssuePrecondition::MissingPermission));
    assert!(failed.contains(&IssuePrecondition::NoPopulatedAnswers));
  }

  #[tokio::test]
  async fn double_issue_is_rejected_before_rendering() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let issuer = Issuer::new(JsonSnapshotRenderer, MemoryBlobStore::new());
    let (v, actor) = draft_with_answer(&store).await;

    issuer.issue(&store, v.id, actor).await.unwrap();
    let err = issuer.issue(&store, v.id, actor).await.unwrap_err();
    assert!(matches!(err, Error::IssueValidation(_)));
  }

  #[tokio::test]
  async fn verify_integrity_checks_stored_checksum() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let issuer = Issuer::new(JsonSnapshotRenderer, MemoryBlobStore::new());
    let (v, actor) = draft_with_answer(&store).await;

    let outcome = issuer.issue(&store, v.id, actor).await.unwrap();
    let checksum = outcome.version.artifact.unwrap().checksum;

    assert!(issuer.verify_integrity(&store, v.id, &checksum).await.unwrap());
    assert!(
      issuer
        .verify_integrity(&store, v.id, &checksum.to_uppercase())
        .await
        .unwrap()
    );
    assert!(!issuer.verify_integrity(&store, v.id, "deadbeef").await.unwrap());
  }

  #[tokio::test]
  async fn verify_integrity_false_without_artifact() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let issuer = Issuer::new(JsonSnapshotRenderer, MemoryBlobStore::new());
    let (v, _) = draft_with_answer(&store).await;

    assert!(!issuer.verify_integrity(&store, v.id, "anything").await.unwrap());
  }

  #[tokio::test]
  async fn artifact_url_serves_committed_blob() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let issuer = Issuer::new(JsonSnapshotRenderer, MemoryBlobStore::new());
    let (v, actor) = draft_with_answer(&store).await;

    issuer.issue(&store, v.id, actor).await.unwrap();
    let url = issuer.artifact_url(&store, v.id, 300).await.unwrap();
    assert!(url.contains(&v.id.to_string()));
  }

  #[test]
  fn decision_follows_issue_state() {
    let id = Uuid::new_v4();
    let mut v = DocumentVersion {
      id,
      chain_id:          id,
      version_number:    1,
      issue_state:       IssueState::Draft,
      superseded_by:     None,
      title:             "t".into(),
      document_type:     "d".into(),
      scope:             None,
      created_at:        Utc::now(),
      created_by:        Uuid::new_v4(),
      issued_at:         None,
      issued_by:         None,
      requires_approval: false,
      approved_at:       None,
      approved_by:       None,
      artifact:          None,
      issue_error:       None,
    };

    assert_eq!(artifact_decision(&v), ArtifactDecision::Regenerate);

    v.issue_state = IssueState::Issued;
    assert_eq!(artifact_decision(&v), ArtifactDecision::LegacyMissing);

    v.artifact = Some(LockedArtifact {
      blob_ref:     "artifacts/x".into(),
      checksum:     "00".into(),
      size_bytes:   2,
      generated_at: Utc::now(),
    });
    assert_eq!(artifact_decision(&v), ArtifactDecision::Cached);

    v.issue_state = IssueState::Superseded;
    assert_eq!(artifact_decision(&v), ArtifactDecision::Cached);
  }
}
