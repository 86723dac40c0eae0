//! Error taxonomy for the issuance engine.
//!
//! All invariant violations are rejected synchronously before any state
//! change; nothing is fixed up after the fact.

use thiserror::Error;
use uuid::Uuid;

use crate::{action::ActionStatus, issue::IssuePrecondition};

#[derive(Debug, Error)]
pub enum Error {
  #[error("version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("action not found: {0}")]
  ActionNotFound(Uuid),

  #[error("trigger not found: {0}")]
  TriggerNotFound(Uuid),

  /// A single-draft or single-issued constraint would be violated.
  /// Recoverable: inspect the chain and retry against current state.
  #[error("chain {chain_id} conflict: {reason}")]
  ChainConflict { chain_id: Uuid, reason: String },

  /// Attempted mutation of an issued/superseded version. Not retryable;
  /// the caller must create a new version instead.
  #[error("version {0} is locked")]
  VersionLocked(Uuid),

  /// One or more issue preconditions failed; the full list is surfaced.
  #[error("issue preconditions failed: {0:?}")]
  IssueValidation(Vec<IssuePrecondition>),

  /// Renderer or blob-store failure during issuance. The version remains a
  /// draft with the message persisted for operator visibility.
  #[error("artifact generation failed: {0}")]
  ArtifactGenerationFailed(String),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  /// A closed action may only be reopened; other transitions need an
  /// elevated actor.
  #[error("action {0} is closed")]
  ActionClosed(Uuid),

  /// The requested status change is not part of the action lifecycle,
  /// e.g. closing without the closure path, or reopening a non-closed action.
  #[error("action {id}: invalid transition {from:?} -> {to:?}")]
  InvalidTransition {
    id:   Uuid,
    from: ActionStatus,
    to:   ActionStatus,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Backend-specific failure passed through from a store implementation.
  #[error("storage error: {0}")]
  Storage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
