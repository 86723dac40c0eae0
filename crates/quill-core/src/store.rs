//! The `DocumentStore` trait.
//!
//! Implemented by storage backends (e.g. `quill-store-sqlite`). Higher
//! layers (`quill-artifact`, `quill-api`) depend on this abstraction, not on
//! any concrete backend.
//!
//! Every invariant-bearing operation executes inside one atomic transaction
//! per call; uniqueness constraints convert races into clean
//! `ChainConflict`-style rejections rather than silent double-writes.

use std::future::Future;

use uuid::Uuid;

use crate::{
  action::{Action, ActionStatus, NewAction},
  actor::Actor,
  answer::{Answer, RatedAnswer},
  recommendation::{
    NewTrigger, RatingOutcome, RecommendationInstance, RecommendationTrigger,
  },
  summary::ChangeSummary,
  version::{
    DocumentVersion, DraftPatch, IssueOutcome, LockedArtifact, NewDraft,
  },
};

/// Abstraction over an issuance-engine backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error
    + Into<crate::Error>
    + Send
    + Sync
    + 'static;

  // ── Version chain ─────────────────────────────────────────────────────

  /// Create a new draft version. With `chain_id = None` a fresh chain is
  /// minted; otherwise fails with `ChainConflict` if the chain already has
  /// a draft.
  fn create_draft(
    &self,
    input: NewDraft,
    actor: Actor,
  ) -> impl Future<Output = Result<DocumentVersion, Self::Error>> + Send + '_;

  /// Retrieve a version by id. Returns `None` if not found.
  fn get_version(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<DocumentVersion>, Self::Error>> + Send + '_;

  /// All versions of a chain, ordered by version number.
  fn list_chain(
    &self,
    chain_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DocumentVersion>, Self::Error>> + Send + '_;

  /// Update descriptive fields of a draft. Fails with `VersionLocked` on
  /// an immutable version.
  fn update_draft(
    &self,
    id: Uuid,
    patch: DraftPatch,
    actor: Actor,
  ) -> impl Future<Output = Result<DocumentVersion, Self::Error>> + Send + '_;

  /// Record internal approval on a draft.
  fn record_approval(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<DocumentVersion, Self::Error>> + Send + '_;

  /// Atomically flip a draft to issued, demote any previously issued
  /// version in the chain to superseded, and generate the change summary
  /// against it — all in one transaction. The rendered artifact must
  /// already be staged; on any failure nothing is applied.
  fn commit_issue(
    &self,
    id: Uuid,
    actor: Actor,
    artifact: LockedArtifact,
  ) -> impl Future<Output = Result<IssueOutcome, Self::Error>> + Send + '_;

  /// Persist a renderer/storage failure message on a still-draft version.
  fn record_issue_failure(
    &self,
    id: Uuid,
    message: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Clone an issued version into a new draft, carrying forward unresolved
  /// actions with lineage pointers. Only legal when the chain has no
  /// existing draft.
  fn create_new_version_from(
    &self,
    issued_id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<DocumentVersion, Self::Error>> + Send + '_;

  // ── Answers & rule engine ─────────────────────────────────────────────

  /// Save a graded answer on a draft and synchronously run the
  /// recommendation rule engine against the trigger table.
  fn save_rating(
    &self,
    version_id: Uuid,
    input: RatedAnswer,
    actor: Actor,
  ) -> impl Future<Output = Result<RatingOutcome, Self::Error>> + Send + '_;

  fn list_answers(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Answer>, Self::Error>> + Send + '_;

  // ── Action ledger ─────────────────────────────────────────────────────

  /// Create an action on a draft. The chain-scoped reference number is
  /// reserved inside the same transaction as the insert.
  fn add_action(
    &self,
    input: NewAction,
    actor: Actor,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + '_;

  fn get_action(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Action>, Self::Error>> + Send + '_;

  /// Actions of a version; soft-deleted rows only when `include_deleted`.
  fn list_actions(
    &self,
    version_id: Uuid,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Vec<Action>, Self::Error>> + Send + '_;

  /// Close an open action on a draft version.
  fn close_action(
    &self,
    id: Uuid,
    actor: Actor,
    note: Option<String>,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + '_;

  /// Reopen a closed action. Elevated (admin) actors only.
  fn reopen_action(
    &self,
    id: Uuid,
    actor: Actor,
    note: Option<String>,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + '_;

  /// Move an action between non-closed statuses on a draft version.
  fn set_action_status(
    &self,
    id: Uuid,
    status: ActionStatus,
    actor: Actor,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + '_;

  /// Soft-delete an action on a draft version.
  fn delete_action(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Recommendation triggers & instances ───────────────────────────────

  fn add_trigger(
    &self,
    input: NewTrigger,
  ) -> impl Future<Output = Result<RecommendationTrigger, Self::Error>> + Send + '_;

  fn list_triggers(
    &self,
    active_only: bool,
  ) -> impl Future<Output = Result<Vec<RecommendationTrigger>, Self::Error>> + Send + '_;

  fn set_trigger_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<RecommendationTrigger, Self::Error>> + Send + '_;

  /// Recommendation instances of a version; retracted rows only when
  /// `include_retracted`.
  fn list_recommendations(
    &self,
    version_id: Uuid,
    include_retracted: bool,
  ) -> impl Future<Output = Result<Vec<RecommendationInstance>, Self::Error>> + Send + '_;

  // ── Change summaries ──────────────────────────────────────────────────

  /// The most recent change summary generated for `new_version_id`.
  fn change_summary(
    &self,
    new_version_id: Uuid,
  ) -> impl Future<Output = Result<Option<ChangeSummary>, Self::Error>> + Send + '_;
}
