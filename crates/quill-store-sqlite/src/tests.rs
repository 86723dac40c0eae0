//! Integration tests for `SqliteStore`, run against in-memory databases.

use chrono::Utc;
use uuid::Uuid;

use quill_core::{
  Error as CoreError,
  action::{ActionStatus, NewAction},
  actor::Actor,
  answer::RatedAnswer,
  issue::IssuePrecondition,
  recommendation::NewTrigger,
  store::DocumentStore,
  version::{DraftPatch, IssueState, LockedArtifact, NewDraft},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.unwrap()
}

fn new_draft(chain_id: Option<Uuid>) -> NewDraft {
  NewDraft {
    chain_id,
    title: "Riverside Mill".into(),
    document_type: "risk_assessment".into(),
    scope: Some("fire & machinery".into()),
    requires_approval: false,
  }
}

fn artifact() -> LockedArtifact {
  LockedArtifact {
    blob_ref:     format!("artifacts/{}", Uuid::new_v4()),
    checksum:     "ab".repeat(32),
    size_bytes:   1024,
    generated_at: Utc::now(),
  }
}

fn rated(section: &str, field: &str, rating: Option<&str>) -> RatedAnswer {
  RatedAnswer {
    section_key: section.into(),
    field_key:   field.into(),
    value:       serde_json::json!({ "observed": true }),
    rating:      rating.map(Into::into),
  }
}

fn assert_core(err: Error, check: impl FnOnce(&CoreError) -> bool) {
  match err {
    Error::Core(core) => assert!(check(&core), "unexpected core error: {core}"),
    other => panic!("expected core error, got: {other}"),
  }
}

// ─── Version chain ───────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_chain_id_equals_first_version_id() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());

  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  assert_eq!(v1.chain_id, v1.id);
  assert_eq!(v1.version_number, 1);
  assert_eq!(v1.issue_state, IssueState::Draft);
  assert!(v1.artifact.is_none());
}

#[tokio::test]
async fn second_draft_in_a_chain_is_a_chain_conflict() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());

  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  let err = store
    .create_draft(new_draft(Some(v1.chain_id)), actor)
    .await
    .unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::ChainConflict { .. }));
}

#[tokio::test]
async fn viewers_cannot_create_drafts() {
  let store = store().await;
  let err = store
    .create_draft(new_draft(None), Actor::viewer(Uuid::new_v4()))
    .await
    .unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn draft_patch_updates_descriptive_fields() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();

  let patch = DraftPatch {
    title: Some("Riverside Mill — revised".into()),
    document_type: None,
    scope: Some(None),
  };
  let updated = store.update_draft(v1.id, patch, actor).await.unwrap();
  assert_eq!(updated.title, "Riverside Mill — revised");
  assert_eq!(updated.document_type, "risk_assessment");
  assert_eq!(updated.scope, None);
}

#[tokio::test]
async fn issuance_supersedes_the_previous_version() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());

  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  let out1 = store.commit_issue(v1.id, actor, artifact()).await.unwrap();
  assert_eq!(out1.version.issue_state, IssueState::Issued);
  assert!(out1.superseded.is_none());
  assert!(out1.summary.is_none());
  assert!(out1.version.artifact.is_some());

  let v2 = store.create_new_version_from(v1.id, actor).await.unwrap();
  assert_eq!(v2.version_number, 2);
  assert_eq!(v2.chain_id, v1.chain_id);

  let out2 = store.commit_issue(v2.id, actor, artifact()).await.unwrap();
  assert_eq!(out2.superseded, Some(v1.id));

  let old = store.get_version(v1.id).await.unwrap().unwrap();
  assert_eq!(old.issue_state, IssueState::Superseded);
  assert_eq!(old.superseded_by, Some(v2.id));

  let chain = store.list_chain(v1.chain_id).await.unwrap();
  let numbers: Vec<u32> = chain.iter().map(|v| v.version_number).collect();
  assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn issued_versions_reject_mutation() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  store.commit_issue(v1.id, actor, artifact()).await.unwrap();

  let err = store
    .update_draft(v1.id, DraftPatch { title: Some("x".into()), ..Default::default() }, actor)
    .await
    .unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::VersionLocked(_)));

  let err = store
    .save_rating(v1.id, rated("FP_09", "hotWork", Some("poor")), actor)
    .await
    .unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::VersionLocked(_)));

  let err = store
    .add_action(NewAction::new(v1.id, "too late"), actor)
    .await
    .unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::VersionLocked(_)));
}

#[tokio::test]
async fn rejected_mutations_leave_the_locked_record_unchanged() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  let a = store.add_action(NewAction::new(v1.id, "sprinklers"), actor).await.unwrap();
  store.commit_issue(v1.id, actor, artifact()).await.unwrap();

  let before = store.get_version(v1.id).await.unwrap().unwrap();
  let actions_before = store.list_actions(v1.id, true).await.unwrap();

  store
    .update_draft(v1.id, DraftPatch { title: Some("x".into()), ..Default::default() }, actor)
    .await
    .unwrap_err();
  store.close_action(a.id, actor, None).await.unwrap_err();
  store.delete_action(a.id, actor).await.unwrap_err();

  assert_eq!(store.get_version(v1.id).await.unwrap().unwrap(), before);
  assert_eq!(store.list_actions(v1.id, true).await.unwrap(), actions_before);
}

#[tokio::test]
async fn double_issue_is_rejected_with_preconditions() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  store.commit_issue(v1.id, actor, artifact()).await.unwrap();

  let err = store.commit_issue(v1.id, actor, artifact()).await.unwrap_err();
  assert_core(err, |e| {
    matches!(
      e,
      CoreError::IssueValidation(failed)
        if failed.iter().any(|p| matches!(p, IssuePrecondition::NotDraft { .. }))
          && failed.iter().any(|p| matches!(p, IssuePrecondition::ArtifactAlreadyPresent))
    )
  });
}

#[tokio::test]
async fn issue_failure_is_persisted_and_version_stays_draft() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();

  store
    .record_issue_failure(v1.id, "renderer timed out".into())
    .await
    .unwrap();

  let v1 = store.get_version(v1.id).await.unwrap().unwrap();
  assert_eq!(v1.issue_state, IssueState::Draft);
  assert!(v1.artifact.is_none());
  assert_eq!(v1.issue_error.as_deref(), Some("renderer timed out"));

  // A later successful issue clears the stored failure.
  let out = store.commit_issue(v1.id, actor, artifact()).await.unwrap();
  assert!(out.version.issue_error.is_none());
}

#[tokio::test]
async fn new_version_requires_an_issued_source() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();

  let err = store.create_new_version_from(v1.id, actor).await.unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::ChainConflict { .. }));
}

#[tokio::test]
async fn new_version_while_a_draft_exists_is_a_chain_conflict() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  store.commit_issue(v1.id, actor, artifact()).await.unwrap();
  store.create_new_version_from(v1.id, actor).await.unwrap();

  let err = store.create_new_version_from(v1.id, actor).await.unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::ChainConflict { .. }));
}

#[tokio::test]
async fn approval_is_recorded_on_the_draft() {
  let store = store().await;
  let approver = Actor::admin(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), approver).await.unwrap();
  assert!(v1.approved_at.is_none());

  let v1 = store.record_approval(v1.id, approver).await.unwrap();
  assert!(v1.approved_at.is_some());
  assert_eq!(v1.approved_by, Some(approver.actor_id));
}

// ─── Action ledger ───────────────────────────────────────────────────────────

#[tokio::test]
async fn reference_numbers_are_sequential_within_the_chain() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();

  let a1 = store.add_action(NewAction::new(v1.id, "sprinklers"), actor).await.unwrap();
  let a2 = store.add_action(NewAction::new(v1.id, "hot work permits"), actor).await.unwrap();
  assert_eq!(a1.reference_number, "R-01");
  assert_eq!(a2.reference_number, "R-02");

  // The counter is chain-scoped: numbers keep climbing in the next version
  // even though carried copies reuse their original references.
  store.commit_issue(v1.id, actor, artifact()).await.unwrap();
  let v2 = store.create_new_version_from(v1.id, actor).await.unwrap();
  let a3 = store.add_action(NewAction::new(v2.id, "alarm upgrade"), actor).await.unwrap();
  assert_eq!(a3.reference_number, "R-03");
}

#[tokio::test]
async fn reference_numbers_are_not_reused_after_soft_delete() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();

  let a1 = store.add_action(NewAction::new(v1.id, "mistake"), actor).await.unwrap();
  assert_eq!(a1.reference_number, "R-01");
  store.delete_action(a1.id, actor).await.unwrap();

  // The counter never rewinds; the deleted action keeps R-01 for audit.
  let a2 = store.add_action(NewAction::new(v1.id, "real item"), actor).await.unwrap();
  assert_eq!(a2.reference_number, "R-02");
}

#[tokio::test]
async fn carry_forward_copies_unresolved_actions_with_lineage() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();

  let open = store.add_action(NewAction::new(v1.id, "open item"), actor).await.unwrap();
  let started = store.add_action(NewAction::new(v1.id, "started item"), actor).await.unwrap();
  let deferred = store.add_action(NewAction::new(v1.id, "deferred item"), actor).await.unwrap();
  let done = store.add_action(NewAction::new(v1.id, "done item"), actor).await.unwrap();

  store.set_action_status(started.id, ActionStatus::InProgress, actor).await.unwrap();
  store.set_action_status(deferred.id, ActionStatus::Deferred, actor).await.unwrap();
  store.close_action(done.id, actor, Some("fixed on site".into())).await.unwrap();

  store.commit_issue(v1.id, actor, artifact()).await.unwrap();
  let v2 = store.create_new_version_from(v1.id, actor).await.unwrap();

  let carried = store.list_actions(v2.id, false).await.unwrap();
  assert_eq!(carried.len(), 3);

  let by_origin = |id| carried.iter().find(|a| a.origin_action_id == Some(id)).unwrap();
  // In-progress resets to open; deferred survives as deferred.
  assert_eq!(by_origin(open.id).status, ActionStatus::Open);
  assert_eq!(by_origin(started.id).status, ActionStatus::Open);
  assert_eq!(by_origin(deferred.id).status, ActionStatus::Deferred);

  // References and the original source version are preserved.
  assert_eq!(by_origin(open.id).reference_number, open.reference_number);
  assert_eq!(by_origin(open.id).source_version_id, v1.id);
  assert!(carried.iter().all(|a| a.id != open.id));
}

#[tokio::test]
async fn closing_records_audit_fields_and_is_not_repeatable() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  let a = store.add_action(NewAction::new(v1.id, "guard rails"), actor).await.unwrap();

  let closed = store
    .close_action(a.id, actor, Some("installed".into()))
    .await
    .unwrap();
  assert_eq!(closed.status, ActionStatus::Closed);
  assert_eq!(closed.closed_by, Some(actor.actor_id));
  assert_eq!(closed.closure_note.as_deref(), Some("installed"));
  assert!(closed.closed_at.is_some());

  let err = store.close_action(a.id, actor, None).await.unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::ActionClosed(_)));
}

#[tokio::test]
async fn reopening_requires_the_elevated_role() {
  let store = store().await;
  let editor = Actor::editor(Uuid::new_v4());
  let admin = Actor::admin(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), editor).await.unwrap();
  let a = store.add_action(NewAction::new(v1.id, "guard rails"), editor).await.unwrap();
  store.close_action(a.id, editor, None).await.unwrap();

  let err = store.reopen_action(a.id, editor, None).await.unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::PermissionDenied(_)));

  let reopened = store
    .reopen_action(a.id, admin, Some("not actually done".into()))
    .await
    .unwrap();
  assert_eq!(reopened.status, ActionStatus::Open);
  assert_eq!(reopened.reopened_by, Some(admin.actor_id));
  assert_eq!(reopened.reopen_note.as_deref(), Some("not actually done"));
  // Closure audit trail survives the reopen.
  assert!(reopened.closed_at.is_some());
}

#[tokio::test]
async fn reopening_a_non_closed_action_is_an_invalid_transition() {
  let store = store().await;
  let admin = Actor::admin(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), admin).await.unwrap();
  let a = store.add_action(NewAction::new(v1.id, "open item"), admin).await.unwrap();

  let err = store.reopen_action(a.id, admin, None).await.unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn status_changes_cannot_bypass_the_closure_path() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  let a = store.add_action(NewAction::new(v1.id, "open item"), actor).await.unwrap();

  let moved = store
    .set_action_status(a.id, ActionStatus::InProgress, actor)
    .await
    .unwrap();
  assert_eq!(moved.status, ActionStatus::InProgress);

  let err = store
    .set_action_status(a.id, ActionStatus::Closed, actor)
    .await
    .unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn deleted_actions_are_hidden_but_retained() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  let a = store.add_action(NewAction::new(v1.id, "mistake"), actor).await.unwrap();

  store.delete_action(a.id, actor).await.unwrap();

  assert!(store.list_actions(v1.id, false).await.unwrap().is_empty());
  let all = store.list_actions(v1.id, true).await.unwrap();
  assert_eq!(all.len(), 1);
  assert!(all[0].is_deleted());

  // Already-deleted rows are gone as far as mutation is concerned.
  let err = store.close_action(a.id, actor, None).await.unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::ActionNotFound(_)));
}

// ─── Answers & rule engine ───────────────────────────────────────────────────

async fn seed_trigger(store: &SqliteStore, template_id: Uuid) {
  store
    .add_trigger(NewTrigger {
      section_key:  "FP_09".into(),
      field_key:    "hotWork".into(),
      rating_value: "Poor".into(),
      template_id,
      priority:     10,
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn answers_upsert_per_field() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();

  store.save_rating(v1.id, rated("FP_09", "hotWork", Some("good")), actor).await.unwrap();
  store.save_rating(v1.id, rated("FP_09", "hotWork", Some("fair")), actor).await.unwrap();

  let answers = store.list_answers(v1.id).await.unwrap();
  assert_eq!(answers.len(), 1);
  assert_eq!(answers[0].rating.as_deref(), Some("fair"));
}

#[tokio::test]
async fn rating_save_materialises_recommendations_idempotently() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  seed_trigger(&store, Uuid::new_v4()).await;

  let first = store
    .save_rating(v1.id, rated("FP_09", "hotWork", Some("Poor")), actor)
    .await
    .unwrap();
  assert_eq!(first.matched, 1);
  assert_eq!(first.upserted, 1);

  // Saving the identical rating again inserts nothing.
  let again = store
    .save_rating(v1.id, rated("FP_09", "hotWork", Some("poor")), actor)
    .await
    .unwrap();
  assert_eq!(again.upserted, 0);
  assert_eq!(again.retracted, 0);

  let recs = store.list_recommendations(v1.id, false).await.unwrap();
  assert_eq!(recs.len(), 1);
  assert_eq!(recs[0].rating_value, "poor");
}

#[tokio::test]
async fn improving_a_rating_soft_retracts() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  seed_trigger(&store, Uuid::new_v4()).await;

  store.save_rating(v1.id, rated("FP_09", "hotWork", Some("poor")), actor).await.unwrap();
  let improved = store
    .save_rating(v1.id, rated("FP_09", "hotWork", Some("good")), actor)
    .await
    .unwrap();
  assert_eq!(improved.retracted, 1);

  assert!(store.list_recommendations(v1.id, false).await.unwrap().is_empty());
  let all = store.list_recommendations(v1.id, true).await.unwrap();
  assert_eq!(all.len(), 1);
  assert!(!all[0].include_in_report);

  // Regressing back un-retracts the existing row instead of duplicating.
  let regressed = store
    .save_rating(v1.id, rated("FP_09", "hotWork", Some("poor")), actor)
    .await
    .unwrap();
  assert_eq!(regressed.upserted, 1);
  let recs = store.list_recommendations(v1.id, false).await.unwrap();
  assert_eq!(recs.len(), 1);
  assert_eq!(store.list_recommendations(v1.id, true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn several_templates_fire_for_one_rating() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  seed_trigger(&store, Uuid::new_v4()).await;
  seed_trigger(&store, Uuid::new_v4()).await;

  let out = store
    .save_rating(v1.id, rated("FP_09", "hotWork", Some("poor")), actor)
    .await
    .unwrap();
  assert_eq!(out.matched, 2);
  assert_eq!(out.upserted, 2);
  assert_eq!(store.list_recommendations(v1.id, false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn trigger_administration() {
  let store = store().await;
  let template = Uuid::new_v4();
  seed_trigger(&store, template).await;

  // Identical tuple is rejected.
  let err = store
    .add_trigger(NewTrigger {
      section_key:  "FP_09".into(),
      field_key:    "hotWork".into(),
      rating_value: "poor".into(),
      template_id:  template,
      priority:     0,
    })
    .await
    .unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::Storage(_)));

  let triggers = store.list_triggers(true).await.unwrap();
  assert_eq!(triggers.len(), 1);

  let off = store.set_trigger_active(triggers[0].id, false).await.unwrap();
  assert!(!off.is_active);
  assert!(store.list_triggers(true).await.unwrap().is_empty());
  assert_eq!(store.list_triggers(false).await.unwrap().len(), 1);

  let err = store.set_trigger_active(Uuid::new_v4(), true).await.unwrap_err();
  assert_core(err, |e| matches!(e, CoreError::TriggerNotFound(_)));
}

#[tokio::test]
async fn inactive_triggers_do_not_fire() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  seed_trigger(&store, Uuid::new_v4()).await;
  let triggers = store.list_triggers(true).await.unwrap();
  store.set_trigger_active(triggers[0].id, false).await.unwrap();

  let out = store
    .save_rating(v1.id, rated("FP_09", "hotWork", Some("poor")), actor)
    .await
    .unwrap();
  assert_eq!(out.matched, 0);
  assert!(store.list_recommendations(v1.id, false).await.unwrap().is_empty());
}

// ─── Change summaries ────────────────────────────────────────────────────────

#[tokio::test]
async fn reissue_after_remediation_produces_the_expected_summary() {
  let store = store().await;
  let actor = Actor::editor(Uuid::new_v4());

  // First survey: three open actions, issued.
  let v1 = store.create_draft(new_draft(None), actor).await.unwrap();
  store.add_action(NewAction::new(v1.id, "sprinkler coverage"), actor).await.unwrap();
  store.add_action(NewAction::new(v1.id, "hot work permits"), actor).await.unwrap();
  store.add_action(NewAction::new(v1.id, "alarm maintenance"), actor).await.unwrap();
  store.commit_issue(v1.id, actor, artifact()).await.unwrap();

  // Follow-up: one carried action closed, one brand-new action raised.
  let v2 = store.create_new_version_from(v1.id, actor).await.unwrap();
  let carried = store.list_actions(v2.id, false).await.unwrap();
  assert_eq!(carried.len(), 3);
  store
    .close_action(carried[0].id, actor, Some("verified on revisit".into()))
    .await
    .unwrap();
  store.add_action(NewAction::new(v2.id, "storage housekeeping"), actor).await.unwrap();

  let out = store.commit_issue(v2.id, actor, artifact()).await.unwrap();
  assert_eq!(out.superseded, Some(v1.id));

  let summary = out.summary.expect("summary against the superseded version");
  assert_eq!(summary.previous_version_id, v1.id);
  assert_eq!(summary.new_actions_count, 1);
  assert_eq!(summary.closed_actions_count, 1);
  assert_eq!(summary.outstanding_count, 2);

  // Retrievable after the fact.
  let fetched = store.change_summary(v2.id).await.unwrap().unwrap();
  assert_eq!(fetched.new_actions_count, 1);
  assert_eq!(fetched.closed_actions_count, 1);
  assert_eq!(fetched.outstanding_count, 2);

  // First issuance has nothing to diff against.
  assert!(store.change_summary(v1.id).await.unwrap().is_none());
}
