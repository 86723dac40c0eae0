//! Issue precondition validation.
//!
//! Every failing precondition is reported, not just the first, so a caller
//! can surface the complete list to the editor in one round trip. Nothing
//! here mutates state; the store re-checks the race-sensitive conditions
//! inside the issuance transaction.

use serde::Serialize;

use crate::{
  actor::Actor,
  version::{DocumentVersion, IssueState},
};

/// One reason an issuance request is not currently valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IssuePrecondition {
  /// Only drafts can be issued.
  NotDraft { state: IssueState },
  /// The actor lacks edit/issue permission.
  MissingPermission,
  /// No populated answer set exists on the version.
  NoPopulatedAnswers,
  /// The owning organisation requires approval and none is recorded.
  ApprovalOutstanding,
  /// A locked artifact is already present — guards double-issue races.
  ArtifactAlreadyPresent,
}

impl std::fmt::Display for IssuePrecondition {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NotDraft { state } => write!(f, "version is not a draft ({state:?})"),
      Self::MissingPermission => write!(f, "actor lacks issue permission"),
      Self::NoPopulatedAnswers => write!(f, "no populated answer set"),
      Self::ApprovalOutstanding => write!(f, "approval is outstanding"),
      Self::ArtifactAlreadyPresent => write!(f, "locked artifact already present"),
    }
  }
}

/// Validate all issue preconditions; `Err` carries every failure.
pub fn validate_issue(
  version:      &DocumentVersion,
  answer_count: usize,
  actor:        Actor,
) -> Result<(), Vec<IssuePrecondition>> {
  let mut failed = Vec::new();

  if version.issue_state != IssueState::Draft {
    failed.push(IssuePrecondition::NotDraft { state: version.issue_state });
  }
  if !actor.can_edit {
    failed.push(IssuePrecondition::MissingPermission);
  }
  if answer_count == 0 {
    failed.push(IssuePrecondition::NoPopulatedAnswers);
  }
  if version.requires_approval && version.approved_at.is_none() {
    failed.push(IssuePrecondition::ApprovalOutstanding);
  }
  if version.artifact.is_some() {
    failed.push(IssuePrecondition::ArtifactAlreadyPresent);
  }

  if failed.is_empty() { Ok(()) } else { Err(failed) }
}
