//! Remedial actions — the action ledger's unit of record.
//!
//! Actions belong to exactly one version. Unresolved actions are carried
//! forward into the next draft as new rows linked by `origin_action_id`;
//! the lineage is walked via repeated id lookups, never object pointers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
  Open,
  InProgress,
  Closed,
  Deferred,
  NotApplicable,
  Superseded,
}

impl ActionStatus {
  /// Unresolved statuses are eligible for carry-forward into the next
  /// version.
  pub fn is_unresolved(self) -> bool {
    matches!(self, Self::Open | Self::InProgress | Self::Deferred)
  }

  /// Terminal statuses are excluded from the outstanding count.
  pub fn is_terminal(self) -> bool { !self.is_unresolved() }
}

// ─── Action ──────────────────────────────────────────────────────────────────

/// A remedial item tied to one document version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
  pub id:                Uuid,
  pub version_id:        Uuid,
  /// The first version this action (or any ancestor) appeared in; stable
  /// across the whole lineage.
  pub source_version_id: Uuid,
  /// The action this one was carried forward from, if any.
  pub origin_action_id:  Option<Uuid>,
  /// Permanent, e.g. `R-07`; sequential within the chain, never reused, and
  /// identical across all carried-forward descendants.
  pub reference_number:  String,

  pub title:             String,
  pub description:       Option<String>,
  pub status:            ActionStatus,

  pub created_at:        DateTime<Utc>,
  pub created_by:        Uuid,
  pub closed_at:         Option<DateTime<Utc>>,
  pub closed_by:         Option<Uuid>,
  pub closure_note:      Option<String>,
  pub reopened_at:       Option<DateTime<Utc>>,
  pub reopened_by:       Option<Uuid>,
  pub reopen_note:       Option<String>,

  // Soft delete; deleted actions are excluded from active views but
  // retained for audit.
  pub deleted_at:        Option<DateTime<Utc>>,
  pub deleted_by:        Option<Uuid>,
}

impl Action {
  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }
}

// ─── NewAction ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::DocumentStore::add_action`].
/// The reference number is allocated by the store, never by callers.
#[derive(Debug, Clone)]
pub struct NewAction {
  pub version_id:  Uuid,
  pub title:       String,
  pub description: Option<String>,
}

impl NewAction {
  pub fn new(version_id: Uuid, title: impl Into<String>) -> Self {
    Self { version_id, title: title.into(), description: None }
  }
}
