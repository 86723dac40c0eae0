//! Change summaries — the structured delta between two adjacent versions'
//! action sets.
//!
//! Generated exactly once, inside the issuance transaction, when a previous
//! issued version exists. Summary rows are immutable; regeneration appends
//! a new row and readers take the most recent.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;

// ─── Delta ───────────────────────────────────────────────────────────────────

/// One line of the delta payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaEntry {
  pub action_id:        Uuid,
  pub reference_number: String,
  pub title:            String,
}

/// The structured diff between two versions' action sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDelta {
  /// Actions in the new version with no counterpart in the old one.
  pub new_actions:     Vec<DeltaEntry>,
  /// Unresolved old actions with no still-unresolved carried copy.
  pub closed_actions:  Vec<DeltaEntry>,
  /// Carried-forward actions that are still unresolved in the new version.
  /// Newly raised actions are reported under `new_actions` only.
  pub outstanding:     Vec<DeltaEntry>,
}

// ─── ChangeSummary ───────────────────────────────────────────────────────────

/// Immutable record of one issuance transition. Never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummary {
  pub id:                  Uuid,
  pub new_version_id:      Uuid,
  pub previous_version_id: Uuid,
  pub new_actions_count:   u32,
  pub closed_actions_count: u32,
  pub outstanding_count:   u32,
  pub delta:               ActionDelta,
  pub created_at:          DateTime<Utc>,
}

// ─── Diff ────────────────────────────────────────────────────────────────────

fn entry(a: &Action) -> DeltaEntry {
  DeltaEntry {
    action_id:        a.id,
    reference_number: a.reference_number.clone(),
    title:            a.title.clone(),
  }
}

/// Diff the action sets of two adjacent versions.
///
/// Soft-deleted actions are invisible to the diff. "New" means the action's
/// `origin_action_id` is absent or does not resolve to an action in the old
/// version; "closed" means an unresolved old action has no carried copy that
/// is still unresolved.
pub fn summarize(old_actions: &[Action], new_actions: &[Action]) -> ActionDelta {
  let old: Vec<&Action> = old_actions.iter().filter(|a| !a.is_deleted()).collect();
  let new: Vec<&Action> = new_actions.iter().filter(|a| !a.is_deleted()).collect();

  let old_ids: HashSet<Uuid> = old.iter().map(|a| a.id).collect();

  // Old action id → still unresolved in the new version?
  let mut carried_unresolved: HashSet<Uuid> = HashSet::new();
  for a in &new {
    if let Some(origin) = a.origin_action_id
      && a.status.is_unresolved()
    {
      carried_unresolved.insert(origin);
    }
  }

  let new_entries: Vec<DeltaEntry> = new
    .iter()
    .filter(|a| {
      a.origin_action_id
        .map(|origin| !old_ids.contains(&origin))
        .unwrap_or(true)
    })
    .map(|a| entry(a))
    .collect();

  let closed_entries: Vec<DeltaEntry> = old
    .iter()
    .filter(|a| a.status.is_unresolved() && !carried_unresolved.contains(&a.id))
    .map(|a| entry(a))
    .collect();

  let outstanding: Vec<DeltaEntry> = new
    .iter()
    .filter(|a| {
      a.status.is_unresolved()
        && a
          .origin_action_id
          .map(|origin| old_ids.contains(&origin))
          .unwrap_or(false)
    })
    .map(|a| entry(a))
    .collect();

  ActionDelta {
    new_actions:    new_entries,
    closed_actions: closed_entries,
    outstanding,
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::action::ActionStatus;

  fn action(
    version_id: Uuid,
    reference:  &str,
    status:     ActionStatus,
    origin:     Option<Uuid>,
  ) -> Action {
    Action {
      id:                Uuid::new_v4(),
      version_id,
      source_version_id: version_id,
      origin_action_id:  origin,
      reference_number:  reference.into(),
      title:             format!("action {reference}"),
      description:       None,
      status,
      created_at:        Utc::now(),
      created_by:        Uuid::new_v4(),
      closed_at:         None,
      closed_by:         None,
      closure_note:      None,
      reopened_at:       None,
      reopened_by:       None,
      reopen_note:       None,
      deleted_at:        None,
      deleted_by:        None,
    }
  }

  #[test]
  fn issuance_scenario_counts() {
    // v1 issued with three open actions; v2 carries all three, closes one,
    // and adds one new. Expected: 1 new, 1 closed, 2 outstanding.
    let v1 = Uuid::new_v4();
    let v2 = Uuid::new_v4();

    let a = action(v1, "R-01", ActionStatus::Open, None);
    let b = action(v1, "R-02", ActionStatus::Open, None);
    let c = action(v1, "R-03", ActionStatus::Open, None);

    let a2 = action(v2, "R-01", ActionStatus::Open, Some(a.id));
    let mut b2 = action(v2, "R-02", ActionStatus::Closed, Some(b.id));
    b2.closed_at = Some(Utc::now());
    let c2 = action(v2, "R-03", ActionStatus::Open, Some(c.id));
    let d = action(v2, "R-04", ActionStatus::Open, None);

    let delta = summarize(&[a, b, c], &[a2, b2, c2, d.clone()]);

    assert_eq!(delta.new_actions.len(), 1);
    assert_eq!(delta.new_actions[0].action_id, d.id);
    assert_eq!(delta.closed_actions.len(), 1);
    assert_eq!(delta.closed_actions[0].reference_number, "R-02");
    assert_eq!(delta.outstanding.len(), 2);
  }

  #[test]
  fn terminal_old_actions_are_not_reported_closed() {
    let v1 = Uuid::new_v4();
    let v2 = Uuid::new_v4();

    // Already closed at v1; not carried, but also not newly closed.
    let closed = action(v1, "R-01", ActionStatus::Closed, None);
    let na = action(v1, "R-02", ActionStatus::NotApplicable, None);

    let delta = summarize(&[closed, na], &[]);
    assert!(delta.closed_actions.is_empty());
  }

  #[test]
  fn dropped_unresolved_action_counts_as_closed() {
    // An open v1 action with no copy in v2 at all.
    let v1 = Uuid::new_v4();
    let open = action(v1, "R-01", ActionStatus::Open, None);

    let delta = summarize(&[open], &[]);
    assert_eq!(delta.closed_actions.len(), 1);
  }

  #[test]
  fn unresolved_origin_outside_old_set_is_new() {
    // origin_action_id pointing at an action not in the old version (e.g.
    // two versions back) makes the action "new" relative to this diff.
    let v1 = Uuid::new_v4();
    let v2 = Uuid::new_v4();

    let old = action(v1, "R-01", ActionStatus::Open, None);
    let stranger = action(v2, "R-09", ActionStatus::Open, Some(Uuid::new_v4()));
    let carried = action(v2, "R-01", ActionStatus::Open, Some(old.id));

    let delta = summarize(&[old], &[stranger.clone(), carried]);
    assert_eq!(delta.new_actions.len(), 1);
    assert_eq!(delta.new_actions[0].action_id, stranger.id);
  }

  #[test]
  fn soft_deleted_actions_are_invisible() {
    let v1 = Uuid::new_v4();
    let v2 = Uuid::new_v4();

    let mut ghost = action(v2, "R-05", ActionStatus::Open, None);
    ghost.deleted_at = Some(Utc::now());
    ghost.deleted_by = Some(Uuid::new_v4());

    let old = action(v1, "R-01", ActionStatus::Open, None);
    let carried = action(v2, "R-01", ActionStatus::Open, Some(old.id));

    let delta = summarize(&[old], &[carried, ghost]);
    assert!(delta.new_actions.is_empty());
    assert_eq!(delta.outstanding.len(), 1);
  }

  #[test]
  fn deferred_carried_copy_keeps_old_action_out_of_closed() {
    let v1 = Uuid::new_v4();
    let v2 = Uuid::new_v4();

    let old = action(v1, "R-01", ActionStatus::Deferred, None);
    let carried = action(v2, "R-01", ActionStatus::Deferred, Some(old.id));

    let delta = summarize(&[old], &[carried]);
    assert!(delta.closed_actions.is_empty());
    assert_eq!(delta.outstanding.len(), 1);
  }
}
