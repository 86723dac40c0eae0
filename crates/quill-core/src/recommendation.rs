//! The recommendation rule engine.
//!
//! Rating saves are matched against a trigger table and materialised as
//! recommendation instances. The matching itself is a pure function over
//! `(old rating, new rating, triggers)` so it can be unit-tested without a
//! datastore; the store applies the resulting plan in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ─── Trigger ─────────────────────────────────────────────────────────────────

/// A rule: `(section, field, rating) → template`, with priority ordering.
/// The tuple `(section_key, field_key, rating_value, template_id)` is unique;
/// several templates may fire for the same rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationTrigger {
  pub id:           Uuid,
  pub section_key:  String,
  pub field_key:    String,
  /// Stored lower-cased; matching is case-insensitive.
  pub rating_value: String,
  pub template_id:  Uuid,
  pub priority:     i32,
  pub is_active:    bool,
}

impl RecommendationTrigger {
  pub fn matches(&self, section_key: &str, field_key: &str, rating: &str) -> bool {
    self.is_active
      && self.section_key == section_key
      && self.field_key == field_key
      && self.rating_value == normalize_rating(rating)
  }
}

/// Input to [`crate::store::DocumentStore::add_trigger`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrigger {
  pub section_key:  String,
  pub field_key:    String,
  pub rating_value: String,
  pub template_id:  Uuid,
  pub priority:     i32,
}

// ─── Instance ────────────────────────────────────────────────────────────────

/// A materialised recommendation attached to a document version.
///
/// `trigger_key` is the idempotency key: re-saving the same rating upserts
/// against it instead of duplicating. When a rating later improves, matching
/// instances are soft-retracted (`include_in_report = false`), never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationInstance {
  pub id:                Uuid,
  pub version_id:        Uuid,
  pub section_key:       String,
  pub field_key:         String,
  pub rating_value:      String,
  pub template_id:       Uuid,
  pub trigger_key:       String,
  pub include_in_report: bool,
  pub created_at:        DateTime<Utc>,
}

// ─── Trigger key ─────────────────────────────────────────────────────────────

/// Lower-case a rating for storage and matching.
pub fn normalize_rating(rating: &str) -> String { rating.trim().to_lowercase() }

/// Deterministic idempotency key for auto-generated recommendations:
/// SHA-256 over `(version_id, section_key, field_key, normalised rating)`.
pub fn trigger_key(
  version_id:  Uuid,
  section_key: &str,
  field_key:   &str,
  rating:      &str,
) -> String {
  let mut hasher = Sha256::new();
  hasher.update(version_id.as_bytes());
  hasher.update([0]);
  hasher.update(section_key.as_bytes());
  hasher.update([0]);
  hasher.update(field_key.as_bytes());
  hasher.update([0]);
  hasher.update(normalize_rating(rating).as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Planner ─────────────────────────────────────────────────────────────────

/// An instance the store should upsert (insert if absent, un-retract if
/// previously retracted, otherwise no-op).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInstance {
  pub section_key:  String,
  pub field_key:    String,
  pub rating_value: String,
  pub template_id:  Uuid,
  pub trigger_key:  String,
}

/// The store operations implied by one rating save.
#[derive(Debug, Clone, Default)]
pub struct RecommendationPlan {
  pub upserts:      Vec<PlannedInstance>,
  /// Trigger keys whose instances should be soft-retracted.
  pub retract_keys: Vec<String>,
  /// How many active triggers matched the new rating (diagnostic only).
  pub matched:      usize,
}

/// Compute the plan for saving a rated field on a draft version.
///
/// A rating that matches zero triggers is not an error — the plan is simply
/// empty. Saving an identical rating twice yields the same upserts, which
/// the store's unique key turns into no-ops.
pub fn plan(
  version_id:  Uuid,
  section_key: &str,
  field_key:   &str,
  old_rating:  Option<&str>,
  new_rating:  Option<&str>,
  triggers:    &[RecommendationTrigger],
) -> RecommendationPlan {
  let mut out = RecommendationPlan::default();

  if let Some(new) = new_rating {
    let normalized = normalize_rating(new);
    let key = trigger_key(version_id, section_key, field_key, &normalized);
    for t in triggers {
      if t.matches(section_key, field_key, &normalized) {
        out.upserts.push(PlannedInstance {
          section_key:  section_key.to_owned(),
          field_key:    field_key.to_owned(),
          rating_value: normalized.clone(),
          template_id:  t.template_id,
          trigger_key:  key.clone(),
        });
      }
    }
    out.matched = out.upserts.len();
  }

  // Retract instances keyed by the previous rating when it changed. The new
  // rating's own key is upserted above, so a Poor → Good → Poor cycle
  // un-retracts rather than duplicates.
  if let Some(old) = old_rating {
    let old_norm = normalize_rating(old);
    let changed = new_rating
      .map(|n| normalize_rating(n) != old_norm)
      .unwrap_or(true);
    if changed {
      out
        .retract_keys
        .push(trigger_key(version_id, section_key, field_key, &old_norm));
    }
  }

  out
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What a rating save actually did, after the plan was applied.
#[derive(Debug, Clone, Serialize)]
pub struct RatingOutcome {
  pub answer:    crate::answer::Answer,
  /// Active triggers that matched the new rating.
  pub matched:   usize,
  /// Instances newly inserted or un-retracted.
  pub upserted:  usize,
  /// Instances soft-retracted because the old rating no longer applies.
  pub retracted: usize,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
