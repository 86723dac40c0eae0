//! Graded survey-field answers.
//!
//! An answer records the value and rating given to one field of one section
//! on a draft version. Saving a rated answer is what drives the
//! recommendation rule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted answer; unique per `(version, section, field)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
  pub version_id:  Uuid,
  pub section_key: String,
  pub field_key:   String,
  /// Free-form answer payload.
  pub value:       serde_json::Value,
  /// Normalised (lower-case) grade, e.g. `"poor"`; `None` for ungraded
  /// fields.
  pub rating:      Option<String>,
  pub updated_at:  DateTime<Utc>,
  pub updated_by:  Uuid,
}

/// Input to [`crate::store::DocumentStore::save_rating`].
#[derive(Debug, Clone, Deserialize)]
pub struct RatedAnswer {
  pub section_key: String,
  pub field_key:   String,
  pub value:       serde_json::Value,
  pub rating:      Option<String>,
}
