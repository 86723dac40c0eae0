//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings, UUIDs as hyphenated
//! lowercase strings, structured payloads (answer values, summary deltas) as
//! compact JSON.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use quill_core::{
  action::{Action, ActionStatus},
  answer::Answer,
  recommendation::{RecommendationInstance, RecommendationTrigger},
  summary::{ActionDelta, ChangeSummary},
  version::{DocumentVersion, IssueState, LockedArtifact},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_uuid_opt(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_dt_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── IssueState ──────────────────────────────────────────────────────────────

pub fn encode_issue_state(s: IssueState) -> &'static str {
  match s {
    IssueState::Draft => "draft",
    IssueState::Issued => "issued",
    IssueState::Superseded => "superseded",
  }
}

pub fn decode_issue_state(s: &str) -> Result<IssueState> {
  match s {
    "draft" => Ok(IssueState::Draft),
    "issued" => Ok(IssueState::Issued),
    "superseded" => Ok(IssueState::Superseded),
    other => Err(Error::Decode(format!("unknown issue state: {other:?}"))),
  }
}

// ─── ActionStatus ────────────────────────────────────────────────────────────

pub fn encode_action_status(s: ActionStatus) -> &'static str {
  match s {
    ActionStatus::Open => "open",
    ActionStatus::InProgress => "in_progress",
    ActionStatus::Closed => "closed",
    ActionStatus::Deferred => "deferred",
    ActionStatus::NotApplicable => "not_applicable",
    ActionStatus::Superseded => "superseded",
  }
}

pub fn decode_action_status(s: &str) -> Result<ActionStatus> {
  match s {
    "open" => Ok(ActionStatus::Open),
    "in_progress" => Ok(ActionStatus::InProgress),
    "closed" => Ok(ActionStatus::Closed),
    "deferred" => Ok(ActionStatus::Deferred),
    "not_applicable" => Ok(ActionStatus::NotApplicable),
    "superseded" => Ok(ActionStatus::Superseded),
    other => Err(Error::Decode(format!("unknown action status: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `document_versions` row.
pub struct RawVersion {
  pub id:                    String,
  pub chain_id:              String,
  pub version_number:        i64,
  pub issue_state:           String,
  pub superseded_by:         Option<String>,
  pub title:                 String,
  pub document_type:         String,
  pub scope:                 Option<String>,
  pub created_at:            String,
  pub created_by:            String,
  pub issued_at:             Option<String>,
  pub issued_by:             Option<String>,
  pub requires_approval:     bool,
  pub approved_at:           Option<String>,
  pub approved_by:           Option<String>,
  pub artifact_ref:          Option<String>,
  pub artifact_checksum:     Option<String>,
  pub artifact_size:         Option<i64>,
  pub artifact_generated_at: Option<String>,
  pub issue_error:           Option<String>,
}

/// `SELECT` column list matching [`RawVersion::from_row`].
pub const VERSION_COLUMNS: &str = "id, chain_id, version_number, issue_state, \
   superseded_by, title, document_type, scope, created_at, created_by, \
   issued_at, issued_by, requires_approval, approved_at, approved_by, \
   artifact_ref, artifact_checksum, artifact_size, artifact_generated_at, \
   issue_error";

impl RawVersion {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                    row.get(0)?,
      chain_id:              row.get(1)?,
      version_number:        row.get(2)?,
      issue_state:           row.get(3)?,
      superseded_by:         row.get(4)?,
      title:                 row.get(5)?,
      document_type:         row.get(6)?,
      scope:                 row.get(7)?,
      created_at:            row.get(8)?,
      created_by:            row.get(9)?,
      issued_at:             row.get(10)?,
      issued_by:             row.get(11)?,
      requires_approval:     row.get(12)?,
      approved_at:           row.get(13)?,
      approved_by:           row.get(14)?,
      artifact_ref:          row.get(15)?,
      artifact_checksum:     row.get(16)?,
      artifact_size:         row.get(17)?,
      artifact_generated_at: row.get(18)?,
      issue_error:           row.get(19)?,
    })
  }

  pub fn into_version(self) -> Result<DocumentVersion> {
    let artifact = match (self.artifact_ref, self.artifact_checksum) {
      (Some(blob_ref), Some(checksum)) => Some(LockedArtifact {
        blob_ref,
        checksum,
        size_bytes:   self.artifact_size.unwrap_or(0) as u64,
        generated_at: decode_dt(self.artifact_generated_at.as_deref().ok_or_else(
          || Error::Decode("artifact without generated_at".into()),
        )?)?,
      }),
      _ => None,
    };

    Ok(DocumentVersion {
      id:                decode_uuid(&self.id)?,
      chain_id:          decode_uuid(&self.chain_id)?,
      version_number:    self.version_number as u32,
      issue_state:       decode_issue_state(&self.issue_state)?,
      superseded_by:     decode_uuid_opt(self.superseded_by.as_deref())?,
      title:             self.title,
      document_type:     self.document_type,
      scope:             self.scope,
      created_at:        decode_dt(&self.created_at)?,
      created_by:        decode_uuid(&self.created_by)?,
      issued_at:         decode_dt_opt(self.issued_at.as_deref())?,
      issued_by:         decode_uuid_opt(self.issued_by.as_deref())?,
      requires_approval: self.requires_approval,
      approved_at:       decode_dt_opt(self.approved_at.as_deref())?,
      approved_by:       decode_uuid_opt(self.approved_by.as_deref())?,
      artifact,
      issue_error:       self.issue_error,
    })
  }
}

/// Raw strings read directly from an `actions` row.
pub struct RawAction {
  pub id:                String,
  pub version_id:        String,
  pub source_version_id: String,
  pub origin_action_id:  Option<String>,
  pub reference_number:  String,
  pub title:             String,
  pub description:       Option<String>,
  pub status:            String,
  pub created_at:        String,
  pub created_by:        String,
  pub closed_at:         Option<String>,
  pub closed_by:         Option<String>,
  pub closure_note:      Option<String>,
  pub reopened_at:       Option<String>,
  pub reopened_by:       Option<String>,
  pub reopen_note:       Option<String>,
  pub deleted_at:        Option<String>,
  pub deleted_by:        Option<String>,
}

/// `SELECT` column list matching [`RawAction::from_row`].
pub const ACTION_COLUMNS: &str = "id, version_id, source_version_id, \
   origin_action_id, reference_number, title, description, status, \
   created_at, created_by, closed_at, closed_by, closure_note, reopened_at, \
   reopened_by, reopen_note, deleted_at, deleted_by";

impl RawAction {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(0)?,
      version_id:        row.get(1)?,
      source_version_id: row.get(2)?,
      origin_action_id:  row.get(3)?,
      reference_number:  row.get(4)?,
      title:             row.get(5)?,
      description:       row.get(6)?,
      status:            row.get(7)?,
      created_at:        row.get(8)?,
      created_by:        row.get(9)?,
      closed_at:         row.get(10)?,
      closed_by:         row.get(11)?,
      closure_note:      row.get(12)?,
      reopened_at:       row.get(13)?,
      reopened_by:       row.get(14)?,
      reopen_note:       row.get(15)?,
      deleted_at:        row.get(16)?,
      deleted_by:        row.get(17)?,
    })
  }

  pub fn into_action(self) -> Result<Action> {
    Ok(Action {
      id:                decode_uuid(&self.id)?,
      version_id:        decode_uuid(&self.version_id)?,
      source_version_id: decode_uuid(&self.source_version_id)?,
      origin_action_id:  decode_uuid_opt(self.origin_action_id.as_deref())?,
      reference_number:  self.reference_number,
      title:             self.title,
      description:       self.description,
      status:            decode_action_status(&self.status)?,
      created_at:        decode_dt(&self.created_at)?,
      created_by:        decode_uuid(&self.created_by)?,
      closed_at:         decode_dt_opt(self.closed_at.as_deref())?,
      closed_by:         decode_uuid_opt(self.closed_by.as_deref())?,
      closure_note:      self.closure_note,
      reopened_at:       decode_dt_opt(self.reopened_at.as_deref())?,
      reopened_by:       decode_uuid_opt(self.reopened_by.as_deref())?,
      reopen_note:       self.reopen_note,
      deleted_at:        decode_dt_opt(self.deleted_at.as_deref())?,
      deleted_by:        decode_uuid_opt(self.deleted_by.as_deref())?,
    })
  }
}

/// Raw strings read directly from an `answers` row.
pub struct RawAnswer {
  pub version_id:  String,
  pub section_key: String,
  pub field_key:   String,
  pub value_json:  String,
  pub rating:      Option<String>,
  pub updated_at:  String,
  pub updated_by:  String,
}

impl RawAnswer {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:  row.get(0)?,
      section_key: row.get(1)?,
      field_key:   row.get(2)?,
      value_json:  row.get(3)?,
      rating:      row.get(4)?,
      updated_at:  row.get(5)?,
      updated_by:  row.get(6)?,
    })
  }

  pub fn into_answer(self) -> Result<Answer> {
    Ok(Answer {
      version_id:  decode_uuid(&self.version_id)?,
      section_key: self.section_key,
      field_key:   self.field_key,
      value:       serde_json::from_str(&self.value_json)?,
      rating:      self.rating,
      updated_at:  decode_dt(&self.updated_at)?,
      updated_by:  decode_uuid(&self.updated_by)?,
    })
  }
}

/// Raw strings read directly from a `recommendation_triggers` row.
pub struct RawTrigger {
  pub id:           String,
  pub section_key:  String,
  pub field_key:    String,
  pub rating_value: String,
  pub template_id:  String,
  pub priority:     i64,
  pub is_active:    bool,
}

impl RawTrigger {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      section_key:  row.get(1)?,
      field_key:    row.get(2)?,
      rating_value: row.get(3)?,
      template_id:  row.get(4)?,
      priority:     row.get(5)?,
      is_active:    row.get(6)?,
    })
  }

  pub fn into_trigger(self) -> Result<RecommendationTrigger> {
    Ok(RecommendationTrigger {
      id:           decode_uuid(&self.id)?,
      section_key:  self.section_key,
      field_key:    self.field_key,
      rating_value: self.rating_value,
      template_id:  decode_uuid(&self.template_id)?,
      priority:     self.priority as i32,
      is_active:    self.is_active,
    })
  }
}

/// Raw strings read directly from a `recommendation_instances` row.
pub struct RawInstance {
  pub id:                String,
  pub version_id:        String,
  pub section_key:       String,
  pub field_key:         String,
  pub rating_value:      String,
  pub template_id:       String,
  pub trigger_key:       String,
  pub include_in_report: bool,
  pub created_at:        String,
}

impl RawInstance {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(0)?,
      version_id:        row.get(1)?,
      section_key:       row.get(2)?,
      field_key:         row.get(3)?,
      rating_value:      row.get(4)?,
      template_id:       row.get(5)?,
      trigger_key:       row.get(6)?,
      include_in_report: row.get(7)?,
      created_at:        row.get(8)?,
    })
  }

  pub fn into_instance(self) -> Result<RecommendationInstance> {
    Ok(RecommendationInstance {
      id:                decode_uuid(&self.id)?,
      version_id:        decode_uuid(&self.version_id)?,
      section_key:       self.section_key,
      field_key:         self.field_key,
      rating_value:      self.rating_value,
      template_id:       decode_uuid(&self.template_id)?,
      trigger_key:       self.trigger_key,
      include_in_report: self.include_in_report,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `change_summaries` row.
pub struct RawSummary {
  pub id:                   String,
  pub new_version_id:       String,
  pub previous_version_id:  String,
  pub new_actions_count:    i64,
  pub closed_actions_count: i64,
  pub outstanding_count:    i64,
  pub delta_json:           String,
  pub created_at:           String,
}

impl RawSummary {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                   row.get(0)?,
      new_version_id:       row.get(1)?,
      previous_version_id:  row.get(2)?,
      new_actions_count:    row.get(3)?,
      closed_actions_count: row.get(4)?,
      outstanding_count:    row.get(5)?,
      delta_json:           row.get(6)?,
      created_at:           row.get(7)?,
    })
  }

  pub fn into_summary(self) -> Result<ChangeSummary> {
    let delta: ActionDelta = serde_json::from_str(&self.delta_json)?;
    Ok(ChangeSummary {
      id:                   decode_uuid(&self.id)?,
      new_version_id:       decode_uuid(&self.new_version_id)?,
      previous_version_id:  decode_uuid(&self.previous_version_id)?,
      new_actions_count:    self.new_actions_count as u32,
      closed_actions_count: self.closed_actions_count as u32,
      outstanding_count:    self.outstanding_count as u32,
      delta,
      created_at:           decode_dt(&self.created_at)?,
    })
  }
}
