//! Document versions — the unit of the version chain.
//!
//! A chain is the set of all versions of one logical assessment document.
//! Within a chain at most one version is a draft and at most one is issued;
//! issued and superseded versions are immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Issue state ─────────────────────────────────────────────────────────────

/// Where a version sits in its chain's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
  Draft,
  Issued,
  Superseded,
}

impl IssueState {
  /// Issued and superseded versions are frozen; only supersession-linking
  /// fields may still change.
  pub fn is_immutable(self) -> bool {
    matches!(self, Self::Issued | Self::Superseded)
  }
}

// ─── Locked artifact ─────────────────────────────────────────────────────────

/// The immutable export captured at issuance: a blob pointer plus the
/// metadata needed to prove the served file has not been altered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedArtifact {
  /// Opaque blob-store pointer.
  pub blob_ref:     String,
  /// SHA-256 hex digest of the rendered bytes.
  pub checksum:     String,
  pub size_bytes:   u64,
  pub generated_at: DateTime<Utc>,
}

// ─── DocumentVersion ─────────────────────────────────────────────────────────

/// One physical version of an assessment document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
  pub id:             Uuid,
  /// Stable across all versions of the same logical document. For the first
  /// version of a fresh chain this equals `id`.
  pub chain_id:       Uuid,
  /// Positive, strictly increasing within the chain; assigned at creation.
  pub version_number: u32,
  pub issue_state:    IssueState,
  /// Set exactly once, when a later version's issuance supersedes this one.
  pub superseded_by:  Option<Uuid>,

  // Descriptive fields, write-once after issuance.
  pub title:          String,
  pub document_type:  String,
  pub scope:          Option<String>,

  pub created_at:     DateTime<Utc>,
  pub created_by:     Uuid,
  pub issued_at:      Option<DateTime<Utc>>,
  pub issued_by:      Option<Uuid>,

  // Optional internal approval, distinct from issuance.
  pub requires_approval: bool,
  pub approved_at:       Option<DateTime<Utc>>,
  pub approved_by:       Option<Uuid>,

  /// Present only once issued.
  pub artifact:       Option<LockedArtifact>,
  /// Last renderer/storage failure during an aborted issuance; cleared on
  /// the next successful issue.
  pub issue_error:    Option<String>,
}

impl DocumentVersion {
  pub fn is_immutable(&self) -> bool { self.issue_state.is_immutable() }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::DocumentStore::create_draft`].
///
/// When `chain_id` is `None` a new chain is minted whose id equals the new
/// version's id.
#[derive(Debug, Clone)]
pub struct NewDraft {
  pub chain_id:          Option<Uuid>,
  pub title:             String,
  pub document_type:     String,
  pub scope:             Option<String>,
  pub requires_approval: bool,
}

/// Partial update of a draft's descriptive fields.
///
/// `scope` distinguishes an absent field (`None`, leave unchanged) from an
/// explicit `null` (`Some(None)`, clear the field).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftPatch {
  pub title:         Option<String>,
  pub document_type: Option<String>,
  #[serde(default, deserialize_with = "present_or_null")]
  pub scope:         Option<Option<String>>,
}

/// Maps a field that is present in the payload, possibly as `null`, to
/// `Some(..)`; serde's `default` supplies the outer `None` when absent.
fn present_or_null<'de, D>(
  de: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Option::<String>::deserialize(de).map(Some)
}

impl DraftPatch {
  pub fn is_empty(&self) -> bool {
    self.title.is_none() && self.document_type.is_none() && self.scope.is_none()
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// The result of a successful issuance transaction.
#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
  pub version:    DocumentVersion,
  /// The previously issued version demoted in the same transaction, if any.
  pub superseded: Option<Uuid>,
  /// Generated iff a previous issued version existed.
  pub summary:    Option<crate::summary::ChangeSummary>,
}
