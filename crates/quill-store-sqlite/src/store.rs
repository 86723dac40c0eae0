//! [`SqliteStore`] — the SQLite implementation of [`DocumentStore`].
//!
//! Invariant-bearing operations each run inside one explicit transaction on
//! the dedicated database thread. Domain errors raised mid-transaction are
//! tunnelled through `tokio_rusqlite::Error::Other` and unwrapped on the
//! async side; unique-index violations are mapped to `ChainConflict`.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use quill_core::{
  action::{Action, ActionStatus, NewAction},
  actor::Actor,
  answer::{Answer, RatedAnswer},
  issue::IssuePrecondition,
  recommendation::{
    self, NewTrigger, RatingOutcome, RecommendationInstance,
    RecommendationTrigger,
  },
  store::DocumentStore,
  summary::{self, ChangeSummary},
  version::{
    DocumentVersion, DraftPatch, IssueOutcome, IssueState, LockedArtifact,
    NewDraft,
  },
};

use crate::{
  Error, Result,
  encode::{
    ACTION_COLUMNS, RawAction, RawAnswer, RawInstance, RawSummary, RawTrigger,
    RawVersion, VERSION_COLUMNS, encode_action_status, encode_dt,
    encode_issue_state, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Error plumbing ──────────────────────────────────────────────────────────

/// Raise a domain error from inside a database closure.
fn domain(e: quill_core::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

/// Raise a row-decoding failure from inside a database closure.
fn decode_err(e: Error) -> tokio_rusqlite::Error {
  domain(quill_core::Error::from(e))
}

/// Unwrap domain errors tunnelled through [`tokio_rusqlite::Error::Other`].
fn map_tx_err(e: tokio_rusqlite::Error) -> Error {
  match e {
    tokio_rusqlite::Error::Other(inner) => {
      match inner.downcast::<quill_core::Error>() {
        Ok(core) => Error::Core(*core),
        Err(other) => Error::Database(tokio_rusqlite::Error::Other(other)),
      }
    }
    other => Error::Database(other),
  }
}

/// Did `e` report a unique violation whose message contains `needle`?
///
/// SQLite names the violated columns in the message, not the index, so
/// callers match on the `table.column` form.
fn unique_violation(e: &tokio_rusqlite::Error, needle: &str) -> bool {
  matches!(
    e,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, Some(msg)))
      if f.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains(needle)
  )
}

// ─── Row helpers (run on the database thread) ────────────────────────────────

fn draft_exists(
  conn: &rusqlite::Connection,
  chain_id: &str,
) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS(
       SELECT 1 FROM document_versions
       WHERE chain_id = ?1 AND issue_state = 'draft')",
    rusqlite::params![chain_id],
    |r| r.get(0),
  )
}

fn version_row(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawVersion>> {
  conn
    .query_row(
      &format!("SELECT {VERSION_COLUMNS} FROM document_versions WHERE id = ?1"),
      rusqlite::params![id],
      RawVersion::from_row,
    )
    .optional()
}

fn require_version(
  conn: &rusqlite::Connection,
  id: &str,
  uuid: Uuid,
) -> std::result::Result<RawVersion, tokio_rusqlite::Error> {
  version_row(conn, id)?
    .ok_or_else(|| domain(quill_core::Error::VersionNotFound(uuid)))
}

fn action_row(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawAction>> {
  conn
    .query_row(
      &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"),
      rusqlite::params![id],
      RawAction::from_row,
    )
    .optional()
}

fn action_rows(
  conn: &rusqlite::Connection,
  version_id: &str,
  include_deleted: bool,
) -> rusqlite::Result<Vec<RawAction>> {
  let filter = if include_deleted { "" } else { "AND deleted_at IS NULL" };
  let mut stmt = conn.prepare(&format!(
    "SELECT {ACTION_COLUMNS} FROM actions
     WHERE version_id = ?1 {filter}
     ORDER BY created_at, reference_number"
  ))?;
  let rows = stmt
    .query_map(rusqlite::params![version_id], RawAction::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn decoded_actions(
  conn: &rusqlite::Connection,
  version_id: &str,
) -> std::result::Result<Vec<Action>, tokio_rusqlite::Error> {
  action_rows(conn, version_id, false)?
    .into_iter()
    .map(|raw| raw.into_action().map_err(decode_err))
    .collect()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A quill document store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn require_edit(actor: Actor, what: &str) -> Result<()> {
    if actor.can_edit {
      Ok(())
    } else {
      Err(Error::Core(quill_core::Error::PermissionDenied(format!(
        "{what} requires edit permission"
      ))))
    }
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  // ── Version chain ─────────────────────────────────────────────────────────

  async fn create_draft(
    &self,
    input: NewDraft,
    actor: Actor,
  ) -> Result<DocumentVersion> {
    Self::require_edit(actor, "creating a draft")?;

    let id = Uuid::new_v4();
    let chain_id = input.chain_id.unwrap_or(id);
    let now = Utc::now();

    let id_str = encode_uuid(id);
    let chain_str = encode_uuid(chain_id);
    let now_str = encode_dt(now);
    let actor_str = encode_uuid(actor.actor_id);
    let title = input.title.clone();
    let document_type = input.document_type.clone();
    let scope = input.scope.clone();
    let requires_approval = input.requires_approval;

    let number = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // Detected explicitly so the caller gets a chain conflict rather
        // than a raw constraint message; the one_draft_per_chain index
        // remains the backstop against a concurrent insert.
        if draft_exists(&tx, &chain_str)? {
          return Err(domain(quill_core::Error::ChainConflict {
            chain_id,
            reason: "a draft already exists in this chain".into(),
          }));
        }
        let number: i64 = tx.query_row(
          "SELECT COALESCE(MAX(version_number), 0) + 1
           FROM document_versions WHERE chain_id = ?1",
          rusqlite::params![chain_str],
          |r| r.get(0),
        )?;
        tx.execute(
          "INSERT INTO document_versions (
             id, chain_id, version_number, issue_state, title, document_type,
             scope, created_at, created_by, requires_approval
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            chain_str,
            number,
            encode_issue_state(IssueState::Draft),
            title,
            document_type,
            scope,
            now_str,
            actor_str,
            requires_approval,
          ],
        )?;
        tx.commit()?;
        Ok(number)
      })
      .await
      .map_err(|e| {
        if unique_violation(&e, "document_versions.chain_id") {
          Error::Core(quill_core::Error::ChainConflict {
            chain_id,
            reason: "a draft already exists in this chain".into(),
          })
        } else {
          map_tx_err(e)
        }
      })?;

    Ok(DocumentVersion {
      id,
      chain_id,
      version_number: number as u32,
      issue_state: IssueState::Draft,
      superseded_by: None,
      title: input.title,
      document_type: input.document_type,
      scope: input.scope,
      created_at: now,
      created_by: actor.actor_id,
      issued_at: None,
      issued_by: None,
      requires_approval,
      approved_at: None,
      approved_by: None,
      artifact: None,
      issue_error: None,
    })
  }

  async fn get_version(&self, id: Uuid) -> Result<Option<DocumentVersion>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(version_row(conn, &id_str)?))
      .await?;
    raw.map(RawVersion::into_version).transpose()
  }

  async fn list_chain(&self, chain_id: Uuid) -> Result<Vec<DocumentVersion>> {
    let chain_str = encode_uuid(chain_id);
    let raws: Vec<RawVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VERSION_COLUMNS} FROM document_versions
           WHERE chain_id = ?1 ORDER BY version_number"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![chain_str], RawVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawVersion::into_version).collect()
  }

  async fn update_draft(
    &self,
    id: Uuid,
    patch: DraftPatch,
    actor: Actor,
  ) -> Result<DocumentVersion> {
    Self::require_edit(actor, "updating a draft")?;

    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = require_version(&tx, &id_str, id)?;
        if current.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(id)));
        }

        if let Some(title) = &patch.title {
          tx.execute(
            "UPDATE document_versions SET title = ?1 WHERE id = ?2",
            rusqlite::params![title, id_str],
          )?;
        }
        if let Some(document_type) = &patch.document_type {
          tx.execute(
            "UPDATE document_versions SET document_type = ?1 WHERE id = ?2",
            rusqlite::params![document_type, id_str],
          )?;
        }
        if let Some(scope) = &patch.scope {
          tx.execute(
            "UPDATE document_versions SET scope = ?1 WHERE id = ?2",
            rusqlite::params![scope, id_str],
          )?;
        }

        let updated = require_version(&tx, &id_str, id)?;
        tx.commit()?;
        Ok(updated)
      })
      .await
      .map_err(map_tx_err)?;
    raw.into_version()
  }

  async fn record_approval(&self, id: Uuid, actor: Actor) -> Result<DocumentVersion> {
    Self::require_edit(actor, "recording approval")?;

    let id_str = encode_uuid(id);
    let actor_str = encode_uuid(actor.actor_id);
    let now_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = require_version(&tx, &id_str, id)?;
        if current.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(id)));
        }
        tx.execute(
          "UPDATE document_versions SET approved_at = ?1, approved_by = ?2
           WHERE id = ?3",
          rusqlite::params![now_str, actor_str, id_str],
        )?;
        let updated = require_version(&tx, &id_str, id)?;
        tx.commit()?;
        Ok(updated)
      })
      .await
      .map_err(map_tx_err)?;
    raw.into_version()
  }

  async fn commit_issue(
    &self,
    id: Uuid,
    actor: Actor,
    artifact: LockedArtifact,
  ) -> Result<IssueOutcome> {
    Self::require_edit(actor, "issuing")?;

    let id_str = encode_uuid(id);
    let actor_str = encode_uuid(actor.actor_id);
    let now = Utc::now();
    let now_str = encode_dt(now);

    let (raw_version, superseded, summary) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = require_version(&tx, &id_str, id)?;

        // Re-check the race-sensitive preconditions inside the transaction;
        // the coordinator validated against a possibly stale read.
        let mut failed = Vec::new();
        if current.issue_state != "draft" {
          let state = crate::encode::decode_issue_state(&current.issue_state)
            .map_err(decode_err)?;
          failed.push(IssuePrecondition::NotDraft { state });
        }
        if current.artifact_ref.is_some() {
          failed.push(IssuePrecondition::ArtifactAlreadyPresent);
        }
        if !failed.is_empty() {
          return Err(domain(quill_core::Error::IssueValidation(failed)));
        }

        // Demote the previously issued version first so the one-issued
        // partial index never trips mid-transaction.
        let prior: Option<String> = tx
          .query_row(
            "SELECT id FROM document_versions
             WHERE chain_id = ?1 AND issue_state = 'issued' AND id != ?2",
            rusqlite::params![current.chain_id, id_str],
            |r| r.get(0),
          )
          .optional()?;

        if let Some(prior_id) = &prior {
          tx.execute(
            "UPDATE document_versions
             SET issue_state = ?1, superseded_by = ?2
             WHERE id = ?3",
            rusqlite::params![
              encode_issue_state(IssueState::Superseded),
              id_str,
              prior_id
            ],
          )?;
        }

        tx.execute(
          "UPDATE document_versions
           SET issue_state = ?1, issued_at = ?2, issued_by = ?3,
               artifact_ref = ?4, artifact_checksum = ?5, artifact_size = ?6,
               artifact_generated_at = ?7, issue_error = NULL
           WHERE id = ?8",
          rusqlite::params![
            encode_issue_state(IssueState::Issued),
            now_str,
            actor_str,
            artifact.blob_ref,
            artifact.checksum,
            artifact.size_bytes as i64,
            encode_dt(artifact.generated_at),
            id_str,
          ],
        )?;

        // Diff the action sets against the superseded version, in the same
        // transaction as the issue itself.
        let summary = if let Some(prior_id) = &prior {
          let old_actions = decoded_actions(&tx, prior_id)?;
          let new_actions = decoded_actions(&tx, &id_str)?;
          let delta = summary::summarize(&old_actions, &new_actions);

          let summary = ChangeSummary {
            id:                   Uuid::new_v4(),
            new_version_id:       id,
            previous_version_id:  crate::encode::decode_uuid(prior_id)
              .map_err(decode_err)?,
            new_actions_count:    delta.new_actions.len() as u32,
            closed_actions_count: delta.closed_actions.len() as u32,
            outstanding_count:    delta.outstanding.len() as u32,
            delta,
            created_at:           now,
          };

          let delta_json = serde_json::to_string(&summary.delta)
            .map_err(|e| decode_err(Error::Json(e)))?;
          tx.execute(
            "INSERT INTO change_summaries (
               id, new_version_id, previous_version_id, new_actions_count,
               closed_actions_count, outstanding_count, delta_json, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
              encode_uuid(summary.id),
              id_str,
              prior_id,
              summary.new_actions_count as i64,
              summary.closed_actions_count as i64,
              summary.outstanding_count as i64,
              delta_json,
              now_str,
            ],
          )?;
          Some(summary)
        } else {
          None
        };

        let updated = require_version(&tx, &id_str, id)?;
        tx.commit()?;
        Ok((updated, prior, summary))
      })
      .await
      .map_err(map_tx_err)?;

    let superseded = superseded.as_deref().map(crate::encode::decode_uuid).transpose()?;

    Ok(IssueOutcome {
      version: raw_version.into_version()?,
      superseded,
      summary,
    })
  }

  async fn record_issue_failure(&self, id: Uuid, message: String) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = require_version(&tx, &id_str, id)?;
        if current.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(id)));
        }
        tx.execute(
          "UPDATE document_versions SET issue_error = ?1 WHERE id = ?2",
          rusqlite::params![message, id_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(map_tx_err)
  }

  async fn create_new_version_from(
    &self,
    issued_id: Uuid,
    actor: Actor,
  ) -> Result<DocumentVersion> {
    Self::require_edit(actor, "creating a new version")?;

    // Early read for the chain id; everything is re-validated inside the
    // transaction.
    let source = self
      .get_version(issued_id)
      .await?
      .ok_or(Error::Core(quill_core::Error::VersionNotFound(issued_id)))?;
    let chain_id = source.chain_id;

    let new_id = Uuid::new_v4();
    let now = Utc::now();
    let new_id_str = encode_uuid(new_id);
    let source_id_str = encode_uuid(issued_id);
    let now_str = encode_dt(now);
    let actor_str = encode_uuid(actor.actor_id);

    let (raw, carried) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = require_version(&tx, &source_id_str, issued_id)?;
        if current.issue_state != "issued" {
          return Err(domain(quill_core::Error::ChainConflict {
            chain_id,
            reason: "only the issued version can seed a new draft".into(),
          }));
        }
        if draft_exists(&tx, &current.chain_id)? {
          return Err(domain(quill_core::Error::ChainConflict {
            chain_id,
            reason: "a draft already exists in this chain".into(),
          }));
        }

        let number: i64 = tx.query_row(
          "SELECT COALESCE(MAX(version_number), 0) + 1
           FROM document_versions WHERE chain_id = ?1",
          rusqlite::params![current.chain_id],
          |r| r.get(0),
        )?;

        // Copy descriptive fields; reset every locked-artifact, approval,
        // and issuance field.
        tx.execute(
          "INSERT INTO document_versions (
             id, chain_id, version_number, issue_state, title, document_type,
             scope, created_at, created_by, requires_approval
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            new_id_str,
            current.chain_id,
            number,
            encode_issue_state(IssueState::Draft),
            current.title,
            current.document_type,
            current.scope,
            now_str,
            actor_str,
            current.requires_approval,
          ],
        )?;

        // Carry forward unresolved, non-deleted actions. Status resets to
        // open unless explicitly deferred; closed/not-applicable stay
        // behind. The (version_id, origin_action_id) unique index makes a
        // retry idempotent.
        let mut carried = 0usize;
        for old in action_rows(&tx, &source_id_str, false)? {
          if !matches!(old.status.as_str(), "open" | "in_progress" | "deferred") {
            continue;
          }
          let status = if old.status == "deferred" { "deferred" } else { "open" };
          tx.execute(
            "INSERT INTO actions (
               id, version_id, source_version_id, origin_action_id,
               reference_number, title, description, status, created_at,
               created_by
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
              encode_uuid(Uuid::new_v4()),
              new_id_str,
              old.source_version_id,
              old.id,
              old.reference_number,
              old.title,
              old.description,
              status,
              now_str,
              actor_str,
            ],
          )?;
          carried += 1;
        }

        let created = require_version(&tx, &new_id_str, new_id)?;
        tx.commit()?;
        Ok((created, carried))
      })
      .await
      .map_err(|e| {
        if unique_violation(&e, "document_versions.chain_id") {
          Error::Core(quill_core::Error::ChainConflict {
            chain_id,
            reason: "a draft already exists in this chain".into(),
          })
        } else {
          map_tx_err(e)
        }
      })?;

    tracing::debug!(
      source = %issued_id,
      draft = %new_id,
      carried,
      "created new version with carried-forward actions"
    );
    raw.into_version()
  }

  // ── Answers & rule engine ─────────────────────────────────────────────────

  async fn save_rating(
    &self,
    version_id: Uuid,
    input: RatedAnswer,
    actor: Actor,
  ) -> Result<RatingOutcome> {
    Self::require_edit(actor, "saving an answer")?;

    let now = Utc::now();
    let rating = input
      .rating
      .as_deref()
      .map(recommendation::normalize_rating);

    let version_str = encode_uuid(version_id);
    let actor_str = encode_uuid(actor.actor_id);
    let now_str = encode_dt(now);
    let section_key = input.section_key.clone();
    let field_key = input.field_key.clone();
    let rating_cl = rating.clone();
    let value_json = serde_json::to_string(&input.value)?;

    let (matched, upserted, retracted) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = require_version(&tx, &version_str, version_id)?;
        if current.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(version_id)));
        }

        let old_rating: Option<String> = tx
          .query_row(
            "SELECT rating FROM answers
             WHERE version_id = ?1 AND section_key = ?2 AND field_key = ?3",
            rusqlite::params![version_str, section_key, field_key],
            |r| r.get(0),
          )
          .optional()?
          .flatten();

        tx.execute(
          "INSERT INTO answers (
             version_id, section_key, field_key, value_json, rating,
             updated_at, updated_by
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (version_id, section_key, field_key) DO UPDATE SET
             value_json = excluded.value_json,
             rating     = excluded.rating,
             updated_at = excluded.updated_at,
             updated_by = excluded.updated_by",
          rusqlite::params![
            version_str,
            section_key,
            field_key,
            value_json,
            rating_cl,
            now_str,
            actor_str,
          ],
        )?;

        let triggers: Vec<RecommendationTrigger> = {
          let mut stmt = tx.prepare(
            "SELECT id, section_key, field_key, rating_value, template_id,
                    priority, is_active
             FROM recommendation_triggers
             WHERE section_key = ?1 AND field_key = ?2 AND is_active = 1
             ORDER BY priority DESC",
          )?;
          stmt
            .query_map(
              rusqlite::params![section_key, field_key],
              RawTrigger::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|raw| raw.into_trigger().map_err(decode_err))
            .collect::<std::result::Result<_, _>>()?
        };

        let plan = recommendation::plan(
          version_id,
          &section_key,
          &field_key,
          old_rating.as_deref(),
          rating_cl.as_deref(),
          &triggers,
        );

        // Upsert keyed by (trigger_key, template_id): insert if absent,
        // un-retract if previously retracted, otherwise a no-op.
        let mut upserted = 0usize;
        for inst in &plan.upserts {
          upserted += tx.execute(
            "INSERT INTO recommendation_instances (
               id, version_id, section_key, field_key, rating_value,
               template_id, trigger_key, include_in_report, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
             ON CONFLICT (version_id, trigger_key, template_id) DO UPDATE SET
               include_in_report = 1
             WHERE include_in_report = 0",
            rusqlite::params![
              encode_uuid(Uuid::new_v4()),
              version_str,
              inst.section_key,
              inst.field_key,
              inst.rating_value,
              encode_uuid(inst.template_id),
              inst.trigger_key,
              now_str,
            ],
          )?;
        }

        // Soft-retract instances keyed by the rating that no longer holds.
        let mut retracted = 0usize;
        for key in &plan.retract_keys {
          retracted += tx.execute(
            "UPDATE recommendation_instances SET include_in_report = 0
             WHERE version_id = ?1 AND trigger_key = ?2
               AND include_in_report = 1",
            rusqlite::params![version_str, key],
          )?;
        }

        tx.commit()?;
        Ok((plan.matched, upserted, retracted))
      })
      .await
      .map_err(map_tx_err)?;

    // Diagnostic evaluation log; carries no business invariant.
    tracing::debug!(
      version = %version_id,
      section = %input.section_key,
      field = %input.field_key,
      rating = ?rating,
      matched,
      upserted,
      retracted,
      "rating evaluated against trigger table"
    );

    Ok(RatingOutcome {
      answer: Answer {
        version_id,
        section_key: input.section_key,
        field_key: input.field_key,
        value: input.value,
        rating,
        updated_at: now,
        updated_by: actor.actor_id,
      },
      matched,
      upserted,
      retracted,
    })
  }

  async fn list_answers(&self, version_id: Uuid) -> Result<Vec<Answer>> {
    let version_str = encode_uuid(version_id);
    let raws: Vec<RawAnswer> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id, section_key, field_key, value_json, rating,
                  updated_at, updated_by
           FROM answers WHERE version_id = ?1
           ORDER BY section_key, field_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str], RawAnswer::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawAnswer::into_answer).collect()
  }

  // ── Action ledger ─────────────────────────────────────────────────────────

  async fn add_action(&self, input: NewAction, actor: Actor) -> Result<Action> {
    Self::require_edit(actor, "adding an action")?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let id_str = encode_uuid(id);
    let version_str = encode_uuid(input.version_id);
    let now_str = encode_dt(now);
    let actor_str = encode_uuid(actor.actor_id);
    let title = input.title.clone();
    let description = input.description.clone();
    let version_id = input.version_id;

    let reference = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = require_version(&tx, &version_str, version_id)?;
        if current.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(version_id)));
        }

        // Read-then-reserve the chain counter inside the insert's own
        // transaction so concurrent creation cannot duplicate a number.
        let next: Option<i64> = tx
          .query_row(
            "SELECT next_reference FROM chain_counters WHERE chain_id = ?1",
            rusqlite::params![current.chain_id],
            |r| r.get(0),
          )
          .optional()?;
        let number = match next {
          Some(n) => {
            tx.execute(
              "UPDATE chain_counters SET next_reference = ?1 WHERE chain_id = ?2",
              rusqlite::params![n + 1, current.chain_id],
            )?;
            n
          }
          None => {
            tx.execute(
              "INSERT INTO chain_counters (chain_id, next_reference) VALUES (?1, 2)",
              rusqlite::params![current.chain_id],
            )?;
            1
          }
        };
        let reference = format!("R-{number:02}");

        tx.execute(
          "INSERT INTO actions (
             id, version_id, source_version_id, origin_action_id,
             reference_number, title, description, status, created_at,
             created_by
           ) VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, 'open', ?7, ?8)",
          rusqlite::params![
            id_str,
            version_str,
            version_str,
            reference,
            title,
            description,
            now_str,
            actor_str,
          ],
        )?;
        tx.commit()?;
        Ok(reference)
      })
      .await
      .map_err(map_tx_err)?;

    Ok(Action {
      id,
      version_id: input.version_id,
      source_version_id: input.version_id,
      origin_action_id: None,
      reference_number: reference,
      title: input.title,
      description: input.description,
      status: ActionStatus::Open,
      created_at: now,
      created_by: actor.actor_id,
      closed_at: None,
      closed_by: None,
      closure_note: None,
      reopened_at: None,
      reopened_by: None,
      reopen_note: None,
      deleted_at: None,
      deleted_by: None,
    })
  }

  async fn get_action(&self, id: Uuid) -> Result<Option<Action>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(action_row(conn, &id_str)?))
      .await?;
    raw.map(RawAction::into_action).transpose()
  }

  async fn list_actions(
    &self,
    version_id: Uuid,
    include_deleted: bool,
  ) -> Result<Vec<Action>> {
    let version_str = encode_uuid(version_id);
    let raws = self
      .conn
      .call(move |conn| Ok(action_rows(conn, &version_str, include_deleted)?))
      .await?;
    raws.into_iter().map(RawAction::into_action).collect()
  }

  async fn close_action(
    &self,
    id: Uuid,
    actor: Actor,
    note: Option<String>,
  ) -> Result<Action> {
    Self::require_edit(actor, "closing an action")?;

    let id_str = encode_uuid(id);
    let actor_str = encode_uuid(actor.actor_id);
    let now_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = action_row(&tx, &id_str)?
          .filter(|a| a.deleted_at.is_none())
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;

        let owner = version_row(&tx, &current.version_id)?
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;
        if owner.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(id)));
        }
        if current.status == "closed" {
          return Err(domain(quill_core::Error::ActionClosed(id)));
        }

        tx.execute(
          "UPDATE actions SET status = 'closed', closed_at = ?1,
             closed_by = ?2, closure_note = ?3
           WHERE id = ?4",
          rusqlite::params![now_str, actor_str, note, id_str],
        )?;
        let updated = action_row(&tx, &id_str)?
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;
        tx.commit()?;
        Ok(updated)
      })
      .await
      .map_err(map_tx_err)?;
    raw.into_action()
  }

  async fn reopen_action(
    &self,
    id: Uuid,
    actor: Actor,
    note: Option<String>,
  ) -> Result<Action> {
    if !actor.is_admin {
      return Err(Error::Core(quill_core::Error::PermissionDenied(
        "reopening a closed action requires an elevated role".into(),
      )));
    }

    let id_str = encode_uuid(id);
    let actor_str = encode_uuid(actor.actor_id);
    let now_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = action_row(&tx, &id_str)?
          .filter(|a| a.deleted_at.is_none())
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;

        let owner_id = current.version_id.clone();
        let owner = version_row(&tx, &owner_id)?
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;
        if owner.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(id)));
        }
        if current.status != "closed" {
          let from = crate::encode::decode_action_status(&current.status)
            .map_err(decode_err)?;
          return Err(domain(quill_core::Error::InvalidTransition {
            id,
            from,
            to: ActionStatus::Open,
          }));
        }

        tx.execute(
          "UPDATE actions SET status = 'open', reopened_at = ?1,
             reopened_by = ?2, reopen_note = ?3
           WHERE id = ?4",
          rusqlite::params![now_str, actor_str, note, id_str],
        )?;
        let updated = action_row(&tx, &id_str)?
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;
        tx.commit()?;
        Ok(updated)
      })
      .await
      .map_err(map_tx_err)?;
    raw.into_action()
  }

  async fn set_action_status(
    &self,
    id: Uuid,
    status: ActionStatus,
    actor: Actor,
  ) -> Result<Action> {
    Self::require_edit(actor, "changing an action status")?;

    let id_str = encode_uuid(id);
    let status_str = encode_action_status(status);
    let is_admin = actor.is_admin;

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = action_row(&tx, &id_str)?
          .filter(|a| a.deleted_at.is_none())
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;

        let owner = version_row(&tx, &current.version_id)?
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;
        if owner.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(id)));
        }

        let from = crate::encode::decode_action_status(&current.status)
          .map_err(decode_err)?;
        if status == ActionStatus::Closed {
          // Closure goes through close_action so the audit fields are set.
          return Err(domain(quill_core::Error::InvalidTransition {
            id,
            from,
            to: status,
          }));
        }
        if from == ActionStatus::Closed && !is_admin {
          return Err(domain(quill_core::Error::ActionClosed(id)));
        }

        tx.execute(
          "UPDATE actions SET status = ?1 WHERE id = ?2",
          rusqlite::params![status_str, id_str],
        )?;
        let updated = action_row(&tx, &id_str)?
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;
        tx.commit()?;
        Ok(updated)
      })
      .await
      .map_err(map_tx_err)?;
    raw.into_action()
  }

  async fn delete_action(&self, id: Uuid, actor: Actor) -> Result<()> {
    Self::require_edit(actor, "deleting an action")?;

    let id_str = encode_uuid(id);
    let actor_str = encode_uuid(actor.actor_id);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = action_row(&tx, &id_str)?
          .filter(|a| a.deleted_at.is_none())
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;

        let owner = version_row(&tx, &current.version_id)?
          .ok_or_else(|| domain(quill_core::Error::ActionNotFound(id)))?;
        if owner.issue_state != "draft" {
          return Err(domain(quill_core::Error::VersionLocked(id)));
        }

        tx.execute(
          "UPDATE actions SET deleted_at = ?1, deleted_by = ?2 WHERE id = ?3",
          rusqlite::params![now_str, actor_str, id_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(map_tx_err)
  }

  // ── Recommendation triggers & instances ───────────────────────────────────

  async fn add_trigger(&self, input: NewTrigger) -> Result<RecommendationTrigger> {
    let trigger = RecommendationTrigger {
      id:           Uuid::new_v4(),
      section_key:  input.section_key,
      field_key:    input.field_key,
      rating_value: recommendation::normalize_rating(&input.rating_value),
      template_id:  input.template_id,
      priority:     input.priority,
      is_active:    true,
    };

    let id_str = encode_uuid(trigger.id);
    let section_key = trigger.section_key.clone();
    let field_key = trigger.field_key.clone();
    let rating_value = trigger.rating_value.clone();
    let template_str = encode_uuid(trigger.template_id);
    let priority = trigger.priority;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO recommendation_triggers (
             id, section_key, field_key, rating_value, template_id, priority,
             is_active
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
          rusqlite::params![
            id_str,
            section_key,
            field_key,
            rating_value,
            template_str,
            priority,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| {
        if unique_violation(&e, "recommendation_triggers") {
          Error::Core(quill_core::Error::Storage(
            "an identical trigger already exists".into(),
          ))
        } else {
          map_tx_err(e)
        }
      })?;

    Ok(trigger)
  }

  async fn list_triggers(&self, active_only: bool) -> Result<Vec<RecommendationTrigger>> {
    let raws: Vec<RawTrigger> = self
      .conn
      .call(move |conn| {
        let filter = if active_only { "WHERE is_active = 1" } else { "" };
        let mut stmt = conn.prepare(&format!(
          "SELECT id, section_key, field_key, rating_value, template_id,
                  priority, is_active
           FROM recommendation_triggers {filter}
           ORDER BY section_key, field_key, priority DESC"
        ))?;
        let rows = stmt
          .query_map([], RawTrigger::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawTrigger::into_trigger).collect()
  }

  async fn set_trigger_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> Result<RecommendationTrigger> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE recommendation_triggers SET is_active = ?1 WHERE id = ?2",
          rusqlite::params![active, id_str],
        )?;
        if changed == 0 {
          return Err(domain(quill_core::Error::TriggerNotFound(id)));
        }
        let raw = conn.query_row(
          "SELECT id, section_key, field_key, rating_value, template_id,
                  priority, is_active
           FROM recommendation_triggers WHERE id = ?1",
          rusqlite::params![id_str],
          RawTrigger::from_row,
        )?;
        Ok(raw)
      })
      .await
      .map_err(map_tx_err)?;
    raw.into_trigger()
  }

  async fn list_recommendations(
    &self,
    version_id: Uuid,
    include_retracted: bool,
  ) -> Result<Vec<RecommendationInstance>> {
    let version_str = encode_uuid(version_id);
    let raws: Vec<RawInstance> = self
      .conn
      .call(move |conn| {
        let filter =
          if include_retracted { "" } else { "AND include_in_report = 1" };
        let mut stmt = conn.prepare(&format!(
          "SELECT id, version_id, section_key, field_key, rating_value,
                  template_id, trigger_key, include_in_report, created_at
           FROM recommendation_instances
           WHERE version_id = ?1 {filter}
           ORDER BY created_at, trigger_key"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![version_str], RawInstance::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawInstance::into_instance).collect()
  }

  // ── Change summaries ──────────────────────────────────────────────────────

  async fn change_summary(&self, new_version_id: Uuid) -> Result<Option<ChangeSummary>> {
    let version_str = encode_uuid(new_version_id);
    let raw: Option<RawSummary> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, new_version_id, previous_version_id,
                      new_actions_count, closed_actions_count,
                      outstanding_count, delta_json, created_at
               FROM change_summaries
               WHERE new_version_id = ?1
               ORDER BY created_at DESC LIMIT 1",
              rusqlite::params![version_str],
              RawSummary::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSummary::into_summary).transpose()
  }
}
