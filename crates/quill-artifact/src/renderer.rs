//! The renderer collaborator seam.
//!
//! Rendering is a pure function of version content. The engine never looks
//! inside the output; it checksums and stores it.

use std::future::Future;

use bytes::Bytes;
use serde::Serialize;

use quill_core::{
  action::Action, answer::Answer, version::DocumentVersion,
};

use crate::error::RenderError;

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Everything a renderer may draw from: the version's descriptive fields,
/// its answer set, and its action ledger, captured at issuance time.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSnapshot {
  pub version: DocumentVersion,
  pub answers: Vec<Answer>,
  pub actions: Vec<Action>,
}

/// The renderer's output.
#[derive(Debug, Clone)]
pub struct Rendered {
  pub bytes:     Bytes,
  pub mime_type: String,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// External export renderer (e.g. a PDF engine).
pub trait Renderer: Send + Sync {
  fn render(
    &self,
    snapshot: &ExportSnapshot,
  ) -> impl Future<Output = Result<Rendered, RenderError>> + Send;
}

// ─── Built-in renderer ───────────────────────────────────────────────────────

/// Deterministic built-in renderer producing a canonical JSON export.
///
/// Stands in for the external PDF engine in the server binary and in tests;
/// identical snapshots render to identical bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotRenderer;

impl Renderer for JsonSnapshotRenderer {
  async fn render(
    &self,
    snapshot: &ExportSnapshot,
  ) -> Result<Rendered, RenderError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    Ok(Rendered {
      bytes:     Bytes::from(bytes),
      mime_type: "application/json".to_owned(),
    })
  }
}

// ─── Test renderers ──────────────────────────────────────────────────────────

/// A renderer that always fails — used to fault-inject issuance tests.
#[derive(Debug, Clone, Copy)]
pub struct FailingRenderer;

impl Renderer for FailingRenderer {
  async fn render(
    &self,
    _snapshot: &ExportSnapshot,
  ) -> Result<Rendered, RenderError> {
    Err(RenderError::Failed("synthetic render failure".to_owned()))
  }
}
