//! Error types for the artifact collaborator seams.

use thiserror::Error;

/// Failure reported by a [`crate::Renderer`].
#[derive(Debug, Error)]
pub enum RenderError {
  #[error("renderer failed: {0}")]
  Failed(String),

  /// The renderer did not respond in time. Mapped to an aborted issuance,
  /// never retried inside the engine.
  #[error("renderer timed out after {0}s")]
  Timeout(u64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Failure reported by a [`crate::BlobStore`].
#[derive(Debug, Error)]
pub enum BlobError {
  #[error("blob not found: {0}")]
  NotFound(String),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}
