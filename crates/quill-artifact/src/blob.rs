//! The blob-store collaborator seam, with a filesystem implementation for
//! the server binary and an in-memory one for tests.

use std::{
  collections::HashMap,
  future::Future,
  path::PathBuf,
  sync::{Arc, Mutex},
  time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;

use crate::error::BlobError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Opaque content storage for locked artifacts and evidence attachments.
///
/// A returned ref is a stable opaque string; callers persist it and hand it
/// back for reads.
pub trait BlobStore: Send + Sync {
  /// Store `bytes` under `path` and return the blob ref.
  fn put(
    &self,
    path: String,
    bytes: Bytes,
  ) -> impl Future<Output = Result<String, BlobError>> + Send + '_;

  fn get(
    &self,
    blob_ref: String,
  ) -> impl Future<Output = Result<Bytes, BlobError>> + Send + '_;

  /// A time-limited URL for external sharing of a blob.
  fn signed_url(
    &self,
    blob_ref: String,
    ttl_seconds: u64,
  ) -> impl Future<Output = Result<String, BlobError>> + Send + '_;

  /// Remove a blob. Used for best-effort cleanup of staged artifacts whose
  /// issuance transaction did not commit.
  fn delete(
    &self,
    blob_ref: String,
  ) -> impl Future<Output = Result<(), BlobError>> + Send + '_;
}

// ─── Filesystem ──────────────────────────────────────────────────────────────

/// Blob store rooted at a local directory. Refs are paths relative to the
/// root.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  fn resolve(&self, blob_ref: &str) -> PathBuf { self.root.join(blob_ref) }
}

impl BlobStore for FsBlobStore {
  async fn put(&self, path: String, bytes: Bytes) -> Result<String, BlobError> {
    let full = self.resolve(&path);
    if let Some(parent) = full.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&full, &bytes).await?;
    Ok(path)
  }

  async fn get(&self, blob_ref: String) -> Result<Bytes, BlobError> {
    let full = self.resolve(&blob_ref);
    match tokio::fs::read(&full).await {
      Ok(bytes) => Ok(Bytes::from(bytes)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(BlobError::NotFound(blob_ref))
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Local-development stand-in: a `file://` URL with an expiry query
  /// parameter, not a cryptographically signed link.
  async fn signed_url(
    &self,
    blob_ref: String,
    ttl_seconds: u64,
  ) -> Result<String, BlobError> {
    let full = self.resolve(&blob_ref);
    if !tokio::fs::try_exists(&full).await? {
      return Err(BlobError::NotFound(blob_ref));
    }
    let expires = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs() + ttl_seconds)
      .unwrap_or(ttl_seconds);
    Ok(format!("file://{}?expires={expires}", full.display()))
  }

  async fn delete(&self, blob_ref: String) -> Result<(), BlobError> {
    let full = self.resolve(&blob_ref);
    match tokio::fs::remove_file(&full).await {
      Ok(())                                                => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound    => {
        Err(BlobError::NotFound(blob_ref))
      }
      Err(e) => Err(e.into()),
    }
  }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// Blob store backed by a shared map — useful for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
  blobs: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.blobs.lock().unwrap().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl BlobStore for MemoryBlobStore {
  async fn put(&self, path: String, bytes: Bytes) -> Result<String, BlobError> {
    self.blobs.lock().unwrap().insert(path.clone(), bytes);
    Ok(path)
  }

  async fn get(&self, blob_ref: String) -> Result<Bytes, BlobError> {
    self
      .blobs
      .lock()
      .unwrap()
      .get(&blob_ref)
      .cloned()
      .ok_or(BlobError::NotFound(blob_ref))
  }

  async fn signed_url(
    &self,
    blob_ref: String,
    ttl_seconds: u64,
  ) -> Result<String, BlobError> {
    if !self.blobs.lock().unwrap().contains_key(&blob_ref) {
      return Err(BlobError::NotFound(blob_ref));
    }
    Ok(format!("memory://{blob_ref}?ttl={ttl_seconds}"))
  }

  async fn delete(&self, blob_ref: String) -> Result<(), BlobError> {
    self
      .blobs
      .lock()
      .unwrap()
      .remove(&blob_ref)
      .map(|_| ())
      .ok_or(BlobError::NotFound(blob_ref))
  }
}
