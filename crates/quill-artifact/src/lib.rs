//! Locked-artifact service for the quill issuance engine.
//!
//! Renders the immutable export at issuance time, checksums it, stages it in
//! a blob store, and commits the pointer together with the state flip in one
//! store transaction. Rendering itself is a black box behind the
//! [`Renderer`] trait.

#![allow(async_fn_in_trait)]

pub mod blob;
pub mod checksum;
pub mod error;
pub mod renderer;
pub mod service;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{BlobError, RenderError};
pub use renderer::{ExportSnapshot, JsonSnapshotRenderer, Rendered, Renderer};
pub use service::{ArtifactDecision, Issuer, artifact_decision};
