//! JSON REST API for the quill issuance engine.
//!
//! Exposes an axum [`Router`] backed by any [`quill_core::store::DocumentStore`]
//! plus an [`Issuer`] for the render-then-commit issuance flow. Auth, TLS,
//! and transport concerns are the caller's responsibility; the acting party
//! arrives as headers (see [`actor`]).
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", quill_api::api_router(state.clone()))
//! ```

pub mod actions;
pub mod actor;
pub mod error;
pub mod recommendations;
pub mod versions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use quill_artifact::{BlobStore, Issuer, Renderer};
use quill_core::store::DocumentStore;

pub use error::ApiError;

/// Shared handler state: the store and the issuance coordinator.
pub struct AppState<S, R, B> {
  pub store:  Arc<S>,
  pub issuer: Arc<Issuer<R, B>>,
}

impl<S, R, B> Clone for AppState<S, R, B> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), issuer: Arc::clone(&self.issuer) }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, R, B>(state: AppState<S, R, B>) -> Router<()>
where
  S: DocumentStore + 'static,
  R: Renderer + Send + Sync + 'static,
  B: BlobStore + Send + Sync + 'static,
{
  Router::new()
    // Version chain
    .route("/versions", post(versions::create::<S, R, B>))
    .route("/versions/{id}", get(versions::get_one::<S, R, B>).patch(versions::update::<S, R, B>))
    .route("/versions/{id}/approve", post(versions::approve::<S, R, B>))
    .route("/versions/{id}/issue", post(versions::issue::<S, R, B>))
    .route("/versions/{id}/next", post(versions::next_version::<S, R, B>))
    .route("/versions/{id}/artifact", get(versions::artifact::<S, R, B>))
    .route("/versions/{id}/integrity", get(versions::integrity::<S, R, B>))
    .route("/versions/{id}/summary", get(versions::summary::<S, R, B>))
    .route("/chains/{chain_id}/versions", get(versions::list_chain::<S, R, B>))
    // Answers
    .route(
      "/versions/{id}/answers",
      put(versions::save_answer::<S, R, B>).get(versions::list_answers::<S, R, B>),
    )
    // Action ledger
    .route(
      "/versions/{id}/actions",
      post(actions::create::<S, R, B>).get(actions::list::<S, R, B>),
    )
    .route("/actions/{id}", get(actions::get_one::<S, R, B>).delete(actions::delete_one::<S, R, B>))
    .route("/actions/{id}/close", post(actions::close::<S, R, B>))
    .route("/actions/{id}/reopen", post(actions::reopen::<S, R, B>))
    .route("/actions/{id}/status", post(actions::set_status::<S, R, B>))
    // Recommendation rule engine
    .route(
      "/triggers",
      post(recommendations::create_trigger::<S, R, B>)
        .get(recommendations::list_triggers::<S, R, B>),
    )
    .route(
      "/triggers/{id}/active",
      put(recommendations::set_trigger_active::<S, R, B>),
    )
    .route(
      "/versions/{id}/recommendations",
      get(recommendations::list_for_version::<S, R, B>),
    )
    .with_state(state)
}
