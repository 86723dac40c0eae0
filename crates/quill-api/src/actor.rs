//! Actor extraction from request headers.
//!
//! Identity and role resolution live with an external provider (gateway,
//! reverse proxy, session layer); the engine receives the result as three
//! headers and threads the [`Actor`] explicitly into every operation. There
//! is no ambient "current user" anywhere below this point.

use axum::{extract::FromRequestParts, http::request::Parts};
use quill_core::actor::Actor;
use uuid::Uuid;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_CAN_EDIT_HEADER: &str = "x-actor-can-edit";
pub const ACTOR_ADMIN_HEADER: &str = "x-actor-admin";

/// The [`Actor`] resolved from request headers.
#[derive(Debug, Clone, Copy)]
pub struct ActorContext(pub Actor);

fn flag(parts: &Parts, name: &str) -> bool {
  parts
    .headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    .unwrap_or(false)
}

impl<S: Send + Sync> FromRequestParts<S> for ActorContext {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    let actor_id = parts
      .headers
      .get(ACTOR_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| {
        ApiError::BadRequest(format!("missing {ACTOR_ID_HEADER} header"))
      })?;
    let actor_id = Uuid::parse_str(actor_id).map_err(|_| {
      ApiError::BadRequest(format!("{ACTOR_ID_HEADER} is not a UUID"))
    })?;

    Ok(Self(Actor {
      actor_id,
      can_edit: flag(parts, ACTOR_CAN_EDIT_HEADER),
      is_admin: flag(parts, ACTOR_ADMIN_HEADER),
    }))
  }
}
