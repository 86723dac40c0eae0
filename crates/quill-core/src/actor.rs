//! The acting party for every mutating operation.
//!
//! Identity and role resolution belong to an external provider; the engine
//! consumes the result as opaque flags. Every operation takes an [`Actor`]
//! explicitly — there is no ambient "current user" state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is performing an operation, and with what privileges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Actor {
  pub actor_id: Uuid,
  /// May mutate drafts and issue documents.
  pub can_edit: bool,
  /// Elevated role; required for reopening closed actions.
  pub is_admin: bool,
}

impl Actor {
  /// An actor with edit rights but no elevated role.
  pub fn editor(actor_id: Uuid) -> Self {
    Self { actor_id, can_edit: true, is_admin: false }
  }

  /// An actor with edit rights and the elevated role.
  pub fn admin(actor_id: Uuid) -> Self {
    Self { actor_id, can_edit: true, is_admin: true }
  }

  /// A read-only actor.
  pub fn viewer(actor_id: Uuid) -> Self {
    Self { actor_id, can_edit: false, is_admin: false }
  }
}
