//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod ability;
mod grant;
mod role;
mod security;

pub use ability::{AbilityPredicate, AbilityRule, ResourceInstance};
pub use grant::{ActionId, Grant, GrantScope, ModuleId, WILDCARD};
pub use role::{ROLES_MODULE, ROLE_MANAGE_ACTION, Role};
pub use security::AuditAction;
