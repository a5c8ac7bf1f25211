//! Application services and ports.

#![forbid(unsafe_code)]

mod ability_cache;
mod ability_service;
mod audit_ports;
mod permission_ports;
mod permission_store;
mod role_admin_ports;
mod role_admin_service;

#[cfg(test)]
mod test_support;

pub use ability_cache::{AbilityCache, AbilityPhase};
pub use ability_service::{AbilityService, SubjectAbility};
pub use audit_ports::{AuditEvent, AuditRepository};
pub use permission_ports::{PermissionSource, RawGrant, RoleRecord};
pub use permission_store::{DEFAULT_FETCH_TIMEOUT, PermissionStore};
pub use role_admin_ports::{CreateRoleInput, RoleAdminRepository, RoleAssignment};
pub use role_admin_service::RoleAdminService;
