use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use permisos_core::{AppError, AppResult, TenantId, UserIdentity};
use permisos_domain::{Grant, Role};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{PermissionSource, RoleRecord};

/// Fetch timeout used when none is configured.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) type SubjectKey = (TenantId, String);

pub(crate) fn subject_key(identity: &UserIdentity) -> SubjectKey {
    (identity.tenant_id(), identity.subject().to_owned())
}

/// Owner of the raw role and grant state fetched from the backend.
///
/// State is only replaced by an explicit [`PermissionStore::load`]; the
/// store never polls the backend on its own.
#[derive(Clone)]
pub struct PermissionStore {
    source: Arc<dyn PermissionSource>,
    fetch_timeout: Duration,
    roles: Arc<RwLock<HashMap<SubjectKey, Role>>>,
}

impl PermissionStore {
    /// Creates a store reading from the given backend source.
    #[must_use]
    pub fn new(source: Arc<dyn PermissionSource>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            fetch_timeout,
            roles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetches, validates and stores the role of a subject.
    ///
    /// Fails with `NotFound` when the subject has no role, `Transport` when
    /// the backend is unreachable or exceeds the fetch timeout, and
    /// `Validation` when the backend returns malformed grants.
    pub async fn load(&self, identity: &UserIdentity) -> AppResult<Role> {
        let fetched = self.fetch(identity).await;
        match &fetched {
            Ok(role) => self.remember(identity, Some(role.clone())).await,
            Err(error) if error.is_not_found() => self.remember(identity, None).await,
            Err(_) => {}
        }

        fetched
    }

    /// Fetches and validates the role of a subject without storing it.
    pub(crate) async fn fetch(&self, identity: &UserIdentity) -> AppResult<Role> {
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.source
                .find_role_for_subject(identity.tenant_id(), identity.subject()),
        )
        .await
        .map_err(|_| {
            AppError::Transport(format!(
                "permission fetch for subject '{}' in tenant '{}' timed out after {} ms",
                identity.subject(),
                identity.tenant_id(),
                self.fetch_timeout.as_millis()
            ))
        })
        .and_then(|result| result);

        let record = match fetched {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(
                    tenant_id = %identity.tenant_id(),
                    subject = %identity.subject(),
                    "subject has no role"
                );
                return Err(AppError::NotFound(format!(
                    "subject '{}' has no role in tenant '{}'",
                    identity.subject(),
                    identity.tenant_id()
                )));
            }
            Err(error) => {
                warn!(
                    tenant_id = %identity.tenant_id(),
                    subject = %identity.subject(),
                    error = %error,
                    "failed to fetch subject role"
                );
                return Err(error);
            }
        };

        let role = validate_record(identity, record)?;
        debug!(
            tenant_id = %identity.tenant_id(),
            subject = %identity.subject(),
            role_id = %role.role_id(),
            grant_count = role.grants().len(),
            "subject role loaded"
        );

        Ok(role)
    }

    /// Stores the role of a subject, or drops it when the subject has none.
    pub(crate) async fn remember(&self, identity: &UserIdentity, role: Option<Role>) {
        let key = subject_key(identity);
        let mut roles = self.roles.write().await;
        match role {
            Some(role) => {
                roles.insert(key, role);
            }
            None => {
                roles.remove(&key);
            }
        }
    }

    /// Returns the last successfully loaded role of a subject.
    pub async fn cached_role(&self, identity: &UserIdentity) -> Option<Role> {
        self.roles.read().await.get(&subject_key(identity)).cloned()
    }

    /// Drops the stored role of a subject.
    pub async fn forget(&self, identity: &UserIdentity) {
        self.roles.write().await.remove(&subject_key(identity));
    }
}

fn validate_record(identity: &UserIdentity, record: RoleRecord) -> AppResult<Role> {
    if record.tenant_id != identity.tenant_id() {
        return Err(AppError::Validation(format!(
            "role '{}' belongs to tenant '{}' but was returned for subject '{}' in tenant '{}'",
            record.role_id,
            record.tenant_id,
            identity.subject(),
            identity.tenant_id()
        )));
    }

    let grants = record
        .grants
        .iter()
        .map(|raw| {
            Grant::parse(&raw.module, &raw.action, &raw.scope).map_err(|error| {
                AppError::Validation(format!(
                    "malformed grant ({}, {}, {}) on role '{}': {error}",
                    raw.module, raw.action, raw.scope, record.role_id
                ))
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Role::new(record.role_id, record.name, record.tenant_id, grants)
}

#[cfg(test)]
mod tests;
