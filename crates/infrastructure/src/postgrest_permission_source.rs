use std::time::Duration;

use async_trait::async_trait;
use permisos_application::{PermissionSource, RawGrant, RoleRecord};
use permisos_core::{AppError, AppResult, TenantId};
use serde::Deserialize;
use tracing::warn;
use url::Url;
use uuid::Uuid;

const SUBJECT_ROLE_SELECT: &str =
    "role_id,rbac_roles(id,name,tenant_id,rbac_role_grants(position,module,action,scope))";

/// Connection settings for a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Base REST URL, for example `https://project.supabase.co/rest/v1/`.
    pub base_url: Url,
    /// Key sent as both `apikey` header and bearer token.
    pub api_key: String,
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
}

/// Permission source reading subject roles through PostgREST.
#[derive(Clone)]
pub struct PostgrestPermissionSource {
    http_client: reqwest::Client,
    subject_roles_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SubjectRoleRow {
    rbac_roles: Option<RoleRow>,
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    id: Uuid,
    name: String,
    tenant_id: Uuid,
    #[serde(default)]
    rbac_role_grants: Vec<GrantRow>,
}

#[derive(Debug, Deserialize)]
struct GrantRow {
    #[serde(default)]
    position: i32,
    module: String,
    action: String,
    scope: String,
}

impl PostgrestPermissionSource {
    /// Creates a source with a dedicated HTTP client.
    pub fn new(config: PostgrestConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build PostgREST client: {error}"))
            })?;

        let subject_roles_url = rest_base(config.base_url)
            .join("rbac_subject_roles")
            .map_err(|error| AppError::Validation(format!("invalid POSTGREST_URL: {error}")))?;

        Ok(Self {
            http_client,
            subject_roles_url,
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl PermissionSource for PostgrestPermissionSource {
    async fn find_role_for_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<RoleRecord>> {
        let mut request_url = self.subject_roles_url.clone();
        request_url
            .query_pairs_mut()
            .append_pair("select", SUBJECT_ROLE_SELECT)
            .append_pair("tenant_id", format!("eq.{tenant_id}").as_str())
            .append_pair("subject", format!("eq.{subject}").as_str())
            .append_pair("limit", "1");

        let response = self
            .http_client
            .get(request_url)
            .header("apikey", self.api_key.as_str())
            .bearer_auth(self.api_key.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| {
                AppError::Transport(format!("PostgREST request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                tenant_id = %tenant_id,
                subject = %subject,
                status = status.as_u16(),
                "PostgREST rejected subject role lookup"
            );
            return Err(AppError::Transport(format!(
                "PostgREST responded with status {status}"
            )));
        }

        let rows: Vec<SubjectRoleRow> = response.json().await.map_err(|error| {
            AppError::Transport(format!("PostgREST returned an unreadable body: {error}"))
        })?;

        let Some(role) = rows.into_iter().find_map(|row| row.rbac_roles) else {
            return Ok(None);
        };

        let mut grants = role.rbac_role_grants;
        grants.sort_by_key(|grant| grant.position);

        Ok(Some(RoleRecord {
            role_id: role.id.to_string(),
            name: role.name,
            tenant_id: TenantId::from_uuid(role.tenant_id),
            grants: grants
                .into_iter()
                .map(|grant| RawGrant::new(grant.module, grant.action, grant.scope))
                .collect(),
        }))
    }
}

/// Ensures the base path ends with `/` so `join` appends instead of replacing.
fn rest_base(mut base_url: Url) -> Url {
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(path.as_str());
    }
    base_url
}

#[cfg(test)]
mod tests;
