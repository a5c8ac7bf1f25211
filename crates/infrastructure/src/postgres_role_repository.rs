use std::collections::HashMap;

use async_trait::async_trait;
use permisos_application::{
    CreateRoleInput, PermissionSource, RawGrant, RoleAdminRepository, RoleAssignment, RoleRecord,
};
use permisos_core::{AppError, AppResult, TenantId};
use permisos_domain::{Grant, Role};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// PostgreSQL-backed repository for roles, grants and assignments.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Rewrites the grant set of a role inside one transaction.
    ///
    /// The role row is locked before its grants are read, so concurrent
    /// edits of one role apply one after another.
    async fn edit_role(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        edit: impl FnOnce(&Role) -> Role + Send,
    ) -> AppResult<Role> {
        let role_uuid = parse_role_id(role_id)?;
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let role_name = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name
            FROM rbac_roles
            WHERE tenant_id = $1 AND id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_uuid)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to resolve role: {error}")))?
        .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;

        let stored = sqlx::query_as::<_, StoredGrantRow>(
            r#"
            SELECT module, action, scope
            FROM rbac_role_grants
            WHERE role_id = $1
            ORDER BY position
            "#,
        )
        .bind(role_uuid)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role grants: {error}")))?;

        let grants = stored
            .into_iter()
            .map(|row| {
                Grant::parse(&row.module, &row.action, &row.scope).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid stored grant ({}, {}, {}) on role '{role_id}': {error}",
                        row.module, row.action, row.scope
                    ))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        let current = Role::new(role_id, role_name, tenant_id, grants)?;
        let edited = edit(&current);

        sqlx::query("DELETE FROM rbac_role_grants WHERE role_id = $1")
            .bind(role_uuid)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear role grants: {error}"))
            })?;
        insert_grants(&mut transaction, role_uuid, edited.grants()).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(edited)
    }
}

#[derive(Debug, FromRow)]
struct RoleGrantRow {
    role_id: Uuid,
    role_name: String,
    module: Option<String>,
    action: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, FromRow)]
struct StoredGrantRow {
    module: String,
    action: String,
    scope: String,
}

#[derive(Debug, FromRow)]
struct RoleAssignmentRow {
    subject: String,
    role_id: Uuid,
    role_name: String,
}

#[async_trait]
impl PermissionSource for PostgresRoleRepository {
    async fn find_role_for_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<RoleRecord>> {
        let rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT
                roles.id AS role_id,
                roles.name AS role_name,
                grants.module,
                grants.action,
                grants.scope
            FROM rbac_subject_roles AS subject_roles
            INNER JOIN rbac_roles AS roles
                ON roles.id = subject_roles.role_id
            LEFT JOIN rbac_role_grants AS grants
                ON grants.role_id = roles.id
            WHERE subject_roles.tenant_id = $1
                AND subject_roles.subject = $2
            ORDER BY grants.position
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Transport(format!("failed to load subject role: {error}")))?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let mut record = RoleRecord {
            role_id: first.role_id.to_string(),
            name: first.role_name.clone(),
            tenant_id,
            grants: Vec::with_capacity(rows.len()),
        };

        for row in rows {
            if let (Some(module), Some(action), Some(scope)) = (row.module, row.action, row.scope)
            {
                record.grants.push(RawGrant::new(module, action, scope));
            }
        }

        Ok(Some(record))
    }
}

#[async_trait]
impl RoleAdminRepository for PostgresRoleRepository {
    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT
                roles.id AS role_id,
                roles.name AS role_name,
                grants.module,
                grants.action,
                grants.scope
            FROM rbac_roles AS roles
            LEFT JOIN rbac_role_grants AS grants
                ON grants.role_id = roles.id
            WHERE roles.tenant_id = $1
            ORDER BY roles.name, grants.position
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        aggregate_roles(rows, tenant_id)
    }

    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<Role>> {
        let role_uuid = parse_role_id(role_id)?;

        let rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT
                roles.id AS role_id,
                roles.name AS role_name,
                grants.module,
                grants.action,
                grants.scope
            FROM rbac_roles AS roles
            LEFT JOIN rbac_role_grants AS grants
                ON grants.role_id = roles.id
            WHERE roles.tenant_id = $1
                AND roles.id = $2
            ORDER BY grants.position
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        Ok(aggregate_roles(rows, tenant_id)?.into_iter().next())
    }

    async fn create_role(&self, tenant_id: TenantId, input: CreateRoleInput) -> AppResult<Role> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let role_uuid = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO rbac_roles (tenant_id, name)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(input.name.trim())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| map_role_conflict(error, input.name.as_str()))?;

        let role = Role::new(role_uuid.to_string(), input.name, tenant_id, input.grants)?;
        insert_grants(&mut transaction, role_uuid, role.grants()).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(role)
    }

    async fn save_role_grants(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grants: &[Grant],
    ) -> AppResult<Role> {
        self.edit_role(tenant_id, role_id, |role| role.with_grants(grants.to_vec()))
            .await
    }

    async fn add_role_grant(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grant: &Grant,
    ) -> AppResult<Role> {
        self.edit_role(tenant_id, role_id, |role| role.with_added_grant(grant.clone()))
            .await
    }

    async fn remove_role_grant(
        &self,
        tenant_id: TenantId,
        role_id: &str,
        grant: &Grant,
    ) -> AppResult<Role> {
        self.edit_role(tenant_id, role_id, |role| role.with_removed_grant(grant))
            .await
    }

    async fn delete_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<()> {
        let role_uuid = parse_role_id(role_id)?;

        let rows_affected = sqlx::query(
            r#"
            DELETE FROM rbac_roles
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_uuid)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_foreign_key_violation(&error) {
                return AppError::Conflict(format!("role '{role_id}' is still assigned"));
            }
            AppError::Internal(format!("failed to delete role: {error}"))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        Ok(())
    }

    async fn assign_role(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &str,
    ) -> AppResult<()> {
        let role_uuid = parse_role_id(role_id)?;

        let rows_affected = sqlx::query(
            r#"
            INSERT INTO rbac_subject_roles (tenant_id, subject, role_id)
            SELECT roles.tenant_id, $2, roles.id
            FROM rbac_roles AS roles
            WHERE roles.tenant_id = $1 AND roles.id = $3
            ON CONFLICT (tenant_id, subject) DO UPDATE
            SET role_id = EXCLUDED.role_id, created_at = now()
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject)
        .bind(role_uuid)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to assign role: {error}")))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        Ok(())
    }

    async fn unassign_role(&self, tenant_id: TenantId, subject: &str) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM rbac_subject_roles
            WHERE tenant_id = $1 AND subject = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to remove role assignment: {error}")))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "subject '{subject}' has no role in tenant '{tenant_id}'"
            )));
        }

        Ok(())
    }

    async fn list_subjects_for_role(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> AppResult<Vec<String>> {
        let role_uuid = parse_role_id(role_id)?;

        sqlx::query_scalar::<_, String>(
            r#"
            SELECT subject
            FROM rbac_subject_roles
            WHERE tenant_id = $1 AND role_id = $2
            ORDER BY subject
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role subjects: {error}")))
    }

    async fn list_role_assignments(&self, tenant_id: TenantId) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT
                subject_roles.subject,
                subject_roles.role_id,
                roles.name AS role_name
            FROM rbac_subject_roles AS subject_roles
            INNER JOIN rbac_roles AS roles
                ON roles.id = subject_roles.role_id
            WHERE subject_roles.tenant_id = $1
            ORDER BY subject_roles.subject
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role assignments: {error}")))?;

        Ok(rows
            .into_iter()
            .map(|row| RoleAssignment {
                subject: row.subject,
                role_id: row.role_id.to_string(),
                role_name: row.role_name,
            })
            .collect())
    }
}

async fn insert_grants(
    transaction: &mut Transaction<'_, Postgres>,
    role_uuid: Uuid,
    grants: &[Grant],
) -> AppResult<()> {
    for (position, grant) in grants.iter().enumerate() {
        let position = i32::try_from(position).map_err(|_| {
            AppError::Validation(format!("role '{role_uuid}' has too many grants"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO rbac_role_grants (role_id, position, module, action, scope)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (role_id, module, action, scope) DO NOTHING
            "#,
        )
        .bind(role_uuid)
        .bind(position)
        .bind(grant.module().as_str())
        .bind(grant.action().as_str())
        .bind(grant.scope().as_str())
        .execute(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to persist role grants: {error}")))?;
    }

    Ok(())
}

fn aggregate_roles(rows: Vec<RoleGrantRow>, tenant_id: TenantId) -> AppResult<Vec<Role>> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut by_id: HashMap<Uuid, (String, Vec<Grant>)> = HashMap::new();

    for row in rows {
        let entry = by_id.entry(row.role_id).or_insert_with(|| {
            order.push(row.role_id);
            (row.role_name.clone(), Vec::new())
        });

        if let (Some(module), Some(action), Some(scope)) = (row.module, row.action, row.scope) {
            let grant = Grant::parse(&module, &action, &scope).map_err(|error| {
                AppError::Internal(format!(
                    "invalid stored grant ({module}, {action}, {scope}) for tenant '{tenant_id}': {error}"
                ))
            })?;
            entry.1.push(grant);
        }
    }

    order
        .into_iter()
        .filter_map(|role_id| by_id.remove(&role_id).map(|value| (role_id, value)))
        .map(|(role_id, (name, grants))| Role::new(role_id.to_string(), name, tenant_id, grants))
        .collect()
}

fn parse_role_id(role_id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(role_id)
        .map_err(|error| AppError::Validation(format!("invalid role id '{role_id}': {error}")))
}

fn map_role_conflict(error: sqlx::Error, role_name: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("role '{}' already exists", role_name.trim()));
    }

    AppError::Internal(format!("failed to create role: {error}"))
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(database_error) if database_error.code().as_deref() == Some("23503")
    )
}

#[cfg(test)]
mod tests;
