use permisos_application::{CreateRoleInput, PermissionSource, RoleAdminRepository};
use permisos_core::{AppError, TenantId};
use permisos_domain::Grant;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresRoleRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres role tests: {error}");
    }

    Some(pool)
}

fn grant(module: &str, action: &str, scope: &str) -> Grant {
    Grant::parse(module, action, scope).unwrap_or_else(|error| panic!("{error}"))
}

#[tokio::test]
async fn assigned_role_is_returned_with_ordered_grants() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let tenant_id = TenantId::new();
    let role = repository
        .create_role(
            tenant_id,
            CreateRoleInput {
                name: "Medico".to_owned(),
                grants: vec![
                    grant("episodios", "ver", "tenant"),
                    grant("episodios", "editar", "own"),
                ],
            },
        )
        .await;
    assert!(role.is_ok());
    let Ok(role) = role else {
        return;
    };

    assert!(
        repository
            .assign_role(tenant_id, "dra-lopez", role.role_id())
            .await
            .is_ok()
    );

    let record = repository
        .find_role_for_subject(tenant_id, "dra-lopez")
        .await;
    assert!(record.as_ref().is_ok_and(|record| record.is_some()));
    let Ok(Some(record)) = record else {
        return;
    };
    assert_eq!(record.name, "Medico");
    assert_eq!(record.grants.len(), 2);
    assert_eq!(record.grants[0].action, "ver");
    assert_eq!(record.grants[1].scope, "own");

    let missing = repository.find_role_for_subject(tenant_id, "sin-rol").await;
    assert!(matches!(missing, Ok(None)));
}

#[tokio::test]
async fn role_without_grants_still_resolves() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let tenant_id = TenantId::new();
    let role = repository
        .create_role(
            tenant_id,
            CreateRoleInput {
                name: "Invitado".to_owned(),
                grants: Vec::new(),
            },
        )
        .await;
    let Ok(role) = role else {
        panic!("role creation should succeed");
    };
    assert!(
        repository
            .assign_role(tenant_id, "invitado", role.role_id())
            .await
            .is_ok()
    );

    let record = repository.find_role_for_subject(tenant_id, "invitado").await;
    assert!(record.is_ok_and(|record| record.is_some_and(|record| record.grants.is_empty())));
}

#[tokio::test]
async fn duplicate_role_name_conflicts() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let tenant_id = TenantId::new();
    let input = CreateRoleInput {
        name: "Enfermeria".to_owned(),
        grants: Vec::new(),
    };

    assert!(repository.create_role(tenant_id, input.clone()).await.is_ok());
    let duplicate = repository.create_role(tenant_id, input).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn save_role_grants_replaces_existing_entries() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let tenant_id = TenantId::new();
    let Ok(role) = repository
        .create_role(
            tenant_id,
            CreateRoleInput {
                name: "Farmacia".to_owned(),
                grants: vec![grant("inventario", "ver", "tenant")],
            },
        )
        .await
    else {
        panic!("role creation should succeed");
    };

    let saved = repository
        .save_role_grants(
            tenant_id,
            role.role_id(),
            &[grant("inventario", "*", "tenant")],
        )
        .await;
    assert!(saved.is_ok());

    let reloaded = repository
        .find_role(tenant_id, role.role_id())
        .await
        .ok()
        .flatten();
    assert!(reloaded.is_some_and(|role| {
        role.grants().len() == 1 && role.grants()[0].action().is_wildcard()
    }));
}

#[tokio::test]
async fn concurrent_grant_additions_are_all_kept() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let tenant_id = TenantId::new();
    let Ok(role) = repository
        .create_role(
            tenant_id,
            CreateRoleInput {
                name: "Enfermeria".to_owned(),
                grants: vec![grant("episodios", "borrar", "own")],
            },
        )
        .await
    else {
        panic!("role creation should succeed");
    };

    let ver = grant("episodios", "ver", "tenant");
    let citas = grant("citas", "ver", "tenant");
    let (first, second) = tokio::join!(
        repository.add_role_grant(tenant_id, role.role_id(), &ver),
        repository.add_role_grant(tenant_id, role.role_id(), &citas),
    );
    assert!(first.is_ok() && second.is_ok());

    let removed = repository
        .remove_role_grant(tenant_id, role.role_id(), &grant("episodios", "borrar", "own"))
        .await;
    assert!(removed.is_ok());

    let reloaded = repository
        .find_role(tenant_id, role.role_id())
        .await
        .ok()
        .flatten();
    assert!(reloaded.is_some_and(|role| {
        role.grants().len() == 2 && role.grants().contains(&ver) && role.grants().contains(&citas)
    }));
}

#[tokio::test]
async fn delete_role_conflicts_while_assigned() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let tenant_id = TenantId::new();
    let Ok(role) = repository
        .create_role(
            tenant_id,
            CreateRoleInput {
                name: "Recepcion".to_owned(),
                grants: Vec::new(),
            },
        )
        .await
    else {
        panic!("role creation should succeed");
    };
    assert!(
        repository
            .assign_role(tenant_id, "recepcion-1", role.role_id())
            .await
            .is_ok()
    );

    let in_use = repository.delete_role(tenant_id, role.role_id()).await;
    assert!(matches!(in_use, Err(AppError::Conflict(_))));

    assert!(repository.unassign_role(tenant_id, "recepcion-1").await.is_ok());
    assert!(repository.delete_role(tenant_id, role.role_id()).await.is_ok());
}

#[tokio::test]
async fn malformed_role_id_is_rejected_before_querying() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let result = repository.find_role(TenantId::new(), "not-a-uuid").await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}
