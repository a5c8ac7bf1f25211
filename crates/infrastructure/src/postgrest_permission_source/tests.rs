use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::RawQuery;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use permisos_application::PermissionSource;
use permisos_core::{AppError, TenantId};
use serde_json::{Value, json};
use url::Url;

use super::{PostgrestConfig, PostgrestPermissionSource};

const API_KEY: &str = "service-role-key";

async fn spawn_mock(router: Router) -> Url {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(error) => panic!("failed to bind mock PostgREST listener: {error}"),
    };
    let address = match listener.local_addr() {
        Ok(address) => address,
        Err(error) => panic!("failed to read mock PostgREST address: {error}"),
    };

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    match Url::parse(format!("http://{address}/rest/v1").as_str()) {
        Ok(url) => url,
        Err(error) => panic!("invalid mock url: {error}"),
    }
}

fn source(base_url: Url, request_timeout: Duration) -> PostgrestPermissionSource {
    PostgrestPermissionSource::new(PostgrestConfig {
        base_url,
        api_key: API_KEY.to_owned(),
        request_timeout,
    })
    .unwrap_or_else(|error| panic!("{error}"))
}

fn is_authorized(headers: &HeaderMap) -> bool {
    let apikey = headers.get("apikey").and_then(|value| value.to_str().ok());
    let bearer = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok());
    apikey == Some(API_KEY) && bearer == Some(format!("Bearer {API_KEY}").as_str())
}

#[tokio::test]
async fn embedded_role_is_mapped_with_grants_in_position_order() {
    let tenant_id = TenantId::new();
    let role_id = uuid::Uuid::new_v4();
    let body = json!([{
        "role_id": role_id,
        "rbac_roles": {
            "id": role_id,
            "name": "Medico",
            "tenant_id": tenant_id.as_uuid(),
            "rbac_role_grants": [
                { "position": 1, "module": "episodios", "action": "editar", "scope": "own" },
                { "position": 0, "module": "episodios", "action": "ver", "scope": "tenant" }
            ]
        }
    }]);

    let router = Router::new().route(
        "/rest/v1/rbac_subject_roles",
        get(move |headers: HeaderMap, RawQuery(query): RawQuery| {
            let body = body.clone();
            async move {
                let query = query.unwrap_or_default();
                if !is_authorized(&headers)
                    || !query.contains("subject=eq.dra-lopez")
                    || !query.contains("select=")
                {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                (StatusCode::OK, Json(body))
            }
        }),
    );
    let base_url = spawn_mock(router).await;

    let record = source(base_url, Duration::from_secs(2))
        .find_role_for_subject(tenant_id, "dra-lopez")
        .await;
    assert!(record.as_ref().is_ok_and(|record| record.is_some()));
    let Ok(Some(record)) = record else {
        return;
    };

    assert_eq!(record.role_id, role_id.to_string());
    assert_eq!(record.tenant_id, tenant_id);
    assert_eq!(record.grants.len(), 2);
    assert_eq!(record.grants[0].action, "ver");
    assert_eq!(record.grants[1].scope, "own");
}

#[tokio::test]
async fn empty_result_means_no_role() {
    let router = Router::new().route(
        "/rest/v1/rbac_subject_roles",
        get(|| async { Json(Value::Array(Vec::new())) }),
    );
    let base_url = spawn_mock(router).await;

    let record = source(base_url, Duration::from_secs(2))
        .find_role_for_subject(TenantId::new(), "sin-rol")
        .await;
    assert!(matches!(record, Ok(None)));
}

#[tokio::test]
async fn error_status_is_reported_as_transport() {
    let router = Router::new().route(
        "/rest/v1/rbac_subject_roles",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "message": "down" }))) }),
    );
    let base_url = spawn_mock(router).await;

    let record = source(base_url, Duration::from_secs(2))
        .find_role_for_subject(TenantId::new(), "dra-lopez")
        .await;
    assert!(matches!(record, Err(AppError::Transport(_))));
}

#[tokio::test]
async fn slow_backend_times_out_as_transport() {
    let router = Router::new().route(
        "/rest/v1/rbac_subject_roles",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Json(Value::Array(Vec::new()))
        }),
    );
    let base_url = spawn_mock(router).await;

    let record = source(base_url, Duration::from_millis(50))
        .find_role_for_subject(TenantId::new(), "dra-lopez")
        .await;
    assert!(matches!(record, Err(AppError::Transport(_))));
}

#[test]
fn base_url_without_trailing_slash_keeps_rest_prefix() {
    let base_url = Url::parse("https://project.supabase.co/rest/v1")
        .unwrap_or_else(|error| panic!("{error}"));
    let source = source(base_url, Duration::from_secs(1));

    assert_eq!(
        source.subject_roles_url.as_str(),
        "https://project.supabase.co/rest/v1/rbac_subject_roles"
    );
}
