use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use permisos_core::{AppError, TenantId};
use permisos_infrastructure::PostgrestConfig;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;
const MIN_GATEWAY_SECRET_LEN: usize = 32;

/// Where role lookups and role administration are served from.
#[derive(Debug, Clone)]
pub enum PermissionBackendConfig {
    /// PostgreSQL for both lookups and administration.
    Postgres { database_url: String },
    /// PostgREST for lookups, PostgreSQL for administration.
    Postgrest {
        database_url: String,
        postgrest: PostgrestConfig,
    },
    /// Process-local store, empty at startup.
    Memory,
}

impl PermissionBackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::Postgrest { .. } => "postgrest",
            Self::Memory => "memory",
        }
    }

    pub fn database_url(&self) -> Option<&str> {
        match self {
            Self::Postgres { database_url } | Self::Postgrest { database_url, .. } => {
                Some(database_url.as_str())
            }
            Self::Memory => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub backend: PermissionBackendConfig,
    pub fetch_timeout: Duration,
    pub gateway_shared_secret: String,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Subject granted the administrator role at startup.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub tenant_id: TenantId,
    pub subject: String,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(migrate_only, |name| env::var(name).ok())
    }

    pub fn from_lookup(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let fetch_timeout_ms = match lookup("PERMISSION_FETCH_TIMEOUT_MS") {
            Some(value) => value.trim().parse::<u64>().map_err(|error| {
                AppError::Validation(format!("invalid PERMISSION_FETCH_TIMEOUT_MS: {error}"))
            })?,
            None => DEFAULT_FETCH_TIMEOUT_MS,
        };
        if fetch_timeout_ms == 0 {
            return Err(AppError::Validation(
                "PERMISSION_FETCH_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }
        let fetch_timeout = Duration::from_millis(fetch_timeout_ms);

        let backend = match lookup("PERMISSION_BACKEND")
            .unwrap_or_else(|| "postgres".to_owned())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => PermissionBackendConfig::Postgres {
                database_url: required_non_empty(&lookup, "DATABASE_URL")?,
            },
            "postgrest" => {
                let base_url = required_non_empty(&lookup, "POSTGREST_URL")?;
                let base_url = Url::parse(base_url.as_str()).map_err(|error| {
                    AppError::Validation(format!("invalid POSTGREST_URL: {error}"))
                })?;

                PermissionBackendConfig::Postgrest {
                    database_url: required_non_empty(&lookup, "DATABASE_URL")?,
                    postgrest: PostgrestConfig {
                        base_url,
                        api_key: required_non_empty(&lookup, "POSTGREST_API_KEY")?,
                        request_timeout: fetch_timeout,
                    },
                }
            }
            "memory" => PermissionBackendConfig::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "PERMISSION_BACKEND must be 'postgres', 'postgrest' or 'memory', got '{other}'"
                )));
            }
        };

        let gateway_shared_secret = if migrate_only {
            lookup("GATEWAY_SHARED_SECRET").unwrap_or_default()
        } else {
            let secret = required_non_empty(&lookup, "GATEWAY_SHARED_SECRET")?;
            if secret.len() < MIN_GATEWAY_SECRET_LEN {
                return Err(AppError::Validation(format!(
                    "GATEWAY_SHARED_SECRET must be at least {MIN_GATEWAY_SECRET_LEN} characters"
                )));
            }
            secret
        };

        let frontend_url =
            lookup("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_owned());
        let api_host = lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = lookup("API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let bootstrap_tenant_id = lookup("DEV_DEFAULT_TENANT_ID")
            .filter(|value| !value.trim().is_empty())
            .map(|value| TenantId::parse(value.as_str()))
            .transpose()?;
        let bootstrap_subject =
            lookup("DEV_ADMIN_SUBJECT").filter(|value| !value.trim().is_empty());
        let bootstrap_admin = match (bootstrap_tenant_id, bootstrap_subject) {
            (Some(tenant_id), Some(subject)) => Some(BootstrapAdmin {
                tenant_id,
                subject: subject.trim().to_owned(),
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Validation(
                    "DEV_DEFAULT_TENANT_ID and DEV_ADMIN_SUBJECT must be set together".to_owned(),
                ));
            }
        };

        Ok(Self {
            migrate_only,
            backend,
            fetch_timeout,
            gateway_shared_secret,
            frontend_url,
            api_host,
            api_port,
            bootstrap_admin,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_non_empty(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<String, AppError> {
    let value = lookup(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}
