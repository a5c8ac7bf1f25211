use std::fmt::{Display, Formatter};
use std::str::FromStr;

use permisos_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Identifier matching every module or every action.
pub const WILDCARD: &str = "*";

const IDENTIFIER_MAX_LENGTH: usize = 64;

/// ERP module a grant applies to, such as `episodios` or `inventario`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId(String);

/// Action a grant allows inside a module, such as `ver` or `editar`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId(String);

macro_rules! identifier {
    ($name:ident, $kind:literal) => {
        impl $name {
            /// Creates a validated identifier; input is trimmed and lower-cased.
            pub fn new(value: impl AsRef<str>) -> AppResult<Self> {
                normalize_identifier($kind, value.as_ref()).map(Self)
            }

            /// Returns the wildcard identifier.
            #[must_use]
            pub fn wildcard() -> Self {
                Self(WILDCARD.to_owned())
            }

            /// Returns whether this identifier is the wildcard.
            #[must_use]
            pub fn is_wildcard(&self) -> bool {
                self.0 == WILDCARD
            }

            /// Returns the stable storage value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::new(value)
            }
        }

        impl TryFrom<String> for $name {
            type Error = AppError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                formatter.write_str(self.0.as_str())
            }
        }
    };
}

identifier!(ModuleId, "module");
identifier!(ActionId, "action");

fn normalize_identifier(kind: &str, value: &str) -> AppResult<String> {
    let normalized = value.trim().to_ascii_lowercase();

    if normalized.is_empty() {
        return Err(AppError::Validation(format!(
            "{kind} identifier must not be empty"
        )));
    }

    if normalized == WILDCARD {
        return Ok(normalized);
    }

    if normalized.len() > IDENTIFIER_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "{kind} identifier '{normalized}' exceeds {IDENTIFIER_MAX_LENGTH} characters"
        )));
    }

    if !normalized
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-'))
    {
        return Err(AppError::Validation(format!(
            "{kind} identifier '{normalized}' may only contain a-z, 0-9, '_' or '-'"
        )));
    }

    Ok(normalized)
}

/// Which records of a module a grant reaches.
///
/// Variants are ordered from narrowest to broadest, so `max` picks the
/// broader of two scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    /// Only records owned by the acting subject.
    Own,
    /// Every record of the acting subject's tenant.
    Tenant,
}

impl GrantScope {
    /// Returns a stable storage value for this scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Tenant => "tenant",
        }
    }

    /// Returns the broader of two scopes.
    #[must_use]
    pub fn broadest(self, other: Self) -> Self {
        self.max(other)
    }
}

impl FromStr for GrantScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "own" => Ok(Self::Own),
            "tenant" => Ok(Self::Tenant),
            _ => Err(AppError::Validation(format!(
                "unknown grant scope value '{value}'"
            ))),
        }
    }
}

impl Display for GrantScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A single `(module, action, scope)` permission unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    module: ModuleId,
    action: ActionId,
    scope: GrantScope,
}

impl Grant {
    /// Creates a grant from validated parts.
    #[must_use]
    pub fn new(module: ModuleId, action: ActionId, scope: GrantScope) -> Self {
        Self {
            module,
            action,
            scope,
        }
    }

    /// Parses a grant from raw backend values.
    pub fn parse(module: &str, action: &str, scope: &str) -> AppResult<Self> {
        Ok(Self::new(
            ModuleId::new(module)?,
            ActionId::new(action)?,
            GrantScope::from_str(scope)?,
        ))
    }

    /// Returns the module.
    #[must_use]
    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> &ActionId {
        &self.action
    }

    /// Returns the scope.
    #[must_use]
    pub fn scope(&self) -> GrantScope {
        self.scope
    }
}
