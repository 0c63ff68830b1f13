use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::company::CompanyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Closed role enumeration. Routing never matches on free-text role strings;
/// the "submitter's manager" sentinel is a separate `StepApprover` variant,
/// not a role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
    Finance,
    Director,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
            Self::Finance => "finance",
            Self::Director => "director",
        }
    }

    /// Roles that see every pending expense in their company, not just the
    /// ones currently waiting on them.
    pub fn has_company_wide_visibility(&self) -> bool {
        matches!(self, Self::Admin | Self::Finance | Self::Director)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}` (expected admin|manager|employee|finance|director)")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "employee" => Ok(Self::Employee),
            "finance" => Ok(Self::Finance),
            "director" => Ok(Self::Director),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A member of a company. `password_hash` is an opaque credential managed by
/// the auth layer; it must never appear in logs, so `Debug` redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub company_id: CompanyId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: String,
    pub role: Role,
    pub manager_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("company_id", &self.company_id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("manager_id", &self.manager_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}
