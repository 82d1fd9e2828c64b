//! Users, roles and the claims carried in access tokens.

use serde::{Deserialize, Serialize};

/// Dashboard role of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Role::Owner),
            "manager" => Some(Role::Manager),
            "worker" => Some(Role::Worker),
            _ => None,
        }
    }

    /// Owners and managers review submissions and manage tasks.
    pub fn can_review(&self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }

    /// Whether this role may create an account with role `other`.
    pub fn can_create(&self, other: Role) -> bool {
        match self {
            Role::Owner => true,
            Role::Manager => other == Role::Worker,
            Role::Worker => false,
        }
    }

    /// Where a user of this role lands after their session is invalidated.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Role::Owner => "/login",
            Role::Manager => "/manager/login",
            Role::Worker => "/worker/login",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

/// Claims embedded in a farmdesk access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id, as a decimal string
    pub sub: String,
    /// Display name
    pub name: String,
    pub role: Role,
    /// Issued-at unix seconds
    pub iat: i64,
    /// Expiration unix seconds
    pub exp: i64,
}

impl TokenClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}
