use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Roles a user can sign in with. Carried in the `aud` claim of every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Board categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BoardsCode {
    Notice,
    Faq,
    Post,
}

impl BoardsCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardsCode::Notice => "NOTICE",
            BoardsCode::Faq => "FAQ",
            BoardsCode::Post => "POST",
        }
    }
}

impl fmt::Display for BoardsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardsCode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOTICE" => Ok(BoardsCode::Notice),
            "FAQ" => Ok(BoardsCode::Faq),
            "POST" => Ok(BoardsCode::Post),
            other => Err(UnknownVariant {
                kind: "boards code",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// A verified user, as resolved from the users table.
///
/// Also embedded in access tokens as an issuance-time snapshot; the password
/// hash never leaves the database layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub seq: i64,
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}
