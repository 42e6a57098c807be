use chrono::NaiveDateTime;
use serde::Serialize;
use std::str::FromStr;

use super::{Claims, Role};
use crate::error::AppError;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub callsign: Option<String>,
    pub role: Role,
    pub created_at: Option<NaiveDateTime>,
}

impl User {
    /// Name shown for this user in exports and rosters.
    pub fn display_callsign(&self) -> &str {
        match self.callsign.as_deref() {
            Some(callsign) if !callsign.is_empty() => callsign,
            _ => &self.username,
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub callsign: Option<String>,
    pub role: String,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        Ok(Self {
            id: user.id,
            username: user.username,
            callsign: user.callsign,
            role: Role::from_str(&user.role)
                .map_err(|_| AppError::Internal(format!("Stored role '{}' is invalid", user.role)))?,
            created_at: user.created_at,
        })
    }
}

/// The caller of an authenticated request, as described by their token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            username: claims.username,
            role: claims.role,
        }
    }
}
