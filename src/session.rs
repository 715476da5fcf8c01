//! Explicit session context.
//!
//! A `Session` carries the signed-in user and the bearer token. It is passed to
//! the API client, the dispatcher and the sync coordinator instead of living in
//! process-wide state, so independent sessions can coexist (e.g. two simulated
//! clients in one test).

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Campaign;

/// User role as assigned by the users service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Admin,
    BrandManager,
    LocationManager,
    #[default]
    Viewer,
}

impl Role {
    /// Roles allowed to approve or reject campaigns
    pub fn can_review(&self) -> bool {
        matches!(self, Role::Admin | Role::BrandManager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::BrandManager => "brand_manager",
            Role::LocationManager => "location_manager",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current user as returned by `auth/me/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct SessionUser {
    #[ts(type = "number")]
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    /// Brands the user belongs to (stringified ids)
    #[serde(default, deserialize_with = "de_brand_ids")]
    #[schemars(with = "Vec<String>")]
    pub brands: Vec<String>,
}

/// What the signed-in user may do to one particular campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authority {
    pub role: Role,
    /// The user created the campaign
    pub is_originator: bool,
    /// The user's role grants write access to the campaign's brand
    pub has_brand_write: bool,
}

impl Authority {
    /// Authority with no ownership and no brand access
    pub fn of_role(role: Role) -> Self {
        Self {
            role,
            is_originator: false,
            has_brand_write: role == Role::Admin,
        }
    }

    pub fn can_review(&self) -> bool {
        self.role.can_review()
    }

    /// Non-review actions: the originator or anyone with brand write access
    pub fn can_author(&self) -> bool {
        self.is_originator || self.has_brand_write
    }
}

struct SessionInner {
    user: SessionUser,
    access_token: String,
}

/// Cheaply cloneable session handle
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(user: SessionUser, access_token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                user,
                access_token: access_token.into(),
            }),
        }
    }

    pub fn user(&self) -> &SessionUser {
        &self.inner.user
    }

    pub fn user_id(&self) -> i64 {
        self.inner.user.id
    }

    pub fn role(&self) -> Role {
        self.inner.user.role
    }

    pub fn access_token(&self) -> &str {
        &self.inner.access_token
    }

    /// Whether the user's role grants write access to a brand
    pub fn can_write_brand(&self, brand: Option<&str>) -> bool {
        match self.role() {
            Role::Admin => true,
            Role::BrandManager | Role::LocationManager => brand
                .is_some_and(|brand| self.inner.user.brands.iter().any(|b| b == brand)),
            Role::Viewer => false,
        }
    }

    /// Resolve the user's authority over a campaign
    pub fn authority_for(&self, campaign: &Campaign) -> Authority {
        Authority {
            role: self.role(),
            is_originator: campaign.created_by == Some(self.user_id()),
            has_brand_write: self.can_write_brand(campaign.brand.as_deref()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.inner.user.username)
            .field("role", &self.inner.user.role)
            .finish_non_exhaustive()
    }
}

/// Brand ids arrive as UUID strings or integers depending on the serializer
fn de_brand_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, brands: &[&str]) -> SessionUser {
        SessionUser {
            id: 7,
            username: "pat".to_string(),
            email: "pat@example.com".to_string(),
            role,
            brands: brands.iter().map(|b| (*b).to_string()).collect(),
        }
    }

    #[test]
    fn test_brand_write_access() {
        let admin = Session::new(user(Role::Admin, &[]), "t");
        assert!(admin.can_write_brand(Some("b1")));
        assert!(admin.can_write_brand(None));

        let manager = Session::new(user(Role::BrandManager, &["b1"]), "t");
        assert!(manager.can_write_brand(Some("b1")));
        assert!(!manager.can_write_brand(Some("b2")));
        assert!(!manager.can_write_brand(None));

        let viewer = Session::new(user(Role::Viewer, &["b1"]), "t");
        assert!(!viewer.can_write_brand(Some("b1")));
    }

    #[test]
    fn test_sessions_are_independent() {
        let a = Session::new(user(Role::Admin, &[]), "token-a");
        let b = Session::new(user(Role::Viewer, &[]), "token-b");
        let a2 = a.clone();
        assert_eq!(a2.access_token(), "token-a");
        assert_eq!(b.access_token(), "token-b");
        assert_eq!(b.role(), Role::Viewer);
    }

    #[test]
    fn test_debug_hides_token() {
        let session = Session::new(user(Role::Admin, &[]), "secret-token");
        assert!(!format!("{session:?}").contains("secret-token"));
    }

    #[test]
    fn test_user_brand_ids_accept_numbers() {
        let parsed: SessionUser = serde_json::from_str(
            r#"{"id": 3, "username": "x", "role": "brand_manager", "brands": [1, "abc"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.brands, vec!["1".to_string(), "abc".to_string()]);
        assert_eq!(parsed.role, Role::BrandManager);
    }
}
