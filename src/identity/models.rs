use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identity::permissions::PermissionSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub permissions: PermissionSet,
    pub activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// First and last name when known, the email otherwise.
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }

    pub fn status(&self) -> &str {
        if self.activated {
            "Active"
        } else {
            "Inactive"
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
}

/// Failed-login bookkeeping for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Throttle {
    pub id: i64,
    pub user_id: i64,
    pub attempts: i64,
    /// Set by the login throttling policy, which lives outside this panel;
    /// the panel only reports it.
    pub suspended: bool,
    pub banned: bool,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub banned_at: Option<DateTime<Utc>>,
}

impl Throttle {
    pub fn status(&self) -> &str {
        if self.banned {
            "Banned"
        } else if self.suspended {
            "Suspended"
        } else {
            "Normal"
        }
    }
}

/// Submitted user fields other than group membership. Values are kept as
/// submitted and checked by the identity service.
#[derive(Debug, Clone, Default)]
pub struct UserCredentials {
    pub email: String,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Raw `permissions[<key>]` values.
    pub permissions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    pub credentials: UserCredentials,
    pub groups: Vec<String>,
    pub activate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub id: i64,
    pub credentials: UserCredentials,
    pub groups: Vec<String>,
}
