use serde::{Deserialize, Serialize};

use crate::identity::User;

pub const SESSION_USER_KEY: &str = "user";

/// Granted permissions that open the administration panel.
pub const ADMIN_PERMISSIONS: [&str; 2] = ["superuser", "cpanel.access"];

/// The authenticated user of a request, stored in the session at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: i64,
    pub email: String,
    pub display_name: String,
    /// Granted keys of the merged permission set at login time.
    pub permissions: Vec<String>,
}

impl UserSession {
    pub fn new(user: &User, permissions: Vec<String>) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            display_name: user.display_name(),
            permissions,
        }
    }

    pub fn has_access(&self, permission: &str) -> bool {
        self.permissions.iter().any(|granted| granted == permission)
    }

    pub fn is_admin(&self) -> bool {
        ADMIN_PERMISSIONS
            .iter()
            .any(|permission| self.has_access(permission))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: Option<String>,
}

impl LoginForm {
    /// Checkbox fields are only submitted when ticked.
    pub fn remember_me(&self) -> bool {
        matches!(self.remember.as_deref(), Some("1" | "on" | "true"))
    }
}
