use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server_address: String,
    pub database_url: String,
    pub environment: String,
    #[serde(default)]
    pub messages: Messages,
}

/// User-facing flash messages for the user administration actions.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Messages {
    pub create_success: String,
    pub update_success: String,
    pub delete_success: String,
    pub delete_denied: String,
    pub deactivate_denied: String,
    pub ban_denied: String,
    pub activation_success: String,
    pub activation_fail: String,
    pub deactivation_success: String,
    pub ban_success: String,
    pub unban_success: String,
    pub unexpected_error: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let env = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific configuration
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Add local configuration (for development overrides)
            .add_source(File::with_name("config/local").required(false))
            // CPANEL_DATABASE_URL, CPANEL_MESSAGES__ACTIVATION_FAIL, ...
            .add_source(Environment::with_prefix("CPANEL").separator("__"))
            .build()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

        Ok(s.try_deserialize()?)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:3000".to_string(),
            database_url: "sqlite:data/cpanel.db".to_string(),
            environment: "development".to_string(),
            messages: Messages::default(),
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            create_success: "User created successfully.".to_string(),
            update_success: "User updated successfully.".to_string(),
            delete_success: "User deleted successfully.".to_string(),
            delete_denied: "You cannot delete yourself.".to_string(),
            deactivate_denied: "You cannot deactivate yourself.".to_string(),
            ban_denied: "You cannot ban yourself.".to_string(),
            activation_success: "User activated successfully.".to_string(),
            activation_fail: "User activation failed.".to_string(),
            deactivation_success: "User deactivated successfully.".to_string(),
            ban_success: "User banned successfully.".to_string(),
            unban_success: "User unbanned successfully.".to_string(),
            unexpected_error: "Something went wrong, please try again.".to_string(),
        }
    }
}
