//! One-shot messages carried across a redirect in the session.

use axum::response::{IntoResponse, Redirect, Response};
use http::{HeaderMap, Uri};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::warn;

use crate::identity::FieldErrors;

const FLASH_KEY: &str = "_flash";

/// Submitted fields that are never echoed back into a form.
const SECRET_FIELDS: [&str; 2] = ["password", "password_confirmation"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flash {
    pub success: Option<String>,
    pub error: Option<String>,
    pub input: Vec<(String, String)>,
    pub errors: FieldErrors,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Submitted input and field errors for the form to show again.
    pub fn invalid_input(input: &[(String, String)], errors: FieldErrors) -> Self {
        let input = input
            .iter()
            .filter(|(key, _)| !SECRET_FIELDS.contains(&key.as_str()))
            .cloned()
            .collect();

        Self {
            input,
            errors,
            ..Self::default()
        }
    }

    /// Previously submitted value of a single-valued field.
    pub fn old(&self, field: &str) -> String {
        self.input
            .iter()
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }

    pub fn success_message(&self) -> &str {
        self.success.as_deref().unwrap_or_default()
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }

    /// First validation message of `field`, empty when it passed.
    pub fn error_for(&self, field: &str) -> &str {
        self.errors.first(field).unwrap_or_default()
    }

    /// Stores the flash for the next request.
    pub async fn put(self, session: &Session) {
        if let Err(e) = session.insert(FLASH_KEY, self).await {
            warn!("Failed to store flash message: {}", e);
        }
    }

    /// Removes and returns the pending flash, so it is only ever shown once.
    pub async fn take(session: &Session) -> Flash {
        match session.remove::<Flash>(FLASH_KEY).await {
            Ok(flash) => flash.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read flash message: {}", e);
                Flash::default()
            }
        }
    }
}

/// Stores `flash` and redirects to `to`.
pub async fn redirect_with(session: &Session, flash: Flash, to: &str) -> Response {
    flash.put(session).await;
    Redirect::to(to).into_response()
}

/// The page the request came from, limited to a local path, or `fallback`.
pub fn back(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(http::header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|referer| referer.parse::<Uri>().ok())
        .and_then(|uri| {
            uri.path_and_query()
                .map(|path| path.as_str().to_string())
                .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        })
        .unwrap_or_else(|| fallback.to_string())
}
