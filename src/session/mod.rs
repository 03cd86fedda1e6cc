pub mod handlers;
pub mod models;

// Re-export commonly used items
pub use handlers::{current_user, login_handler, login_user, logout_user, require_admin};
pub use models::{LoginForm, UserSession, ADMIN_PERMISSIONS, SESSION_USER_KEY};
