use axum::{
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tower_sessions::{cookie::time, Expiry, SessionManagerLayer};
use tower_sessions_rusqlite_store::{tokio_rusqlite, RusqliteStore};
use tracing::warn;

pub mod admin;
pub mod config;
pub mod database;
pub mod flash;
pub mod identity;
pub mod session;
pub mod templates;

pub use config::AppConfig;
pub use database::Database;

use admin::users::{
    activate_user, ban_user, create_user, deactivate_user, delete_user, edit_user_form,
    list_users, new_user_form, show_user, unban_user, update_user,
};
use session::{login_handler, login_user, logout_user};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<AppConfig>,
    pub session_store: RusqliteStore,
}

impl AppState {
    /// Opens and migrates the database, and puts the session table next to
    /// the application tables.
    pub async fn new(config: Arc<AppConfig>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let db = Arc::new(Database::new(&config.database_url).await?);
        db.migrate().await?;

        let session_conn = tokio_rusqlite::Connection::open(db.path()).await?;
        let session_store = RusqliteStore::new(session_conn);
        session_store.migrate().await?;

        Ok(Self {
            db,
            config,
            session_store,
        })
    }
}

pub fn create_router(app_state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(app_state.session_store.clone())
        .with_secure(app_state.config.environment == "production")
        .with_expiry(Expiry::OnInactivity(time::Duration::days(1)));

    Router::new()
        .route("/", get(|| async { Redirect::to("/users") }))
        .route("/health", get(health_handler))
        .route("/login", get(login_handler).post(login_user))
        .route("/logout", post(logout_user))
        .route("/users", get(list_users).post(create_user))
        .route("/users/create", get(new_user_form))
        .route(
            "/users/:id",
            get(show_user)
                .put(update_user)
                .patch(update_user)
                .post(update_user)
                .delete(delete_user),
        )
        .route("/users/:id/edit", get(edit_user_form))
        // HTML forms can only GET and POST
        .route("/users/:id/delete", post(delete_user))
        .route("/users/:id/activate", put(activate_user).post(activate_user))
        .route("/users/:id/deactivate", put(deactivate_user).post(deactivate_user))
        .route("/users/:id/ban", put(ban_user).post(ban_user))
        .route("/users/:id/unban", put(unban_user).post(unban_user))
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(session_layer)
                .layer(CompressionLayer::new()),
        )
}

async fn health_handler(State(state): State<AppState>) -> Result<&'static str, StatusCode> {
    match state.db.health_check().await {
        Ok(_) => Ok("OK"),
        Err(e) => {
            warn!("Health check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
