use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use time::Duration;
use tower_sessions::{Expiry, Session};
use tracing::{error, info, warn};

use crate::flash::{redirect_with, Flash};
use crate::identity::{IdentityError, IdentityService};
use crate::session::models::{LoginForm, UserSession, SESSION_USER_KEY};
use crate::templates::{render, ForbiddenTemplate};
use crate::AppState;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub title: String,
    pub flash: Flash,
}

pub async fn login_handler(session: Session) -> Html<String> {
    let template = LoginTemplate {
        title: "Login - Cpanel".to_string(),
        flash: Flash::take(&session).await,
    };

    render(&template)
}

pub async fn login_user(
    session: Session,
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    let identity = IdentityService::new(state.db.clone());

    let user = match identity.authenticate(&form.email, &form.password).await {
        Ok(user) => user,
        Err(
            e @ (IdentityError::InvalidCredentials
            | IdentityError::NotActivated
            | IdentityError::Banned),
        ) => {
            warn!("Rejected login for {}: {}", form.email, e);
            return redirect_with(&session, Flash::error(e.to_string()), "/login").await;
        }
        Err(e) => {
            error!("Login failed for {}: {}", form.email, e);
            return redirect_with(
                &session,
                Flash::error(state.config.messages.unexpected_error.clone()),
                "/login",
            )
            .await;
        }
    };

    let permissions = match identity.merged_permissions(user.id).await {
        Ok(permissions) => permissions.granted(),
        Err(e) => {
            error!("Failed to load permissions of user {}: {}", user.id, e);
            return redirect_with(
                &session,
                Flash::error(state.config.messages.unexpected_error.clone()),
                "/login",
            )
            .await;
        }
    };

    // Default: 24 hours, remember me: 5 days
    let expiry = if form.remember_me() {
        Duration::hours(120)
    } else {
        Duration::hours(24)
    };
    session.set_expiry(Some(Expiry::OnInactivity(expiry)));

    if let Err(e) = session.cycle_id().await {
        warn!("Failed to rotate session id: {}", e);
    }

    if let Err(e) = session
        .insert(SESSION_USER_KEY, UserSession::new(&user, permissions))
        .await
    {
        error!("Failed to create session: {}", e);
        return redirect_with(
            &session,
            Flash::error(state.config.messages.unexpected_error.clone()),
            "/login",
        )
        .await;
    }

    info!("User {} logged in", user.id);
    Redirect::to("/users").into_response()
}

pub async fn logout_user(session: Session) -> Response {
    end_session(&session).await
}

pub async fn current_user(session: &Session) -> Option<UserSession> {
    match session.get::<UserSession>(SESSION_USER_KEY).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Failed to read session user: {}", e);
            None
        }
    }
}

/// The signed-in administrator, or the response that turns the request away.
///
/// The account is loaded again on every request, so deactivating or deleting
/// a user ends their open sessions and permission changes apply at once.
pub async fn require_admin(session: &Session, state: &AppState) -> Result<UserSession, Response> {
    let signed_in = current_user(session)
        .await
        .ok_or_else(|| Redirect::to("/login").into_response())?;

    let identity = IdentityService::new(state.db.clone());
    let user = match identity.find_user_by_id(signed_in.user_id).await {
        Ok(user) if user.activated => user,
        Ok(_) | Err(IdentityError::UserNotFound { .. }) => {
            warn!("Ending session of user {}: account is gone or inactive", signed_in.user_id);
            return Err(end_session(session).await);
        }
        Err(e) => return Err(unexpected_error(state, e)),
    };

    let permissions = match identity.merged_permissions(user.id).await {
        Ok(permissions) => permissions.granted(),
        Err(e) => return Err(unexpected_error(state, e)),
    };

    let current = UserSession::new(&user, permissions);
    if !current.is_admin() {
        let template = ForbiddenTemplate {
            title: "Access denied - Cpanel".to_string(),
            user_name: current.display_name.clone(),
        };
        return Err((StatusCode::FORBIDDEN, render(&template)).into_response());
    }

    Ok(current)
}

async fn end_session(session: &Session) -> Response {
    if let Err(e) = session.flush().await {
        warn!("Failed to clear session: {}", e);
    }

    Redirect::to("/login").into_response()
}

fn unexpected_error(state: &AppState, e: IdentityError) -> Response {
    error!("Failed to load the signed-in user: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        state.config.messages.unexpected_error.clone(),
    )
        .into_response()
}
