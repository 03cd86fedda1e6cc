use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use tower_sessions::Session;
use tracing::{error, info, warn};

use crate::admin::users::models::{
    selected_group_ids, GroupOption, PermissionGroupView, PermissionRow, ThrottleRow, UserInput,
    UserRow,
};
use crate::admin::users::templates::{
    UserCreateTemplate, UserEditTemplate, UserShowTemplate, UsersIndexTemplate,
};
use crate::flash::{back, redirect_with, Flash};
use crate::identity::{
    Group, IdentityError, IdentityResult, IdentityService, PermissionModule, PermissionSet,
    Throttle, User,
};
use crate::session::require_admin;
use crate::templates::render;
use crate::AppState;

const USERS_INDEX: &str = "/users";

/// Both arms are complete responses; `Err` is used for requests turned
/// away before the action runs.
type HandlerResult = Result<Response, Response>;

/// Whether an action targets the signed-in administrator's own account.
fn is_self(current_user_id: i64, target_id: i64) -> bool {
    current_user_id == target_id
}

fn parse_user_id(raw: &str) -> IdentityResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| IdentityError::UnknownUserId { id: raw.to_string() })
}

/// Redirects to the listing with the lookup error, or with a generic
/// message for infrastructure failures.
async fn identity_failure(session: &Session, state: &AppState, e: IdentityError) -> Response {
    let message = if e.is_not_found() {
        warn!("{}", e);
        e.to_string()
    } else {
        error!("Identity service failure: {}", e);
        state.config.messages.unexpected_error.clone()
    };

    redirect_with(session, Flash::error(message), USERS_INDEX).await
}

pub async fn list_users(session: Session, State(state): State<AppState>) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;

    let identity = IdentityService::new(state.db.clone());
    let users = identity.find_all_users().await.map_err(|e| {
        error!("Failed to list users: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            state.config.messages.unexpected_error.clone(),
        )
            .into_response()
    })?;

    let template = UsersIndexTemplate {
        title: "Users - Cpanel".to_string(),
        admin_name: admin.display_name,
        current_user_id: admin.user_id,
        users: users.iter().map(UserRow::from).collect(),
        flash: Flash::take(&session).await,
    };

    Ok(render(&template).into_response())
}

async fn load_profile(
    identity: &IdentityService,
    id: i64,
) -> IdentityResult<(User, Throttle, PermissionSet)> {
    let throttle = identity.get_throttle(id).await?;
    let user = identity.find_user_by_id(throttle.user_id).await?;
    let permissions = identity.merged_permissions(user.id).await?;

    Ok((user, throttle, permissions))
}

pub async fn show_user(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    let identity = IdentityService::new(state.db.clone());
    let (user, throttle, permissions) = match load_profile(&identity, id).await {
        Ok(profile) => profile,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    let template = UserShowTemplate {
        title: format!("{} - Cpanel", user.display_name()),
        admin_name: admin.display_name,
        user: UserRow::from(&user),
        throttle: ThrottleRow::from(&throttle),
        permissions: PermissionRow::build(&permissions),
        flash: Flash::take(&session).await,
    };

    Ok(render(&template).into_response())
}

async fn load_catalog(
    identity: &IdentityService,
) -> IdentityResult<(Vec<Group>, Vec<PermissionModule>, Vec<PermissionModule>)> {
    let groups = identity.find_all_groups().await?;
    let generic = identity.generic_permissions().await?;
    let modules = identity.module_permissions().await?;

    Ok((groups, generic, modules))
}

pub async fn new_user_form(session: Session, State(state): State<AppState>) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;

    let identity = IdentityService::new(state.db.clone());
    let (groups, generic, modules) = match load_catalog(&identity).await {
        Ok(catalog) => catalog,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    let flash = Flash::take(&session).await;
    let no_permissions = PermissionSet::new();

    let template = UserCreateTemplate {
        title: "Create user - Cpanel".to_string(),
        admin_name: admin.display_name,
        email: flash.old("email"),
        first_name: flash.old("first_name"),
        last_name: flash.old("last_name"),
        activate: matches!(flash.old("activate").as_str(), "1" | "on" | "true"),
        groups: GroupOption::build(&groups, &selected_group_ids(&flash, &[])),
        generic_permissions: PermissionGroupView::build(&generic, &no_permissions, &flash)
            .into_iter()
            .flat_map(|view| view.choices)
            .collect(),
        module_permissions: PermissionGroupView::build(&modules, &no_permissions, &flash),
        flash,
    };

    Ok(render(&template).into_response())
}

struct EditFormData {
    user: User,
    groups: Vec<Group>,
    user_group_ids: Vec<i64>,
    generic: Vec<PermissionModule>,
    modules: Vec<PermissionModule>,
}

async fn load_edit_form(identity: &IdentityService, id: i64) -> IdentityResult<EditFormData> {
    let user = identity.find_user_by_id(id).await?;
    let (groups, generic, modules) = load_catalog(identity).await?;

    // Only the ids of the groups the user belongs to
    let user_group_ids = identity
        .find_user_groups(user.id)
        .await?
        .iter()
        .map(|group| group.id)
        .collect();

    Ok(EditFormData {
        user,
        groups,
        user_group_ids,
        generic,
        modules,
    })
}

pub async fn edit_user_form(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    let identity = IdentityService::new(state.db.clone());
    let data = match load_edit_form(&identity, id).await {
        Ok(data) => data,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    let flash = Flash::take(&session).await;
    let user_permissions = &data.user.permissions;
    let resubmitted = !flash.input.is_empty();
    let field = |name: &str, current: Option<&str>| {
        if resubmitted {
            flash.old(name)
        } else {
            current.unwrap_or_default().to_string()
        }
    };

    let template = UserEditTemplate {
        title: format!("Edit {} - Cpanel", data.user.display_name()),
        admin_name: admin.display_name,
        user: UserRow::from(&data.user),
        email: field("email", Some(data.user.email.as_str())),
        first_name: field("first_name", data.user.first_name.as_deref()),
        last_name: field("last_name", data.user.last_name.as_deref()),
        groups: GroupOption::build(
            &data.groups,
            &selected_group_ids(&flash, &data.user_group_ids),
        ),
        user_group_ids: data.user_group_ids.clone(),
        generic_permissions: PermissionGroupView::build(&data.generic, user_permissions, &flash)
            .into_iter()
            .flat_map(|view| view.choices)
            .collect(),
        module_permissions: PermissionGroupView::build(&data.modules, user_permissions, &flash),
        flash,
    };

    Ok(render(&template).into_response())
}

pub async fn create_user(
    session: Session,
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;

    let input = UserInput::new(pairs);
    let identity = IdentityService::new(state.db.clone());

    let response = match identity.create_user(input.create_command()).await {
        Ok(user) => {
            info!("User {} created by user {}", user.id, admin.user_id);
            redirect_with(
                &session,
                Flash::success(state.config.messages.create_success.clone()),
                USERS_INDEX,
            )
            .await
        }
        Err(IdentityError::Validation(errors)) => {
            redirect_with(
                &session,
                Flash::invalid_input(input.pairs(), errors),
                &back(&headers, "/users/create"),
            )
            .await
        }
        Err(e) => identity_failure(&session, &state, e).await,
    };

    Ok(response)
}

pub async fn update_user(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    let input = UserInput::new(pairs);
    let identity = IdentityService::new(state.db.clone());

    let response = match identity.update_user(input.update_command(id)).await {
        Ok(user) => {
            info!("User {} updated by user {}", user.id, admin.user_id);
            redirect_with(
                &session,
                Flash::success(state.config.messages.update_success.clone()),
                USERS_INDEX,
            )
            .await
        }
        Err(IdentityError::Validation(errors)) => {
            redirect_with(
                &session,
                Flash::invalid_input(input.pairs(), errors),
                &back(&headers, &format!("/users/{}/edit", id)),
            )
            .await
        }
        Err(e) => identity_failure(&session, &state, e).await,
    };

    Ok(response)
}

pub async fn delete_user(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    if is_self(admin.user_id, id) {
        warn!("User {} tried to delete their own account", admin.user_id);
        return Ok(redirect_with(
            &session,
            Flash::error(state.config.messages.delete_denied.clone()),
            &back(&headers, USERS_INDEX),
        )
        .await);
    }

    let identity = IdentityService::new(state.db.clone());
    let response = match identity.delete_user(id).await {
        Ok(()) => {
            info!("User {} deleted by user {}", id, admin.user_id);
            redirect_with(
                &session,
                Flash::success(state.config.messages.delete_success.clone()),
                USERS_INDEX,
            )
            .await
        }
        Err(e) => identity_failure(&session, &state, e).await,
    };

    Ok(response)
}

pub async fn deactivate_user(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    if is_self(admin.user_id, id) {
        warn!("User {} tried to deactivate their own account", admin.user_id);
        return Ok(redirect_with(
            &session,
            Flash::error(state.config.messages.deactivate_denied.clone()),
            &back(&headers, USERS_INDEX),
        )
        .await);
    }

    let identity = IdentityService::new(state.db.clone());
    let response = match identity.deactivate_user(id).await {
        Ok(()) => {
            info!("User {} deactivated by user {}", id, admin.user_id);
            redirect_with(
                &session,
                Flash::success(state.config.messages.deactivation_success.clone()),
                USERS_INDEX,
            )
            .await
        }
        Err(e) => identity_failure(&session, &state, e).await,
    };

    Ok(response)
}

pub async fn activate_user(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    let identity = IdentityService::new(state.db.clone());
    let flash = match identity.activate_user(id).await {
        Ok(true) => {
            info!("User {} activated by user {}", id, admin.user_id);
            Flash::success(state.config.messages.activation_success.clone())
        }
        Ok(false) => {
            warn!("Activation of user {} was refused", id);
            Flash::error(state.config.messages.activation_fail.clone())
        }
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    Ok(redirect_with(&session, flash, USERS_INDEX).await)
}

pub async fn ban_user(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    if is_self(admin.user_id, id) {
        warn!("User {} tried to ban their own account", admin.user_id);
        return Ok(redirect_with(
            &session,
            Flash::error(state.config.messages.ban_denied.clone()),
            &back(&headers, USERS_INDEX),
        )
        .await);
    }

    set_banned(session, state, admin.user_id, id, true).await
}

pub async fn unban_user(
    session: Session,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> HandlerResult {
    let admin = require_admin(&session, &state).await?;
    let id = match parse_user_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(identity_failure(&session, &state, e).await),
    };

    set_banned(session, state, admin.user_id, id, false).await
}

async fn set_banned(
    session: Session,
    state: AppState,
    admin_id: i64,
    id: i64,
    banned: bool,
) -> HandlerResult {
    let identity = IdentityService::new(state.db.clone());
    let response = match identity.set_banned(id, banned).await {
        Ok(_) => {
            let message = if banned {
                &state.config.messages.ban_success
            } else {
                &state.config.messages.unban_success
            };
            info!("User {} banned={} by user {}", id, banned, admin_id);
            redirect_with(&session, Flash::success(message.clone()), USERS_INDEX).await
        }
        Err(e) => identity_failure(&session, &state, e).await,
    };

    Ok(response)
}
