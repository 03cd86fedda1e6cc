#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use cpanel::{
    config::{AppConfig, Messages},
    identity::{CreateUser, IdentityService, User, UserCredentials},
    AppState,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "adminpass123";
pub const USER_PASSWORD: &str = "userpass123";

static DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Creates a test app with a fresh database for integration testing
pub async fn create_test_app() -> Router {
    let app_state = create_test_app_state().await;
    cpanel::create_router(app_state)
}

/// Creates a test app state with a unique temporary database
pub async fn create_test_app_state() -> AppState {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let counter = DB_COUNTER.fetch_add(1, Ordering::SeqCst);

    let test_db_path = std::env::temp_dir()
        .join(format!(
            "test_cpanel_{}_{}_{}.db",
            std::process::id(),
            timestamp,
            counter
        ))
        .to_string_lossy()
        .to_string();

    let config = Arc::new(AppConfig {
        server_address: "0.0.0.0:3000".to_string(),
        database_url: test_db_path,
        environment: "test".to_string(),
        messages: Messages::default(),
    });

    AppState::new(config).await.unwrap()
}

/// Creates a user through the identity service.
pub async fn create_user(
    app_state: &AppState,
    email: &str,
    activate: bool,
    permissions: &[(&str, &str)],
) -> User {
    let identity = IdentityService::new(app_state.db.clone());

    identity
        .create_user(CreateUser {
            credentials: UserCredentials {
                email: email.to_string(),
                password: Some(USER_PASSWORD.to_string()),
                password_confirmation: Some(USER_PASSWORD.to_string()),
                first_name: None,
                last_name: None,
                permissions: permissions
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            },
            groups: Vec::new(),
            activate,
        })
        .await
        .unwrap()
}

/// Creates an activated superuser and returns it with its session cookie.
pub async fn create_and_login_admin(app_state: &AppState) -> (User, String) {
    let identity = IdentityService::new(app_state.db.clone());
    let admin = identity
        .create_user(CreateUser {
            credentials: UserCredentials {
                email: ADMIN_EMAIL.to_string(),
                password: Some(ADMIN_PASSWORD.to_string()),
                password_confirmation: Some(ADMIN_PASSWORD.to_string()),
                first_name: Some("Ada".to_string()),
                last_name: Some("Admin".to_string()),
                permissions: BTreeMap::from([("superuser".to_string(), "1".to_string())]),
            },
            groups: Vec::new(),
            activate: true,
        })
        .await
        .unwrap();

    let cookie = login(app_state, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert!(!cookie.is_empty(), "admin login should set a session cookie");

    (admin, cookie)
}

/// Posts the login form and returns the session cookie, empty on failure.
pub async fn login(app_state: &AppState, email: &str, password: &str) -> String {
    let response = send(
        app_state,
        form_request(
            "POST",
            "/login",
            None,
            &[("email", email), ("password", password)],
        ),
    )
    .await;

    // A rejected login also sets a cookie, carrying the flash message
    if location(&response) != "/users" {
        return String::new();
    }

    session_cookie(&response)
}

pub fn session_cookie<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(';').next())
        .unwrap_or("")
        .to_string()
}

pub fn form_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .method(method)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");

    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }

    builder
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

pub fn request(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(app_state: &AppState, request: Request<Body>) -> Response<Body> {
    cpanel::create_router(app_state.clone())
        .oneshot(request)
        .await
        .unwrap()
}

pub fn location<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string()
}

pub fn assert_redirect<B>(response: &Response<B>, to: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), to);
}

pub async fn body_string(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Fetches a page with the session cookie and returns its HTML.
pub async fn page(app_state: &AppState, uri: &str, cookie: &str) -> String {
    let response = send(app_state, request("GET", uri, cookie)).await;
    assert_eq!(response.status(), StatusCode::OK, "GET {} should render", uri);
    body_string(response).await
}
