mod common;

use axum::http::{header, StatusCode};
use common::*;
use cpanel::identity::IdentityService;

#[tokio::test]
async fn test_health_check() {
    let app_state = create_test_app_state().await;

    let response = send(&app_state, request("GET", "/health", "")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn test_root_redirects_to_users() {
    let app = create_test_app().await;

    let response = tower::ServiceExt::oneshot(
        app,
        axum::http::Request::builder()
            .uri("/")
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    assert_redirect(&response, "/users");
}

#[tokio::test]
async fn test_login_page_renders() {
    let app_state = create_test_app_state().await;

    let body = page(&app_state, "/login", "").await;

    assert!(body.contains("name=\"email\""));
    assert!(body.contains("name=\"password\""));
}

#[tokio::test]
async fn test_login_success_redirects_to_users() {
    let app_state = create_test_app_state().await;
    create_user(&app_state, "member@example.com", true, &[]).await;

    let response = send(
        &app_state,
        form_request(
            "POST",
            "/login",
            None,
            &[("email", "member@example.com"), ("password", USER_PASSWORD)],
        ),
    )
    .await;

    assert_redirect(&response, "/users");
    assert!(response.headers().get(header::SET_COOKIE).is_some());
}

#[tokio::test]
async fn test_failed_login_counts_attempt_and_flashes_error() {
    let app_state = create_test_app_state().await;
    let user = create_user(&app_state, "member@example.com", true, &[]).await;

    let response = send(
        &app_state,
        form_request(
            "POST",
            "/login",
            None,
            &[("email", "member@example.com"), ("password", "wrong-password")],
        ),
    )
    .await;
    assert_redirect(&response, "/login");

    let cookie = session_cookie(&response);
    let body = page(&app_state, "/login", &cookie).await;
    assert!(body.contains("Invalid email or password"));

    let throttle = IdentityService::new(app_state.db.clone())
        .get_throttle(user.id)
        .await
        .unwrap();
    assert_eq!(throttle.attempts, 1);
    assert!(throttle.last_attempt_at.is_some());
}

#[tokio::test]
async fn test_inactive_user_cannot_log_in() {
    let app_state = create_test_app_state().await;
    create_user(&app_state, "pending@example.com", false, &[]).await;

    let response = send(
        &app_state,
        form_request(
            "POST",
            "/login",
            None,
            &[("email", "pending@example.com"), ("password", USER_PASSWORD)],
        ),
    )
    .await;
    assert_redirect(&response, "/login");

    let cookie = session_cookie(&response);
    let body = page(&app_state, "/login", &cookie).await;
    assert!(body.contains("This account has not been activated"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app_state = create_test_app_state().await;
    let (_admin, cookie) = create_and_login_admin(&app_state).await;

    let response = send(&app_state, request("POST", "/logout", &cookie)).await;
    assert_redirect(&response, "/login");

    let response = send(&app_state, request("GET", "/users", &cookie)).await;
    assert_redirect(&response, "/login");
}
