mod common;

use common::*;
use cpanel::identity::{
    CreateUser, IdentityError, IdentityService, PermissionEffect, PermissionSet, UpdateUser,
    UserCredentials,
};
use std::collections::BTreeMap;

fn credentials(email: &str, password: Option<&str>) -> UserCredentials {
    UserCredentials {
        email: email.to_string(),
        password: password.map(str::to_string),
        password_confirmation: password.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_merged_permissions_follow_group_order_and_own_overrides() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());

    let readers = identity
        .create_group(
            "Readers".to_string(),
            PermissionSet::from_iter([
                ("users.view".to_string(), PermissionEffect::Grant),
                ("users.update".to_string(), PermissionEffect::Grant),
            ]),
        )
        .await
        .unwrap();
    let restricted = identity
        .create_group(
            "Restricted".to_string(),
            PermissionSet::from_iter([("users.update".to_string(), PermissionEffect::Deny)]),
        )
        .await
        .unwrap();

    let mut own = credentials("merge@example.com", Some("mergepass1"));
    own.permissions = BTreeMap::from([
        ("users.view".to_string(), "-1".to_string()),
        ("users.delete".to_string(), "1".to_string()),
    ]);
    let user = identity
        .create_user(CreateUser {
            credentials: own,
            groups: vec![readers.id.to_string(), restricted.id.to_string()],
            activate: true,
        })
        .await
        .unwrap();

    let merged = identity.merged_permissions(user.id).await.unwrap();

    assert_eq!(merged.get("users.view"), PermissionEffect::Deny);
    assert_eq!(merged.get("users.update"), PermissionEffect::Deny);
    assert_eq!(merged.get("users.delete"), PermissionEffect::Grant);
    assert_eq!(merged.get("users.create"), PermissionEffect::Inherit);
    assert_eq!(merged.granted(), vec!["users.delete".to_string()]);
}

#[tokio::test]
async fn test_duplicate_email_is_rejected_case_insensitively() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());
    create_user(&app_state, "taken@example.com", true, &[]).await;

    let result = identity
        .create_user(CreateUser {
            credentials: credentials("TAKEN@example.com", Some("anotherpass")),
            ..Default::default()
        })
        .await;

    match result {
        Err(IdentityError::Validation(errors)) => {
            assert_eq!(errors.first("email"), Some("The email has already been taken."));
        }
        other => panic!("expected a validation error, got {:?}", other.map(|u| u.id)),
    }
}

#[tokio::test]
async fn test_create_requires_password() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());

    let result = identity
        .create_user(CreateUser {
            credentials: credentials("nopass@example.com", None),
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(IdentityError::Validation(ref errors)) if errors.has("password")));
}

#[tokio::test]
async fn test_unknown_permission_is_rejected() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());

    let mut submitted = credentials("perm@example.com", Some("permpass12"));
    submitted.permissions = BTreeMap::from([("rockets.launch".to_string(), "1".to_string())]);
    let result = identity
        .create_user(CreateUser {
            credentials: submitted,
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(IdentityError::Validation(ref errors)) if errors.has("permissions")));
}

#[tokio::test]
async fn test_blank_password_on_update_keeps_hash() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());
    let user = create_user(&app_state, "keep@example.com", true, &[("users.view", "1")]).await;

    let updated = identity
        .update_user(UpdateUser {
            id: user.id,
            credentials: UserCredentials {
                email: "keep@example.com".to_string(),
                password: Some(String::new()),
                password_confirmation: Some(String::new()),
                first_name: Some("Kim".to_string()),
                ..Default::default()
            },
            groups: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(updated.password_hash, user.password_hash);
    assert_eq!(updated.first_name.as_deref(), Some("Kim"));
    // No permission fields were submitted
    assert_eq!(updated.permissions.get("users.view"), PermissionEffect::Grant);
    identity.authenticate("keep@example.com", USER_PASSWORD).await.unwrap();
}

#[tokio::test]
async fn test_update_with_new_password_rehashes() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());
    let user = create_user(&app_state, "rotate@example.com", true, &[]).await;

    identity
        .update_user(UpdateUser {
            id: user.id,
            credentials: credentials("rotate@example.com", Some("brandnewpass")),
            groups: Vec::new(),
        })
        .await
        .unwrap();

    assert!(matches!(
        identity.authenticate("rotate@example.com", USER_PASSWORD).await,
        Err(IdentityError::InvalidCredentials)
    ));
    identity.authenticate("rotate@example.com", "brandnewpass").await.unwrap();
}

#[tokio::test]
async fn test_delete_user_removes_memberships_and_throttle() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());
    let group = identity
        .create_group("Editors".to_string(), PermissionSet::new())
        .await
        .unwrap();
    let user = identity
        .create_user(CreateUser {
            credentials: credentials("gone@example.com", Some("gonepass12")),
            groups: vec![group.id.to_string()],
            activate: true,
        })
        .await
        .unwrap();
    identity.get_throttle(user.id).await.unwrap();

    identity.delete_user(user.id).await.unwrap();

    let conn = app_state.db.get_connection().lock().unwrap();
    let memberships: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM users_groups WHERE user_id = ?1",
            [user.id],
            |row| row.get(0),
        )
        .unwrap();
    let throttles: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM throttle WHERE user_id = ?1",
            [user.id],
            |row| row.get(0),
        )
        .unwrap();
    drop(conn);

    assert_eq!(memberships, 0);
    assert_eq!(throttles, 0);
    assert!(matches!(
        identity.delete_user(user.id).await,
        Err(IdentityError::UserNotFound { .. })
    ));
}

#[tokio::test]
async fn test_activation_is_idempotent() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());
    let user = create_user(&app_state, "twice@example.com", false, &[]).await;

    assert!(identity.activate_user(user.id).await.unwrap());
    let first = identity.find_user_by_id(user.id).await.unwrap();
    assert!(identity.activate_user(user.id).await.unwrap());
    let second = identity.find_user_by_id(user.id).await.unwrap();

    assert!(second.activated);
    assert_eq!(first.activated_at, second.activated_at);
}

#[tokio::test]
async fn test_throttle_of_missing_user_is_not_found() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());

    let error = identity.get_throttle(12345).await.unwrap_err();

    assert!(error.is_not_found());
    assert_eq!(error.to_string(), "A user could not be found with ID [12345].");
}

#[tokio::test]
async fn test_authenticate_counts_failed_attempts() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());
    let user = create_user(&app_state, "counted@example.com", true, &[]).await;

    for _ in 0..3 {
        assert!(matches!(
            identity.authenticate("counted@example.com", "wrong-password").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }
    assert_eq!(identity.get_throttle(user.id).await.unwrap().attempts, 3);

    let logged_in = identity
        .authenticate("Counted@Example.com", USER_PASSWORD)
        .await
        .unwrap();
    assert!(logged_in.last_login.is_some());
    assert_eq!(identity.get_throttle(user.id).await.unwrap().attempts, 0);
}

#[tokio::test]
async fn test_authenticate_rejects_inactive_and_banned_users() {
    let app_state = create_test_app_state().await;
    let identity = IdentityService::new(app_state.db.clone());
    let inactive = create_user(&app_state, "inactive@example.com", false, &[]).await;
    let banned = create_user(&app_state, "banned@example.com", true, &[]).await;
    identity.set_banned(banned.id, true).await.unwrap();

    assert!(matches!(
        identity.authenticate(&inactive.email, USER_PASSWORD).await,
        Err(IdentityError::NotActivated)
    ));
    assert!(matches!(
        identity.authenticate(&banned.email, USER_PASSWORD).await,
        Err(IdentityError::Banned)
    ));
}
