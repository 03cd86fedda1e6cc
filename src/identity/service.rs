use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::sync::{Arc, MutexGuard};
use tokio::task;

use crate::database::Database;
use crate::identity::error::{IdentityError, IdentityResult};
use crate::identity::models::{CreateUser, Group, Throttle, UpdateUser, User, UserCredentials};
use crate::identity::password::{hash_password, verify_password};
use crate::identity::permissions::{PermissionEffect, PermissionModule, PermissionSet};
use crate::identity::validation::{validate_email, validate_password, FieldErrors};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, permissions, \
     activated, activated_at, last_login, created_at, updated_at";

const THROTTLE_COLUMNS: &str =
    "id, user_id, attempts, suspended, banned, last_attempt_at, suspended_at, banned_at";

/// Users, groups, permissions and throttles backed by the application database.
pub struct IdentityService {
    db: Arc<Database>,
}

impl IdentityService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn find_all_users(&self) -> IdentityResult<Vec<User>> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<Vec<User>> {
            let conn = lock(&db)?;

            let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(users)
        })
        .await?
    }

    pub async fn find_user_by_id(&self, id: i64) -> IdentityResult<User> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<User> {
            let conn = lock(&db)?;
            select_user(&conn, id)
        })
        .await?
    }

    /// Groups the user belongs to, in group id order.
    pub async fn find_user_groups(&self, user_id: i64) -> IdentityResult<Vec<Group>> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<Vec<Group>> {
            let conn = lock(&db)?;
            select_user(&conn, user_id)?;
            select_user_groups(&conn, user_id)
        })
        .await?
    }

    pub async fn find_all_groups(&self) -> IdentityResult<Vec<Group>> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<Vec<Group>> {
            let conn = lock(&db)?;

            let mut stmt = conn.prepare(
                "SELECT id, name, permissions, created_at FROM auth_groups ORDER BY name",
            )?;
            let groups = stmt
                .query_map([], group_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(groups)
        })
        .await?
    }

    pub async fn create_group(
        &self,
        name: String,
        permissions: PermissionSet,
    ) -> IdentityResult<Group> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<Group> {
            let conn = lock(&db)?;

            let name = name.trim().to_string();
            if name.is_empty() {
                let mut errors = FieldErrors::new();
                errors.add("name", "The name field is required.");
                return Err(IdentityError::Validation(errors));
            }

            conn.execute(
                "INSERT INTO auth_groups (name, permissions) VALUES (?1, ?2)",
                rusqlite::params![&name, permissions.to_json()?],
            )?;
            let group_id = conn.last_insert_rowid();

            conn.query_row(
                "SELECT id, name, permissions, created_at FROM auth_groups WHERE id = ?1",
                [group_id],
                group_from_row,
            )
            .optional()?
            .ok_or(IdentityError::GroupNotFound { id: group_id })
        })
        .await?
    }

    /// The throttle record of a user, created on first lookup.
    pub async fn get_throttle(&self, user_id: i64) -> IdentityResult<Throttle> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<Throttle> {
            let conn = lock(&db)?;
            select_user(&conn, user_id)?;
            ensure_throttle(&conn, user_id)
        })
        .await?
    }

    /// Own permissions overlaid on the permissions of every group the user
    /// belongs to.
    pub async fn merged_permissions(&self, user_id: i64) -> IdentityResult<PermissionSet> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<PermissionSet> {
            let conn = lock(&db)?;
            let user = select_user(&conn, user_id)?;
            let groups = select_user_groups(&conn, user_id)?;

            Ok(PermissionSet::merged(
                &user.permissions,
                groups.iter().map(|group| &group.permissions),
            ))
        })
        .await?
    }

    pub async fn create_user(&self, command: CreateUser) -> IdentityResult<User> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<User> {
            let mut conn = lock(&db)?;

            let validated =
                validate_submission(&conn, &command.credentials, &command.groups, true, None)?;
            let password = command.credentials.password.as_deref().unwrap_or_default();
            let password_hash = hash_password(password)?;

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (email, password_hash, first_name, last_name, permissions, activated, activated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, CASE WHEN ?6 = 1 THEN CURRENT_TIMESTAMP END)",
                rusqlite::params![
                    &validated.email,
                    &password_hash,
                    blank_to_none(&command.credentials.first_name),
                    blank_to_none(&command.credentials.last_name),
                    validated.permissions.to_json()?,
                    i64::from(command.activate),
                ],
            )?;
            let user_id = tx.last_insert_rowid();
            replace_memberships(&tx, user_id, &validated.groups)?;
            tx.commit()?;

            select_user(&conn, user_id)
        })
        .await?
    }

    /// Replaces the user's details and group memberships. The password is
    /// only changed when a new one is submitted, and own permissions only
    /// when permission fields are submitted.
    pub async fn update_user(&self, command: UpdateUser) -> IdentityResult<User> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<User> {
            let mut conn = lock(&db)?;

            let existing = select_user(&conn, command.id)?;
            let validated = validate_submission(
                &conn,
                &command.credentials,
                &command.groups,
                false,
                Some(existing.id),
            )?;

            let permissions = if command.credentials.permissions.is_empty() {
                existing.permissions.clone()
            } else {
                validated.permissions
            };

            let password_hash = match command
                .credentials
                .password
                .as_deref()
                .filter(|password| !password.is_empty())
            {
                Some(password) => hash_password(password)?,
                None => existing.password_hash.clone(),
            };

            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE users SET email = ?1, password_hash = ?2, first_name = ?3, last_name = ?4, permissions = ?5,
                 updated_at = CURRENT_TIMESTAMP WHERE id = ?6",
                rusqlite::params![
                    &validated.email,
                    &password_hash,
                    blank_to_none(&command.credentials.first_name),
                    blank_to_none(&command.credentials.last_name),
                    permissions.to_json()?,
                    existing.id,
                ],
            )?;
            replace_memberships(&tx, existing.id, &validated.groups)?;
            tx.commit()?;

            select_user(&conn, existing.id)
        })
        .await?
    }

    pub async fn delete_user(&self, id: i64) -> IdentityResult<()> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<()> {
            let conn = lock(&db)?;

            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(IdentityError::UserNotFound { id });
            }

            Ok(())
        })
        .await?
    }

    /// Returns `false` when the activation is refused: banned users stay
    /// inactive. Activating an active user succeeds without changes.
    pub async fn activate_user(&self, id: i64) -> IdentityResult<bool> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<bool> {
            let conn = lock(&db)?;
            let user = select_user(&conn, id)?;

            let banned = conn
                .query_row(
                    "SELECT banned FROM throttle WHERE user_id = ?1",
                    [id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .map(|banned| banned != 0)
                .unwrap_or(false);

            if banned {
                return Ok(false);
            }

            if !user.activated {
                conn.execute(
                    "UPDATE users SET activated = 1, activated_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?1",
                    [id],
                )?;
            }

            Ok(true)
        })
        .await?
    }

    pub async fn deactivate_user(&self, id: i64) -> IdentityResult<()> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<()> {
            let conn = lock(&db)?;
            select_user(&conn, id)?;

            conn.execute(
                "UPDATE users SET activated = 0, activated_at = NULL, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                [id],
            )?;

            Ok(())
        })
        .await?
    }

    pub async fn set_banned(&self, user_id: i64, banned: bool) -> IdentityResult<Throttle> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<Throttle> {
            let conn = lock(&db)?;
            select_user(&conn, user_id)?;
            ensure_throttle(&conn, user_id)?;

            conn.execute(
                "UPDATE throttle SET banned = ?1, banned_at = CASE WHEN ?1 = 1 THEN CURRENT_TIMESTAMP END
                 WHERE user_id = ?2",
                rusqlite::params![i64::from(banned), user_id],
            )?;

            ensure_throttle(&conn, user_id)
        })
        .await?
    }

    pub async fn generic_permissions(&self) -> IdentityResult<Vec<PermissionModule>> {
        Ok(self
            .permission_catalog()
            .await?
            .into_iter()
            .filter(|module| module.generic)
            .collect())
    }

    pub async fn module_permissions(&self) -> IdentityResult<Vec<PermissionModule>> {
        Ok(self
            .permission_catalog()
            .await?
            .into_iter()
            .filter(|module| !module.generic)
            .collect())
    }

    async fn permission_catalog(&self) -> IdentityResult<Vec<PermissionModule>> {
        let db = self.db.clone();

        task::spawn_blocking(move || -> IdentityResult<Vec<PermissionModule>> {
            let conn = lock(&db)?;
            select_catalog(&conn)
        })
        .await?
    }

    /// Checks a login attempt. Failed password checks are counted on the
    /// user's throttle; a successful login clears the counter.
    pub async fn authenticate(&self, email: &str, password: &str) -> IdentityResult<User> {
        let db = self.db.clone();
        let email = email.trim().to_lowercase();
        let password = password.to_string();

        task::spawn_blocking(move || -> IdentityResult<User> {
            let conn = lock(&db)?;

            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                    [&email],
                    user_from_row,
                )
                .optional()?
                .ok_or(IdentityError::InvalidCredentials)?;

            let throttle = ensure_throttle(&conn, user.id)?;
            if throttle.banned {
                return Err(IdentityError::Banned);
            }

            if !verify_password(&password, &user.password_hash) {
                conn.execute(
                    "UPDATE throttle SET attempts = attempts + 1, last_attempt_at = CURRENT_TIMESTAMP
                     WHERE user_id = ?1",
                    [user.id],
                )?;
                return Err(IdentityError::InvalidCredentials);
            }

            if !user.activated {
                return Err(IdentityError::NotActivated);
            }

            conn.execute(
                "UPDATE throttle SET attempts = 0, last_attempt_at = NULL WHERE user_id = ?1",
                [user.id],
            )?;
            conn.execute(
                "UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = ?1",
                [user.id],
            )?;

            select_user(&conn, user.id)
        })
        .await?
    }
}

struct ValidatedUser {
    email: String,
    permissions: PermissionSet,
    groups: Vec<i64>,
}

fn validate_submission(
    conn: &Connection,
    credentials: &UserCredentials,
    groups: &[String],
    password_required: bool,
    user_id: Option<i64>,
) -> IdentityResult<ValidatedUser> {
    let mut errors = FieldErrors::new();

    let email = credentials.email.trim().to_lowercase();
    validate_email(&email, &mut errors);
    if !errors.has("email") && email_taken(conn, &email, user_id)? {
        errors.add("email", "The email has already been taken.");
    }

    validate_password(
        credentials.password.as_deref(),
        credentials.password_confirmation.as_deref(),
        password_required,
        &mut errors,
    );

    let mut group_ids = Vec::new();
    for raw in groups.iter().map(|raw| raw.trim()).filter(|raw| !raw.is_empty()) {
        let exists = match raw.parse::<i64>() {
            Ok(id) => group_exists(conn, id)?.then_some(id),
            Err(_) => None,
        };

        match exists {
            Some(id) if !group_ids.contains(&id) => group_ids.push(id),
            Some(_) => {}
            None => errors.add("groups", format!("The selected group [{}] is invalid.", raw)),
        }
    }

    let known_permissions = catalog_keys(conn)?;
    let mut permissions = PermissionSet::new();
    for (key, value) in &credentials.permissions {
        if !known_permissions.contains(key) {
            errors.add("permissions", format!("The permission [{}] does not exist.", key));
            continue;
        }

        match PermissionEffect::parse(value) {
            Some(effect) => permissions.set(key.clone(), effect),
            None => errors.add(
                "permissions",
                format!("The value for permission [{}] is invalid.", key),
            ),
        }
    }

    errors.into_result().map_err(IdentityError::Validation)?;

    Ok(ValidatedUser {
        email,
        permissions,
        groups: group_ids,
    })
}

fn lock(db: &Database) -> IdentityResult<MutexGuard<'_, Connection>> {
    db.get_connection()
        .lock()
        .map_err(|_| IdentityError::LockPoisoned)
}

fn select_user(conn: &Connection, id: i64) -> IdentityResult<User> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or(IdentityError::UserNotFound { id })
}

fn select_user_groups(conn: &Connection, user_id: i64) -> IdentityResult<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.name, g.permissions, g.created_at
         FROM auth_groups g
         JOIN users_groups ug ON ug.group_id = g.id
         WHERE ug.user_id = ?1
         ORDER BY g.id",
    )?;
    let groups = stmt
        .query_map([user_id], group_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(groups)
}

fn ensure_throttle(conn: &Connection, user_id: i64) -> IdentityResult<Throttle> {
    conn.execute(
        "INSERT OR IGNORE INTO throttle (user_id) VALUES (?1)",
        [user_id],
    )?;

    let throttle = conn.query_row(
        &format!("SELECT {} FROM throttle WHERE user_id = ?1", THROTTLE_COLUMNS),
        [user_id],
        throttle_from_row,
    )?;

    Ok(throttle)
}

fn select_catalog(conn: &Connection) -> IdentityResult<Vec<PermissionModule>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, permissions, generic FROM permissions ORDER BY id",
    )?;
    let modules = stmt
        .query_map([], |row| {
            let raw: String = row.get(3)?;
            let permissions: Vec<String> = serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

            Ok(PermissionModule {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                permissions,
                generic: row.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(modules)
}

fn catalog_keys(conn: &Connection) -> IdentityResult<BTreeSet<String>> {
    Ok(select_catalog(conn)?
        .iter()
        .flat_map(PermissionModule::keys)
        .collect())
}

fn email_taken(conn: &Connection, email: &str, except_user: Option<i64>) -> IdentityResult<bool> {
    let owner: Option<i64> = conn
        .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| row.get(0))
        .optional()?;

    Ok(matches!(owner, Some(id) if Some(id) != except_user))
}

fn group_exists(conn: &Connection, group_id: i64) -> IdentityResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM auth_groups WHERE id = ?1", [group_id], |row| row.get(0))
        .optional()?;

    Ok(found.is_some())
}

fn replace_memberships(conn: &Connection, user_id: i64, groups: &[i64]) -> IdentityResult<()> {
    conn.execute("DELETE FROM users_groups WHERE user_id = ?1", [user_id])?;

    let mut stmt = conn.prepare("INSERT INTO users_groups (user_id, group_id) VALUES (?1, ?2)")?;
    for group_id in groups {
        stmt.execute([user_id, *group_id])?;
    }

    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        permissions: permissions_column(row, 5)?,
        activated: row.get::<_, i64>(6)? != 0,
        activated_at: row.get::<_, Option<String>>(7)?.map(parse_datetime),
        last_login: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        permissions: permissions_column(row, 2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

fn throttle_from_row(row: &Row<'_>) -> rusqlite::Result<Throttle> {
    Ok(Throttle {
        id: row.get(0)?,
        user_id: row.get(1)?,
        attempts: row.get(2)?,
        suspended: row.get::<_, i64>(3)? != 0,
        banned: row.get::<_, i64>(4)? != 0,
        last_attempt_at: row.get::<_, Option<String>>(5)?.map(parse_datetime),
        suspended_at: row.get::<_, Option<String>>(6)?.map(parse_datetime),
        banned_at: row.get::<_, Option<String>>(7)?.map(parse_datetime),
    })
}

fn permissions_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<PermissionSet> {
    let raw: String = row.get(idx)?;
    PermissionSet::from_json(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    // SQLite stores timestamps as strings, parse them
    // Format: YYYY-MM-DD HH:MM:SS
    chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}
