use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::flash::Flash;
use crate::identity::{
    CreateUser, Group, PermissionEffect, PermissionModule, PermissionSet, Throttle, UpdateUser,
    User, UserCredentials,
};

const GROUPS_FIELD: &str = "groups";

/// A submitted user form, kept as ordered key/value pairs so repeated
/// fields such as `groups` survive.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pairs: Vec<(String, String)>,
}

impl UserInput {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    fn value(&self, field: &str) -> Option<String> {
        self.pairs
            .iter()
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.clone())
    }

    /// Everything but the group selection.
    pub fn credentials(&self) -> UserCredentials {
        let permissions: BTreeMap<String, String> = self
            .pairs
            .iter()
            .filter_map(|(key, value)| {
                permission_key(key).map(|permission| (permission.to_string(), value.clone()))
            })
            .collect();

        UserCredentials {
            email: self.value("email").unwrap_or_default(),
            password: self.value("password"),
            password_confirmation: self.value("password_confirmation"),
            first_name: self.value("first_name"),
            last_name: self.value("last_name"),
            permissions,
        }
    }

    /// Selected group identifiers, `groups` or `groups[]`; empty when none
    /// were submitted.
    pub fn groups(&self) -> Vec<String> {
        selected_groups(&self.pairs)
    }

    pub fn activate(&self) -> bool {
        matches!(self.value("activate").as_deref(), Some("1" | "on" | "true"))
    }

    pub fn create_command(&self) -> CreateUser {
        CreateUser {
            credentials: self.credentials(),
            groups: self.groups(),
            activate: self.activate(),
        }
    }

    pub fn update_command(&self, id: i64) -> UpdateUser {
        UpdateUser {
            id,
            credentials: self.credentials(),
            groups: self.groups(),
        }
    }
}

fn selected_groups(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(key, _)| key == GROUPS_FIELD || key == "groups[]")
        .map(|(_, value)| value.clone())
        .collect()
}

/// `permissions[users.view]` -> `users.view`
fn permission_key(field: &str) -> Option<&str> {
    field
        .strip_prefix("permissions[")
        .and_then(|rest| rest.strip_suffix(']'))
        .filter(|key| !key.is_empty())
}

fn format_datetime(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    pub activated: bool,
    pub activated_at: String,
    pub last_login: String,
    pub created_at: String,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.display_name(),
            first_name: user.first_name.clone().unwrap_or_default(),
            last_name: user.last_name.clone().unwrap_or_default(),
            status: user.status().to_string(),
            activated: user.activated,
            activated_at: user
                .activated_at
                .as_ref()
                .map(format_datetime)
                .unwrap_or_else(|| "-".to_string()),
            last_login: user
                .last_login
                .as_ref()
                .map(format_datetime)
                .unwrap_or_else(|| "Never".to_string()),
            created_at: format_datetime(&user.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThrottleRow {
    pub attempts: i64,
    pub status: String,
    pub banned: bool,
    pub suspended: bool,
    pub last_attempt_at: String,
    pub banned_at: String,
}

impl From<&Throttle> for ThrottleRow {
    fn from(throttle: &Throttle) -> Self {
        let or_dash = |value: &Option<DateTime<Utc>>| {
            value
                .as_ref()
                .map(format_datetime)
                .unwrap_or_else(|| "-".to_string())
        };

        Self {
            attempts: throttle.attempts,
            status: throttle.status().to_string(),
            banned: throttle.banned,
            suspended: throttle.suspended,
            last_attempt_at: or_dash(&throttle.last_attempt_at),
            banned_at: or_dash(&throttle.banned_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupOption {
    pub id: i64,
    pub name: String,
    pub selected: bool,
}

impl GroupOption {
    pub fn build(groups: &[Group], selected: &[i64]) -> Vec<Self> {
        groups
            .iter()
            .map(|group| Self {
                id: group.id,
                name: group.name.clone(),
                selected: selected.contains(&group.id),
            })
            .collect()
    }
}

/// Group ids to pre-select: the re-submitted ones after a failed attempt,
/// otherwise `current`.
pub fn selected_group_ids(flash: &Flash, current: &[i64]) -> Vec<i64> {
    if flash.input.is_empty() {
        return current.to_vec();
    }

    selected_groups(&flash.input)
        .iter()
        .filter_map(|raw| raw.trim().parse().ok())
        .collect()
}

/// One permission with its radio button states.
#[derive(Debug, Clone)]
pub struct PermissionChoice {
    pub key: String,
    pub label: String,
    pub grant: bool,
    pub deny: bool,
    pub inherit: bool,
}

impl PermissionChoice {
    fn new(key: String, label: String, effect: PermissionEffect) -> Self {
        Self {
            key,
            label,
            grant: effect == PermissionEffect::Grant,
            deny: effect == PermissionEffect::Deny,
            inherit: effect == PermissionEffect::Inherit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermissionGroupView {
    pub name: String,
    pub description: String,
    pub choices: Vec<PermissionChoice>,
}

impl PermissionGroupView {
    /// Radio states come from the re-submitted values after a failed
    /// attempt, otherwise from `current`.
    pub fn build(modules: &[PermissionModule], current: &PermissionSet, flash: &Flash) -> Vec<Self> {
        modules
            .iter()
            .map(|module| {
                let choices = module
                    .keys()
                    .into_iter()
                    .zip(module.permissions.iter())
                    .map(|(key, label)| {
                        let effect = if flash.input.is_empty() {
                            current.get(&key)
                        } else {
                            PermissionEffect::parse(&flash.old(&format!("permissions[{}]", key)))
                                .unwrap_or(PermissionEffect::Inherit)
                        };
                        PermissionChoice::new(key, label.clone(), effect)
                    })
                    .collect();

                Self {
                    name: module.name.clone(),
                    description: module.description.clone().unwrap_or_default(),
                    choices,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PermissionRow {
    pub key: String,
    pub effect: String,
    pub granted: bool,
}

impl PermissionRow {
    pub fn build(permissions: &PermissionSet) -> Vec<Self> {
        permissions
            .iter()
            .map(|(key, effect)| Self {
                key: key.clone(),
                effect: effect.display_name().to_string(),
                granted: *effect == PermissionEffect::Grant,
            })
            .collect()
    }
}
