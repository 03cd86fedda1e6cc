use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Effect of a single permission entry. Stored as `1`, `-1` or `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum PermissionEffect {
    Grant,
    Deny,
    Inherit,
}

impl PermissionEffect {
    pub fn as_str(&self) -> &str {
        match self {
            PermissionEffect::Grant => "1",
            PermissionEffect::Deny => "-1",
            PermissionEffect::Inherit => "0",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            PermissionEffect::Grant => "Allow",
            PermissionEffect::Deny => "Deny",
            PermissionEffect::Inherit => "Inherit",
        }
    }

    /// Parses a submitted form value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "1" => Some(PermissionEffect::Grant),
            "-1" => Some(PermissionEffect::Deny),
            "0" | "" => Some(PermissionEffect::Inherit),
            _ => None,
        }
    }
}

impl From<PermissionEffect> for i8 {
    fn from(effect: PermissionEffect) -> Self {
        match effect {
            PermissionEffect::Grant => 1,
            PermissionEffect::Deny => -1,
            PermissionEffect::Inherit => 0,
        }
    }
}

impl TryFrom<i8> for PermissionEffect {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PermissionEffect::Grant),
            -1 => Ok(PermissionEffect::Deny),
            0 => Ok(PermissionEffect::Inherit),
            other => Err(format!("invalid permission value {}", other)),
        }
    }
}

impl std::fmt::Display for PermissionEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Explicit permissions of a user or group, keyed by permission name.
///
/// `Inherit` is the absence of an entry, so it is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, PermissionEffect>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, PermissionEffect> = serde_json::from_str(json)?;
        Ok(raw.into_iter().collect())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn set(&mut self, key: impl Into<String>, effect: PermissionEffect) {
        let key = key.into();
        match effect {
            PermissionEffect::Inherit => {
                self.0.remove(&key);
            }
            _ => {
                self.0.insert(key, effect);
            }
        }
    }

    pub fn get(&self, key: &str) -> PermissionEffect {
        self.0.get(key).copied().unwrap_or(PermissionEffect::Inherit)
    }

    pub fn is_granted(&self, key: &str) -> bool {
        self.get(key) == PermissionEffect::Grant
    }

    /// Writes every entry of `other` over this set.
    pub fn overlay(&mut self, other: &PermissionSet) {
        for (key, effect) in other.iter() {
            self.set(key.clone(), *effect);
        }
    }

    /// Group sets are applied in order, the user's own set last, so own
    /// entries always win and a later group wins over an earlier one.
    pub fn merged<'a>(
        own: &PermissionSet,
        groups: impl IntoIterator<Item = &'a PermissionSet>,
    ) -> PermissionSet {
        let mut merged = PermissionSet::new();
        for group in groups {
            merged.overlay(group);
        }
        merged.overlay(own);
        merged
    }

    pub fn granted(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, effect)| **effect == PermissionEffect::Grant)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PermissionEffect)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, PermissionEffect)> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = (String, PermissionEffect)>>(iter: T) -> Self {
        let mut set = PermissionSet::new();
        for (key, effect) in iter {
            set.set(key, effect);
        }
        set
    }
}

/// An entry of the permission catalog offered on the user forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionModule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub generic: bool,
}

impl PermissionModule {
    /// Permission keys this entry contributes, e.g. `superuser` or `users.view`.
    pub fn keys(&self) -> Vec<String> {
        if self.generic {
            self.permissions.clone()
        } else {
            self.permissions
                .iter()
                .map(|action| format!("{}.{}", self.name, action))
                .collect()
        }
    }
}
