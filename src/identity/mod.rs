//! User, group and permission storage consumed by the administration panel.

pub mod error;
pub mod models;
pub mod password;
pub mod permissions;
pub mod service;
pub mod validation;

pub use error::{IdentityError, IdentityResult};
pub use models::{CreateUser, Group, Throttle, UpdateUser, User, UserCredentials};
pub use permissions::{PermissionEffect, PermissionModule, PermissionSet};
pub use service::IdentityService;
pub use validation::FieldErrors;
