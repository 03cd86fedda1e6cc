use askama::Template;

use crate::admin::users::models::{
    GroupOption, PermissionChoice, PermissionGroupView, PermissionRow, ThrottleRow, UserRow,
};
use crate::flash::Flash;

#[derive(Template)]
#[template(path = "admin/users/index.html")]
pub struct UsersIndexTemplate {
    pub title: String,
    pub admin_name: String,
    pub current_user_id: i64,
    pub users: Vec<UserRow>,
    pub flash: Flash,
}

#[derive(Template)]
#[template(path = "admin/users/show.html")]
pub struct UserShowTemplate {
    pub title: String,
    pub admin_name: String,
    pub user: UserRow,
    pub throttle: ThrottleRow,
    pub permissions: Vec<PermissionRow>,
    pub flash: Flash,
}

#[derive(Template)]
#[template(path = "admin/users/create.html")]
pub struct UserCreateTemplate {
    pub title: String,
    pub admin_name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub activate: bool,
    pub groups: Vec<GroupOption>,
    pub generic_permissions: Vec<PermissionChoice>,
    pub module_permissions: Vec<PermissionGroupView>,
    pub flash: Flash,
}

#[derive(Template)]
#[template(path = "admin/users/edit.html")]
pub struct UserEditTemplate {
    pub title: String,
    pub admin_name: String,
    pub user: UserRow,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub groups: Vec<GroupOption>,
    pub user_group_ids: Vec<i64>,
    pub generic_permissions: Vec<PermissionChoice>,
    pub module_permissions: Vec<PermissionGroupView>,
    pub flash: Flash,
}
