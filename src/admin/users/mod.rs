pub mod handlers;
pub mod models;
pub mod templates;

// Re-export commonly used items
pub use handlers::{
    activate_user, ban_user, create_user, deactivate_user, delete_user, edit_user_form,
    list_users, new_user_form, show_user, unban_user, update_user,
};
pub use models::UserInput;
