mod accounts;
mod admin;
mod books;
mod health;

pub use accounts::{external_login, me, sign_in, sign_up};
pub use admin::{
    change_password, create_role, delete_role, delete_user, edit_role_members, get_role,
    get_user, list_claims, list_roles, list_users, set_role_claims, set_user_claims,
    set_user_roles, update_role, update_user,
};
pub use books::{add_book, delete_book, get_book, list_books, update_book};
pub use health::{handler_404, health};
