//! Storage seams for identities and books.
//!
//! Managers only talk to these traits. Uniqueness of user emails, usernames
//! and role names is enforced by the store inside the same critical section
//! as the write, so concurrent creators of the same record see
//! `AlreadyExists` instead of producing duplicates. Sign-in bookkeeping goes
//! through dedicated field-level operations rather than whole-record
//! updates, so it never overwrites concurrent edits.

mod file;
mod memory;
mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::books::{Book, BookModel};
use crate::error::Result;
use crate::identity::{ExternalLogin, LockoutPolicy, Role, User};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Normalized form used for case-insensitive email and role-name lookups.
pub fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_login(&self, provider: &str, provider_key: &str)
        -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    /// Fails with `AlreadyExists` when the email or username is taken.
    async fn insert_user(&self, user: User) -> Result<()>;
    /// Fails with `NotFound` for unknown ids and `AlreadyExists` when the
    /// new email or username belongs to another user.
    async fn update_user(&self, user: User) -> Result<()>;
    async fn delete_user(&self, id: &str) -> Result<()>;

    /// Increment the failed sign-in count under the store lock, locking the
    /// account once `policy.max_failed_attempts` is reached. Returns the
    /// updated user.
    async fn record_access_failure(
        &self,
        id: &str,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<User>;
    /// Clear the failure count and any lockout.
    async fn reset_access_failures(&self, id: &str, now: DateTime<Utc>) -> Result<()>;
    /// Link an external login to the user.
    async fn add_login(&self, id: &str, login: ExternalLogin, now: DateTime<Utc>)
        -> Result<User>;

    async fn find_role(&self, id: &str) -> Result<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;
    async fn list_roles(&self) -> Result<Vec<Role>>;
    /// Fails with `AlreadyExists` when the name is taken.
    async fn insert_role(&self, role: Role) -> Result<()>;
    async fn update_role(&self, role: Role) -> Result<()>;
    /// Also drops the role from every user holding it.
    async fn delete_role(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait BookStore: Send + Sync {
    /// Assigns the next id and returns the stored book.
    async fn insert_book(&self, model: BookModel) -> Result<Book>;
    async fn find_book(&self, id: u64) -> Result<Option<Book>>;
    async fn list_books(&self) -> Result<Vec<Book>>;
    async fn update_book(&self, book: Book) -> Result<()>;
    /// Returns whether a book was removed.
    async fn delete_book(&self, id: u64) -> Result<bool>;
}
