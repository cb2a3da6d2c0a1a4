use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::snapshot::Snapshot;
use super::{BookStore, IdentityStore};
use crate::books::{Book, BookModel};
use crate::error::Result;
use crate::identity::{ExternalLogin, LockoutPolicy, Role, User};

/// Volatile store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.state.read().await.find_user(id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.state.read().await.find_user_by_email(email))
    }

    async fn find_user_by_login(
        &self,
        provider: &str,
        provider_key: &str,
    ) -> Result<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .find_user_by_login(provider, provider_key))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().await.list_users())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        self.state.write().await.insert_user(user)
    }

    async fn update_user(&self, user: User) -> Result<()> {
        self.state.write().await.update_user(user)
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.state.write().await.delete_user(id)
    }

    async fn record_access_failure(
        &self,
        id: &str,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.state
            .write()
            .await
            .record_access_failure(id, policy, now)
    }

    async fn reset_access_failures(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.state.write().await.reset_access_failures(id, now)
    }

    async fn add_login(
        &self,
        id: &str,
        login: ExternalLogin,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.state.write().await.add_login(id, login, now)
    }

    async fn find_role(&self, id: &str) -> Result<Option<Role>> {
        Ok(self.state.read().await.find_role(id))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.state.read().await.find_role_by_name(name))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.state.read().await.list_roles())
    }

    async fn insert_role(&self, role: Role) -> Result<()> {
        self.state.write().await.insert_role(role)
    }

    async fn update_role(&self, role: Role) -> Result<()> {
        self.state.write().await.update_role(role)
    }

    async fn delete_role(&self, id: &str) -> Result<()> {
        self.state.write().await.delete_role(id)
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn insert_book(&self, model: BookModel) -> Result<Book> {
        Ok(self.state.write().await.insert_book(model))
    }

    async fn find_book(&self, id: u64) -> Result<Option<Book>> {
        Ok(self.state.read().await.find_book(id))
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        Ok(self.state.read().await.list_books())
    }

    async fn update_book(&self, book: Book) -> Result<()> {
        self.state.write().await.update_book(book)
    }

    async fn delete_book(&self, id: u64) -> Result<bool> {
        Ok(self.state.write().await.delete_book(id))
    }
}
