//! JSON-file store: the whole snapshot lives in `<data_dir>/store.json`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::snapshot::Snapshot;
use super::{BookStore, IdentityStore};
use crate::books::{Book, BookModel};
use crate::error::Result;
use crate::identity::{ExternalLogin, LockoutPolicy, Role, User};

const STORE_FILE: &str = "store.json";

/// Durable store. Each mutation rewrites the snapshot while the write lock
/// is held, so the file never lags behind a successful call.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: RwLock<Snapshot>,
}

impl FileStore {
    /// Open (or create) the store under `data_dir`.
    #[instrument(skip_all, fields(data_dir = %data_dir.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);
        let snapshot = if path.exists() {
            let data = fs::read(&path)?;
            serde_json::from_slice(&data)?
        } else {
            Snapshot::default()
        };
        info!(path = %path.display(), "opened file store");
        Ok(Self {
            path,
            state: RwLock::new(snapshot),
        })
    }

    /// Write to a sibling temp file and rename over the old snapshot.
    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    async fn mutate<T>(&self, op: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let out = op(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl IdentityStore for FileStore {
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
        self.mutate(|s| s.insert_user(user)).await
    }

    async fn update_user(&self, user: User) -> Result<()> {
        self.mutate(|s| s.update_user(user)).await
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.mutate(|s| s.delete_user(id)).await
    }

    async fn record_access_failure(
        &self,
        id: &str,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.mutate(|s| s.record_access_failure(id, policy, now)).await
    }

    async fn reset_access_failures(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.mutate(|s| s.reset_access_failures(id, now)).await
    }

    async fn add_login(
        &self,
        id: &str,
        login: ExternalLogin,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.mutate(|s| s.add_login(id, login, now)).await
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
        self.mutate(|s| s.insert_role(role)).await
    }

    async fn update_role(&self, role: Role) -> Result<()> {
        self.mutate(|s| s.update_role(role)).await
    }

    async fn delete_role(&self, id: &str) -> Result<()> {
        self.mutate(|s| s.delete_role(id)).await
    }
}

#[async_trait]
impl BookStore for FileStore {
    async fn insert_book(&self, model: BookModel) -> Result<Book> {
        self.mutate(|s| Ok(s.insert_book(model))).await
    }

    async fn find_book(&self, id: u64) -> Result<Option<Book>> {
        Ok(self.state.read().await.find_book(id))
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        Ok(self.state.read().await.list_books())
    }

    async fn update_book(&self, book: Book) -> Result<()> {
        self.mutate(|s| s.update_book(book)).await
    }

    async fn delete_book(&self, id: u64) -> Result<bool> {
        self.mutate(|s| Ok(s.delete_book(id))).await
    }
}
