use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::normalize;
use crate::books::{Book, BookModel};
use crate::error::{Result, ServiceError};
use crate::identity::{ExternalLogin, LockoutPolicy, Role, User};
use chrono::{DateTime, Utc};

/// Whole store contents. Both store backends keep one of these behind a
/// lock; the file store also serializes it after every mutation.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    users: BTreeMap<String, User>,
    #[serde(default)]
    roles: BTreeMap<String, Role>,
    #[serde(default)]
    books: BTreeMap<u64, Book>,
    #[serde(default)]
    next_book_id: u64,
}

impl Snapshot {
    pub fn find_user(&self, id: &str) -> Option<User> {
        self.users.get(id).cloned()
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let key = normalize(email);
        self.users
            .values()
            .find(|u| normalize(&u.email) == key)
            .cloned()
    }

    pub fn find_user_by_login(&self, provider: &str, provider_key: &str) -> Option<User> {
        self.users
            .values()
            .find(|u| {
                u.logins
                    .iter()
                    .any(|l| l.provider == provider && l.provider_key == provider_key)
            })
            .cloned()
    }

    pub fn list_users(&self) -> Vec<User> {
        self.users.values().cloned().collect()
    }

    pub fn insert_user(&mut self, user: User) -> Result<()> {
        if self.users.contains_key(&user.id) {
            return Err(ServiceError::AlreadyExists(format!("user: {}", user.id)));
        }
        self.check_unique(&user, None)?;
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn update_user(&mut self, user: User) -> Result<()> {
        if !self.users.contains_key(&user.id) {
            return Err(ServiceError::NotFound(format!("user: {}", user.id)));
        }
        self.check_unique(&user, Some(&user.id))?;
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    fn user_mut(&mut self, id: &str) -> Result<&mut User> {
        self.users
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound(format!("user: {}", id)))
    }

    /// Count one failed sign-in; reaching the policy maximum locks the
    /// account and restarts the count.
    pub fn record_access_failure(
        &mut self,
        id: &str,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let user = self.user_mut(id)?;
        user.access_failed_count = user.access_failed_count.saturating_add(1);
        if user.access_failed_count >= policy.max_failed_attempts {
            user.lockout_end = Some(now + policy.duration);
            user.access_failed_count = 0;
        }
        user.updated_at = Some(now);
        Ok(user.clone())
    }

    pub fn reset_access_failures(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let user = self.user_mut(id)?;
        if user.access_failed_count > 0 || user.lockout_end.is_some() {
            user.access_failed_count = 0;
            user.lockout_end = None;
            user.updated_at = Some(now);
        }
        Ok(())
    }

    /// Attach an external login; linking the same login twice is a no-op.
    /// A login already held by another account is `AlreadyExists`.
    pub fn add_login(
        &mut self,
        id: &str,
        login: ExternalLogin,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let held_elsewhere = self.users.values().any(|u| {
            u.id != id
                && u.logins
                    .iter()
                    .any(|l| l.provider == login.provider && l.provider_key == login.provider_key)
        });
        if held_elsewhere {
            return Err(ServiceError::AlreadyExists(format!(
                "login: {}/{}",
                login.provider, login.provider_key
            )));
        }
        let user = self.user_mut(id)?;
        if !user.logins.contains(&login) {
            user.logins.push(login);
            user.updated_at = Some(now);
        }
        Ok(user.clone())
    }

    pub fn delete_user(&mut self, id: &str) -> Result<()> {
        self.users
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("user: {}", id)))
    }

    pub fn find_role(&self, id: &str) -> Option<Role> {
        self.roles.get(id).cloned()
    }

    pub fn find_role_by_name(&self, name: &str) -> Option<Role> {
        let key = normalize(name);
        self.roles
            .values()
            .find(|r| normalize(&r.name) == key)
            .cloned()
    }

    pub fn list_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    pub fn insert_role(&mut self, role: Role) -> Result<()> {
        if self.roles.contains_key(&role.id) || self.role_name_taken(&role.name, None) {
            return Err(ServiceError::AlreadyExists(format!("role: {}", role.name)));
        }
        self.roles.insert(role.id.clone(), role);
        Ok(())
    }

    pub fn update_role(&mut self, role: Role) -> Result<()> {
        if !self.roles.contains_key(&role.id) {
            return Err(ServiceError::NotFound(format!("role: {}", role.id)));
        }
        if self.role_name_taken(&role.name, Some(&role.id)) {
            return Err(ServiceError::AlreadyExists(format!("role: {}", role.name)));
        }
        self.roles.insert(role.id.clone(), role);
        Ok(())
    }

    pub fn delete_role(&mut self, id: &str) -> Result<()> {
        if self.roles.remove(id).is_none() {
            return Err(ServiceError::NotFound(format!("role: {}", id)));
        }
        for user in self.users.values_mut() {
            user.role_ids.retain(|rid| rid != id);
        }
        Ok(())
    }

    pub fn insert_book(&mut self, model: BookModel) -> Book {
        self.next_book_id += 1;
        let book = Book {
            id: self.next_book_id,
            title: model.title,
            description: model.description,
        };
        self.books.insert(book.id, book.clone());
        book
    }

    pub fn find_book(&self, id: u64) -> Option<Book> {
        self.books.get(&id).cloned()
    }

    pub fn list_books(&self) -> Vec<Book> {
        self.books.values().cloned().collect()
    }

    pub fn update_book(&mut self, book: Book) -> Result<()> {
        match self.books.get_mut(&book.id) {
            Some(slot) => {
                *slot = book;
                Ok(())
            }
            None => Err(ServiceError::NotFound(format!("book: {}", book.id))),
        }
    }

    pub fn delete_book(&mut self, id: u64) -> bool {
        self.books.remove(&id).is_some()
    }

    fn check_unique(&self, user: &User, except_id: Option<&str>) -> Result<()> {
        if self.email_taken(&user.email, except_id) {
            return Err(ServiceError::AlreadyExists(format!("email: {}", user.email)));
        }
        if self.username_taken(&user.username, except_id) {
            return Err(ServiceError::AlreadyExists(format!("username: {}", user.username)));
        }
        Ok(())
    }

    fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        let key = normalize(email);
        self.users
            .values()
            .any(|u| Some(u.id.as_str()) != except_id && normalize(&u.email) == key)
    }

    fn username_taken(&self, username: &str, except_id: Option<&str>) -> bool {
        let key = normalize(username);
        self.users
            .values()
            .any(|u| Some(u.id.as_str()) != except_id && normalize(&u.username) == key)
    }

    fn role_name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        let key = normalize(name);
        self.roles
            .values()
            .any(|r| Some(r.id.as_str()) != except_id && normalize(&r.name) == key)
    }
}
