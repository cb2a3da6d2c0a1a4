//! Password policy, bcrypt hashing and password changes

use super::models::*;
use super::IdentityManager;
use crate::error::{FieldError, Result, ServiceError};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{info, instrument};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MIN_UNIQUE_CHARS: usize = 4;

/// Every rule `password` breaks, one entry each.
pub fn password_errors(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new("password", "must contain a digit ('0'-'9')"));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        errors.push(FieldError::new(
            "password",
            "must contain a lowercase letter ('a'-'z')",
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        errors.push(FieldError::new(
            "password",
            "must contain an uppercase letter ('A'-'Z')",
        ));
    }
    if password.chars().all(|c| c.is_alphanumeric()) {
        errors.push(FieldError::new(
            "password",
            "must contain a non-alphanumeric character",
        ));
    }
    if password.chars().collect::<HashSet<_>>().len() < MIN_UNIQUE_CHARS {
        errors.push(FieldError::new(
            "password",
            format!("must use at least {} different characters", MIN_UNIQUE_CHARS),
        ));
    }
    errors
}

/// bcrypt is slow on purpose, so it runs on the blocking pool.
async fn bcrypt_blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> bcrypt::BcryptResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| ServiceError::Other(format!("password task aborted: {}", e)))?
        .map_err(|e| ServiceError::Other(format!("bcrypt: {}", e)))
}

impl IdentityManager {
    /// Hash with the manager's work factor.
    pub(super) async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_owned();
        let cost = self.password_cost;
        bcrypt_blocking(move || bcrypt::hash(password, cost)).await
    }

    /// Whether `password` matches the account's local password. Accounts
    /// created through an external login have none and never match.
    pub(super) async fn check_password(user: &User, password: &str) -> Result<bool> {
        let Some(hash) = user.password_hash.clone() else {
            return Ok(false);
        };
        let password = password.to_owned();
        bcrypt_blocking(move || bcrypt::verify(password, &hash)).await
    }

    pub(super) fn validate_password_strength(password: &str) -> Result<()> {
        let errors = password_errors(password);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(errors))
        }
    }

    /// Change a password. Without `force` the current password must match.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        id: &str,
        current_password: Option<&str>,
        new_password: &str,
        force: bool,
    ) -> Result<UserSummary> {
        let user = self.get_user(id).await?;

        Self::validate_password_strength(new_password)?;
        if !force {
            let current = current_password.ok_or_else(|| {
                ServiceError::invalid("current_password", "current password is required")
            })?;
            if !Self::check_password(&user, current).await? {
                return Err(ServiceError::Unauthorized("current password is wrong".into()));
            }
        }

        let hash = self.hash_password(new_password).await?;

        // re-read so edits made while hashing are kept
        let mut user = self.get_user(id).await?;
        user.password_hash = Some(hash);
        user.access_failed_count = 0;
        user.lockout_end = None;
        user.updated_at = Some(Utc::now());
        self.store.update_user(user.clone()).await?;

        info!(user_id = %id, "password changed");
        Ok(user.into())
    }
}
