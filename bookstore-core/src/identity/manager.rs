//! Identity manager: core structure, signup and user administration

use super::models::*;
use super::password::password_errors;
use super::token::TokenIssuer;
use crate::error::{FieldError, Result, ServiceError};
use crate::store::IdentityStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_ROLE: &str = "Customer";
pub const ADMIN_ROLE: &str = "Admin";

/// Failed sign-ins allowed before an account is locked, and for how long.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            duration: Duration::minutes(5),
        }
    }
}

/// Signup, sign-in and user/role/claim administration over an
/// [`IdentityStore`].
#[derive(Clone)]
pub struct IdentityManager {
    pub(super) store: Arc<dyn IdentityStore>,
    pub(super) issuer: TokenIssuer,
    /// Role every new account is placed in
    pub(super) default_role: String,
    /// `None` disables lockout
    pub(super) lockout: Option<LockoutPolicy>,
    pub(super) password_cost: u32,
}

// ============================================================================
// Construction
// ============================================================================

impl IdentityManager {
    pub fn new(store: Arc<dyn IdentityStore>, issuer: TokenIssuer) -> Self {
        Self {
            store,
            issuer,
            default_role: DEFAULT_ROLE.to_string(),
            lockout: None,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = role.into();
        self
    }

    pub fn with_lockout(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = Some(policy);
        self
    }

    /// bcrypt work factor for new hashes
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

fn email_errors(email: &str) -> Vec<FieldError> {
    if email.is_empty() {
        return vec![FieldError::new("email", "email is required")];
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid && !email.chars().any(char::is_whitespace) {
        Vec::new()
    } else {
        vec![FieldError::new("email", "not a valid email address")]
    }
}

impl IdentityManager {
    pub(super) async fn get_user(&self, id: &str) -> Result<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user: {}", id)))
    }

    /// Names of the roles a user belongs to; dangling ids are skipped.
    pub(super) async fn role_names(&self, user: &User) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(user.role_ids.len());
        for id in &user.role_ids {
            if let Some(role) = self.store.find_role(id).await? {
                names.push(role.name);
            }
        }
        Ok(names)
    }

    pub(super) fn new_user(
        email: &str,
        password_hash: Option<String>,
        first_name: String,
        last_name: String,
    ) -> User {
        let now = Utc::now();
        User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            username: email.to_string(),
            password_hash,
            first_name,
            last_name,
            role_ids: vec![],
            claims: vec![],
            logins: vec![],
            access_failed_count: 0,
            lockout_end: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Place a freshly stored user in the default role. A provisioning
    /// failure leaves the account in `Created` and is reported, not raised.
    pub(super) async fn finish_sign_up(&self, user: User) -> SignUpResult {
        debug!(user_id = %user.id, stage = ?SignUpStage::Created, "signup stage");
        match self.provision_default_role(&user.id).await {
            Ok(()) => {
                debug!(user_id = %user.id, stage = ?SignUpStage::RoleAssigned, "signup stage");
                SignUpResult {
                    succeeded: true,
                    stage: SignUpStage::Complete,
                    user: user.into(),
                    warning: None,
                }
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "default role assignment failed");
                SignUpResult {
                    succeeded: true,
                    stage: SignUpStage::Created,
                    user: user.into(),
                    warning: Some(e.to_string()),
                }
            }
        }
    }
}

// ============================================================================
// Signup and user administration
// ============================================================================

impl IdentityManager {
    /// Register a local account and place it in the default role.
    ///
    /// Input problems come back as one `Validation` error listing every
    /// failing field, with nothing stored. A second signup for the same email
    /// fails with `AlreadyExists`.
    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn sign_up(&self, req: SignUpRequest) -> Result<SignUpResult> {
        let email = req.email.trim();
        let mut errors = email_errors(email);
        errors.extend(password_errors(&req.password));
        if let Some(confirm) = &req.confirm_password {
            if *confirm != req.password {
                errors.push(FieldError::new(
                    "confirm_password",
                    "password and confirmation do not match",
                ));
            }
        }
        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors));
        }

        let password_hash = self.hash_password(&req.password).await?;
        let user = Self::new_user(
            email,
            Some(password_hash),
            req.first_name.trim().to_string(),
            req.last_name.trim().to_string(),
        );
        self.store.insert_user(user.clone()).await?;
        info!(user_id = %user.id, "user signed up");

        Ok(self.finish_sign_up(user).await)
    }

    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let users = self.store.list_users().await?;
        Ok(users.into_iter().map(UserSummary::from).collect())
    }

    /// User with role names and claim values.
    #[instrument(skip(self))]
    pub async fn get_user_details(&self, id: &str) -> Result<UserDetails> {
        let user = self.get_user(id).await?;
        let roles = self.role_names(&user).await?;
        let claims = user.claims.iter().map(|c| c.value.clone()).collect();
        Ok(UserDetails {
            user: user.into(),
            roles,
            claims,
        })
    }

    /// Look a user up by email (case-insensitive).
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserSummary>> {
        Ok(self
            .store
            .find_user_by_email(email)
            .await?
            .map(UserSummary::from))
    }

    #[instrument(skip(self, req))]
    pub async fn update_user(&self, id: &str, req: UpdateUserRequest) -> Result<UserSummary> {
        let mut user = self.get_user(id).await?;

        if let Some(email) = req.email {
            let email = email.trim().to_string();
            let errors = email_errors(&email);
            if !errors.is_empty() {
                return Err(ServiceError::Validation(errors));
            }
            user.email = email;
        }
        if let Some(username) = req.username {
            if username.trim().is_empty() {
                return Err(ServiceError::invalid("username", "username is required"));
            }
            user.username = username.trim().to_string();
        }
        if let Some(first_name) = req.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name.trim().to_string();
        }
        user.updated_at = Some(Utc::now());

        self.store.update_user(user.clone()).await?;
        info!(user_id = %id, "updated user");
        Ok(user.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.store.delete_user(id).await?;
        info!(user_id = %id, "deleted user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::{manager, manager_with, RoleCreationFails, TEST_PASSWORD};

    fn request(email: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: TEST_PASSWORD.into(),
            confirm_password: None,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        }
    }

    #[tokio::test]
    async fn sign_up_creates_user_with_default_role() {
        let mgr = manager();
        let result = mgr.sign_up(request("a@x.com")).await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.stage, SignUpStage::Complete);
        assert_eq!(result.user.username, "a@x.com");

        let details = mgr.get_user_details(&result.user.id).await.unwrap();
        assert_eq!(details.roles, vec![DEFAULT_ROLE.to_string()]);
        assert_eq!(mgr.list_roles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_sign_up_reuses_role() {
        let mgr = manager();
        mgr.sign_up(request("a@x.com")).await.unwrap();
        mgr.sign_up(request("b@x.com")).await.unwrap();
        assert_eq!(mgr.list_roles().await.unwrap().len(), 1);
        assert_eq!(mgr.list_users().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn resubmitted_sign_up_is_rejected() {
        let mgr = manager();
        mgr.sign_up(request("a@x.com")).await.unwrap();
        let err = mgr.sign_up(request("A@x.com")).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));
        assert_eq!(mgr.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_stores_nothing() {
        let mgr = manager();
        let mut req = request("not-an-email");
        req.password = "short".into();
        req.confirm_password = Some("different".into());

        let err = mgr.sign_up(req).await.unwrap_err();
        let ServiceError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.iter().any(|e| e.field == "email"));
        assert!(errors.iter().any(|e| e.field == "password"));
        assert!(errors.iter().any(|e| e.field == "confirm_password"));
        assert!(mgr.list_users().await.unwrap().is_empty());
        assert!(mgr.list_roles().await.unwrap().is_empty());
    }

    #[test]
    fn email_shapes() {
        assert!(email_errors("a@x.com").is_empty());
        assert!(!email_errors("").is_empty());
        assert!(!email_errors("@x.com").is_empty());
        assert!(!email_errors("a@x").is_empty());
        assert!(!email_errors("a@b@x.com").is_empty());
        assert!(!email_errors("a b@x.com").is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_user() {
        let mgr = manager();
        let user = mgr.create_test_user("old@x.com").await;
        let updated = mgr
            .update_user(
                &user.id,
                UpdateUserRequest {
                    email: Some("new@x.com".into()),
                    first_name: Some("Grace".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "new@x.com");
        assert_eq!(updated.first_name, "Grace");
        assert!(mgr.find_by_email("NEW@x.com").await.unwrap().is_some());

        mgr.delete_user(&user.id).await.unwrap();
        let err = mgr.get_user_details(&user.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn username_cannot_be_taken_twice() {
        let mgr = manager();
        let a = mgr.create_test_user("a@x.com").await;
        let b = mgr.create_test_user("b@x.com").await;

        let err = mgr
            .update_user(
                &b.id,
                UpdateUserRequest {
                    username: Some("A@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));

        let users = mgr.list_users().await.unwrap();
        let holders: Vec<_> = users.iter().filter(|u| u.username == "a@x.com").collect();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].id, a.id);
    }

    #[tokio::test]
    async fn role_failure_keeps_the_account() {
        let mgr = manager_with(Arc::new(RoleCreationFails::default()));
        let result = mgr.sign_up(request("a@x.com")).await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.stage, SignUpStage::Created);
        assert!(result.warning.is_some());

        let stored = mgr.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, result.user.id);
        let details = mgr.get_user_details(&stored.id).await.unwrap();
        assert!(details.roles.is_empty());

        // the account is usable, just without the default role
        assert!(mgr.sign_in("a@x.com", TEST_PASSWORD).await.is_ok());
    }
}
