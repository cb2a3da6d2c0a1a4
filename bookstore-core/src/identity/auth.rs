//! Sign-in: credential checks, lockout, token issuance and external logins

use super::claims::build_claims;
use super::models::*;
use super::token::TokenClaims;
use super::IdentityManager;
use crate::error::{Result, ServiceError};
use chrono::Utc;
use tracing::{info, instrument, warn};

impl IdentityManager {
    /// Check an email/password pair. Unknown email, password-less account
    /// and wrong password all fail with the same `Unauthorized` error.
    /// Returns the user and its role names.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, Vec<String>)> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            warn!("sign-in failed: invalid credentials");
            return Err(ServiceError::invalid_credentials());
        };

        if self.lockout.is_some() {
            let now = Utc::now();
            if user.is_locked_out(now) {
                warn!(user_id = %user.id, "sign-in refused: account locked out");
                return Err(ServiceError::LockedOut(user.lockout_end.unwrap_or(now)));
            }
        }

        if !Self::check_password(&user, password).await? {
            self.record_failed_access(&user.id).await?;
            warn!("sign-in failed: invalid credentials");
            return Err(ServiceError::invalid_credentials());
        }

        if self.lockout.is_some() {
            self.store
                .reset_access_failures(&user.id, Utc::now())
                .await?;
        }

        let roles = self.role_names(&user).await?;
        Ok((user, roles))
    }

    /// Count a failed comparison. The increment happens inside the store so
    /// concurrent failures are never lost.
    async fn record_failed_access(&self, user_id: &str) -> Result<()> {
        let Some(policy) = self.lockout else {
            return Ok(());
        };
        let now = Utc::now();
        let user = self
            .store
            .record_access_failure(user_id, policy, now)
            .await?;
        if user.lockout_end == Some(now + policy.duration) {
            warn!(user_id = %user_id, "account locked out after repeated failures");
        }
        Ok(())
    }

    /// Build the claim set for `user` and sign it.
    pub(super) fn issue_for(&self, user: &User, roles: &[String]) -> Result<AuthToken> {
        let claims = build_claims(&user.email, roles);
        let issued = self.issuer.issue(&claims)?;
        Ok(AuthToken {
            access_token: issued.token,
            token_type: "Bearer".to_string(),
            expires_in: self.issuer.lifetime().num_seconds(),
            warning: None,
        })
    }

    /// Email/password sign-in returning a bearer token.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthToken> {
        let (user, roles) = self.verify_credentials(email, password).await?;
        let token = self.issue_for(&user, &roles)?;
        info!(user_id = %user.id, "user signed in");
        Ok(token)
    }

    /// Verify a bearer token. Stateless: the store is not consulted.
    pub fn verify_token(&self, token: &str) -> Result<TokenClaims> {
        self.issuer.decode(token)
    }

    /// Sign in with an identity already vouched for by an external provider.
    ///
    /// A known login signs straight in. Otherwise the login is linked to the
    /// account with the provider's email, creating a password-less account
    /// (with the default role) when there is none.
    #[instrument(skip(self, info), fields(provider = %info.provider))]
    pub async fn external_sign_in(&self, info: ExternalLoginInfo) -> Result<AuthToken> {
        if let Some(user) = self
            .store
            .find_user_by_login(&info.provider, &info.provider_key)
            .await?
        {
            let roles = self.role_names(&user).await?;
            info!(user_id = %user.id, "external sign-in");
            return self.issue_for(&user, &roles);
        }

        let email = info
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ServiceError::invalid("email", "external provider did not supply an email")
            })?;

        let mut warning = None;
        let user = match self.store.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                let user = Self::new_user(
                    email,
                    None,
                    info.first_name.clone().unwrap_or_default(),
                    info.last_name.clone().unwrap_or_default(),
                );
                self.store.insert_user(user.clone()).await?;
                info!(user_id = %user.id, "created account from external login");
                let outcome = self.finish_sign_up(user).await;
                warning = outcome.warning;
                self.get_user(&outcome.user.id).await?
            }
        };

        let login = ExternalLogin {
            provider: info.provider,
            provider_key: info.provider_key,
        };
        let user = self.store.add_login(&user.id, login, Utc::now()).await?;
        info!(user_id = %user.id, "linked external login");

        let roles = self.role_names(&user).await?;
        let mut token = self.issue_for(&user, &roles)?;
        token.warning = warning;
        Ok(token)
    }
}
