//! Identity data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// A typed key/value assertion about a user or role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Link between a local account and an external login provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLogin {
    pub provider: String,
    pub provider_key: String,
}

/// User account (storage model, includes the password hash)
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// UUID
    pub id: String,
    /// Unique, compared case-insensitively
    pub email: String,
    pub username: String,
    /// bcrypt hash; `None` for accounts created through an external login
    pub password_hash: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role_ids: Vec<String>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub logins: Vec<ExternalLogin>,
    #[serde(default)]
    pub access_failed_count: u32,
    pub lockout_end: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_end.map(|end| end > now).unwrap_or(false)
    }
}

/// Role record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    /// Unique, compared case-insensitively
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

/// Signup request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Sign-in request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Provider data handed over once an external handshake has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLoginInfo {
    pub provider: String,
    pub provider_key: String,
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Progress of a signup through provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignUpStage {
    Unregistered,
    /// User stored, default role not assigned
    Created,
    RoleAssigned,
    Complete,
}

/// Signup outcome. `stage == Created` means the account exists but the
/// default role could not be assigned; `warning` carries the reason.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpResult {
    pub succeeded: bool,
    pub stage: SignUpStage,
    pub user: UserSummary,
    pub warning: Option<String>,
}

/// Sign-in response
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    /// Signed JWT
    pub access_token: String,
    pub token_type: String,
    /// Seconds until expiry
    pub expires_in: i64,
    /// Set when an account created on the fly could not be fully provisioned
    #[serde(default)]
    pub warning: Option<String>,
}

/// Admin edit of a user's profile
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// One row of a role membership edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleMemberSelection {
    pub user_id: String,
    pub is_selected: bool,
}

/// One row of a claim assignment edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSelection {
    pub claim_type: String,
    pub is_selected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: Option<String>,
    pub new_password: String,
}

/// User listing item (no secrets)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: user.created_at,
        }
    }
}

/// User with resolved role names and claim values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: UserSummary,
    pub roles: Vec<String>,
    pub claims: Vec<String>,
}

/// Role with member usernames and claim values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDetails {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub users: Vec<String>,
    pub claims: Vec<String>,
}
