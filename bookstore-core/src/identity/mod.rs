//! Identity: accounts, roles, claims and bearer tokens

mod auth;
mod claims;
mod manager;
mod models;
mod password;
mod roles;
mod token;

pub use claims::{build_claims, claim_types, claims_catalog, CLAIMS_CATALOG};
pub use manager::{IdentityManager, LockoutPolicy, ADMIN_ROLE, DEFAULT_ROLE};
pub use models::{
    AuthToken, ChangePasswordRequest, Claim, ClaimSelection, CreateRoleRequest, ExternalLogin,
    ExternalLoginInfo, Role, RoleDetails, RoleMemberSelection, SignInRequest, SignUpRequest,
    SignUpResult, SignUpStage, UpdateRoleRequest, UpdateUserRequest, User, UserDetails,
    UserSummary,
};
pub use password::{password_errors, MIN_PASSWORD_LENGTH, MIN_UNIQUE_CHARS};
pub use token::{IssuedToken, JwtSettings, TokenClaims, TokenIssuer, DEFAULT_TOKEN_LIFETIME_MINUTES};
