//! Role, user and claim administration (Admin role only)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bookstore_core::identity::{
    claims_catalog, ChangePasswordRequest, Claim, ClaimSelection, CreateRoleRequest, Role,
    RoleDetails, RoleMemberSelection, UpdateRoleRequest, UpdateUserRequest, UserDetails,
};
use bookstore_core::UserSummary;
use serde::Deserialize;

use super::super::error::ApiError;
use super::super::json::ApiJson;
use super::super::middleware::{require_claim, RequireAdmin};
use super::super::state::AppState;

const EDIT_ROLE_CLAIM: &str = "Edit Role";
const DELETE_ROLE_CLAIM: &str = "Delete Role";

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// GET /api/admin/roles
pub async fn list_roles(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(state.identity.list_roles().await?))
}

/// POST /api/admin/roles
pub async fn create_role(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiJson(req): ApiJson<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let role = state.identity.create_role(req).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// GET /api/admin/roles/:id - needs "Edit Role"
pub async fn get_role(
    State(state): State<AppState>,
    RequireAdmin(auth): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<RoleDetails>, ApiError> {
    require_claim(&state, &auth, EDIT_ROLE_CLAIM).await?;
    Ok(Json(state.identity.get_role_details(&id).await?))
}

/// PUT /api/admin/roles/:id - needs "Edit Role"
pub async fn update_role(
    State(state): State<AppState>,
    RequireAdmin(auth): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<Json<Role>, ApiError> {
    require_claim(&state, &auth, EDIT_ROLE_CLAIM).await?;
    Ok(Json(state.identity.update_role(&id, req).await?))
}

/// DELETE /api/admin/roles/:id - needs "Delete Role"
pub async fn delete_role(
    State(state): State<AppState>,
    RequireAdmin(auth): RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_claim(&state, &auth, DELETE_ROLE_CLAIM).await?;
    state.identity.delete_role(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/roles/:id/users
pub async fn edit_role_members(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(selections): ApiJson<Vec<RoleMemberSelection>>,
) -> Result<Json<RoleDetails>, ApiError> {
    Ok(Json(state.identity.edit_role_members(&id, selections).await?))
}

/// PUT /api/admin/roles/:id/claims
pub async fn set_role_claims(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(selections): ApiJson<Vec<ClaimSelection>>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    Ok(Json(state.identity.set_role_claims(&id, selections).await?))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.identity.list_users().await?))
}

/// GET /api/admin/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<UserDetails>, ApiError> {
    Ok(Json(state.identity.get_user_details(&id).await?))
}

/// PUT /api/admin/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    Ok(Json(state.identity.update_user(&id, req).await?))
}

/// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.identity.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RoleNamesRequest {
    pub roles: Vec<String>,
}

/// PUT /api/admin/users/:id/roles
pub async fn set_user_roles(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RoleNamesRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.identity.set_user_roles(&id, req.roles).await?))
}

/// PUT /api/admin/users/:id/claims
pub async fn set_user_claims(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(selections): ApiJson<Vec<ClaimSelection>>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    Ok(Json(state.identity.set_user_claims(&id, selections).await?))
}

/// POST /api/admin/users/:id/password - admins may skip the current password
pub async fn change_password(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    let force = req.current_password.is_none();
    let user = state
        .identity
        .change_password(&id, req.current_password.as_deref(), &req.new_password, force)
        .await?;
    Ok(Json(user))
}

/// GET /api/admin/claims
pub async fn list_claims(RequireAdmin(_): RequireAdmin) -> Json<Vec<Claim>> {
    Json(claims_catalog())
}
