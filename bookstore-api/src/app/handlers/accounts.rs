//! Account handlers: signup, sign-in, external login, current identity

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bookstore_core::identity::ExternalLoginInfo;
use bookstore_core::{AuthToken, SignInRequest, SignUpRequest, SignUpResult};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use super::super::error::ApiError;
use super::super::json::ApiJson;
use super::super::middleware::{AuthInfo, ClientIp};
use super::super::rate_limit::AuthAction;
use super::super::state::AppState;

const EXTERNAL_LOGIN_KEY_HEADER: &str = "X-External-Login-Key";

/// POST /api/accounts/signup
pub async fn sign_up(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResult>), ApiError> {
    state.throttle.check(AuthAction::SignUp, &ip).await?;
    let result = state.identity.sign_up(req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /api/accounts/signin
pub async fn sign_in(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<Json<AuthToken>, ApiError> {
    state.throttle.check(AuthAction::SignIn, &ip).await?;
    let token = state.identity.sign_in(&req.email, &req.password).await?;
    Ok(Json(token))
}

/// POST /api/accounts/external-login
///
/// Called by the bridge that completed the provider handshake. Requires the
/// shared key; the route answers 404 when no key is configured.
pub async fn external_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(info): ApiJson<ExternalLoginInfo>,
) -> Result<Json<AuthToken>, ApiError> {
    let Some(expected) = state.external_login_key.as_deref() else {
        return Err(ApiError::not_found("external login is not enabled"));
    };
    let presented = headers
        .get(EXTERNAL_LOGIN_KEY_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if !bool::from(presented.ct_eq(expected.as_bytes())) {
        return Err(ApiError::unauthorized());
    }
    let token = state.identity.external_sign_in(info).await?;
    Ok(Json(token))
}

/// GET /api/accounts/me
pub async fn me(auth: AuthInfo) -> Json<Value> {
    Json(json!({
        "email": auth.claims.email(),
        "roles": auth.claims.roles(),
        "jti": auth.claims.jti(),
        "expires_at": auth.claims.exp,
    }))
}
