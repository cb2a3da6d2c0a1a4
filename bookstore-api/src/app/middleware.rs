use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use bookstore_core::identity::{ADMIN_ROLE, DEFAULT_ROLE};
use bookstore_core::TokenClaims;

use super::error::ApiError;
use super::state::AppState;

/// Verified bearer token attached to the request.
#[derive(Debug, Clone)]
pub struct AuthInfo {
	pub claims: TokenClaims,
}

impl AuthInfo {
	pub fn email(&self) -> Option<String> {
		self.claims.email()
	}

	pub fn is_admin(&self) -> bool {
		self.claims.has_role(ADMIN_ROLE)
	}

	pub fn is_customer(&self) -> bool {
		self.claims.has_role(DEFAULT_ROLE)
	}
}

impl<S: Send + Sync> FromRequestParts<S> for AuthInfo {
	type Rejection = ApiError;

	fn from_request_parts<'a, 'b, 'c>(
		parts: &'a mut Parts,
		_state: &'b S,
	) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'c>>
	where
		'a: 'c,
		'b: 'c,
	{
		Box::pin(async move {
			parts
				.extensions
				.get::<AuthInfo>()
				.cloned()
				.ok_or_else(ApiError::unauthorized)
		})
	}
}

/// Extractor that requires the `Admin` role
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthInfo);

impl<S: Send + Sync> FromRequestParts<S> for RequireAdmin {
	type Rejection = ApiError;

	fn from_request_parts<'a, 'b, 'c>(
		parts: &'a mut Parts,
		state: &'b S,
	) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'c>>
	where
		'a: 'c,
		'b: 'c,
	{
		Box::pin(async move {
			let auth = AuthInfo::from_request_parts(parts, state).await?;
			if !auth.is_admin() {
				return Err(ApiError::forbidden("admin role required"));
			}
			Ok(RequireAdmin(auth))
		})
	}
}

/// Extractor that requires the `Customer` role
#[derive(Debug, Clone)]
pub struct RequireCustomer(#[allow(dead_code)] pub AuthInfo);

impl<S: Send + Sync> FromRequestParts<S> for RequireCustomer {
	type Rejection = ApiError;

	fn from_request_parts<'a, 'b, 'c>(
		parts: &'a mut Parts,
		state: &'b S,
	) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'c>>
	where
		'a: 'c,
		'b: 'c,
	{
		Box::pin(async move {
			let auth = AuthInfo::from_request_parts(parts, state).await?;
			if !auth.is_customer() {
				return Err(ApiError::forbidden("customer role required"));
			}
			Ok(RequireCustomer(auth))
		})
	}
}

/// Policy check: the caller's account must hold `claim`, directly or via a role.
pub async fn require_claim(state: &AppState, auth: &AuthInfo, claim: &str) -> Result<(), ApiError> {
	let email = auth.email().ok_or_else(ApiError::unauthorized)?;
	if state.identity.has_claim(&email, claim).await? {
		Ok(())
	} else {
		Err(ApiError::forbidden(format!("missing claim: {}", claim)))
	}
}

/// Client IP for throttling
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
	type Rejection = ApiError;

	fn from_request_parts<'a, 'b, 'c>(
		parts: &'a mut Parts,
		state: &'b AppState,
	) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'c>>
	where
		'a: 'c,
		'b: 'c,
	{
		Box::pin(async move {
			let socket = parts
				.extensions
				.get::<ConnectInfo<SocketAddr>>()
				.map(|ci| ci.0);
			Ok(ClientIp(client_ip(&parts.headers, socket, state.trust_proxy)))
		})
	}
}

/// Paths reachable without a token
const PUBLIC_PATHS: &[&str] = &[
	"/health",
	"/api/accounts/signup",
	"/api/accounts/signin",
	"/api/accounts/external-login",
];

fn extract_token(request: &Request<Body>) -> Option<String> {
	request
		.headers()
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(|t| t.trim().to_string())
		.filter(|t| !t.is_empty())
}

/// Socket address, unless `trust_proxy` is set; then X-Real-IP, then the
/// first X-Forwarded-For entry take precedence.
fn client_ip(headers: &HeaderMap, socket: Option<SocketAddr>, trust_proxy: bool) -> String {
	if trust_proxy {
		if let Some(ip) = forwarded_ip(headers) {
			return ip;
		}
	}

	socket
		.map(|addr| addr.ip().to_string())
		.unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
	if let Some(real_ip) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
		return Some(real_ip.trim().to_string());
	}
	headers
		.get("X-Forwarded-For")
		.and_then(|v| v.to_str().ok())
		.and_then(|forwarded| forwarded.split(',').next())
		.map(str::trim)
		.filter(|ip| !ip.is_empty())
		.map(str::to_string)
}

pub async fn auth_middleware(
	State(state): State<AppState>,
	mut request: Request<Body>,
	next: Next,
) -> Result<Response, ApiError> {
	let path = request.uri().path().to_string();

	if PUBLIC_PATHS.iter().any(|p| path == *p) {
		return Ok(next.run(request).await);
	}

	let token = extract_token(&request).ok_or_else(ApiError::unauthorized)?;
	let claims = match state.identity.verify_token(&token) {
		Ok(c) => c,
		Err(e) => {
			tracing::debug!(path = %path, error = %e, "rejected bearer token");
			return Err(ApiError::unauthorized_with_message("invalid or expired token"));
		}
	};

	request.extensions_mut().insert(AuthInfo { claims });
	Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	#[test]
	fn proxy_headers_only_count_when_trusted() {
		let socket: SocketAddr = "192.0.2.1:4000".parse().unwrap();
		let mut headers = HeaderMap::new();
		assert_eq!(client_ip(&headers, Some(socket), true), "192.0.2.1");
		assert_eq!(client_ip(&headers, None, false), "unknown");

		headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
		assert_eq!(client_ip(&headers, Some(socket), true), "203.0.113.9");
		assert_eq!(client_ip(&headers, Some(socket), false), "192.0.2.1");

		headers.insert("X-Real-IP", HeaderValue::from_static("198.51.100.7"));
		assert_eq!(client_ip(&headers, Some(socket), true), "198.51.100.7");
		assert_eq!(client_ip(&headers, Some(socket), false), "192.0.2.1");
	}
}
