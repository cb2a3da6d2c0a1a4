use bookstore_core::{BookRepository, IdentityManager};
use std::sync::Arc;

use super::rate_limit::AuthThrottle;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityManager>,
    pub books: Arc<BookRepository>,
    /// Shared key the external-login bridge presents; `None` disables the route
    pub external_login_key: Option<String>,
    /// Sign-in and signup throttle, per client IP
    pub throttle: Arc<AuthThrottle>,
    /// Honour X-Real-IP / X-Forwarded-For; only behind a proxy that sets them
    pub trust_proxy: bool,
}
