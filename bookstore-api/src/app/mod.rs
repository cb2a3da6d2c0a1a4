mod error;
mod handlers;
mod json;
mod middleware;
mod rate_limit;
mod router;
mod state;

#[cfg(test)]
mod tests;

pub use rate_limit::{AuthThrottle, Quota};
pub use router::app_router;
pub use state::AppState;
