//! Per-client throttling of the credential endpoints

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::error::ApiError;

/// Clients tracked before idle entries are swept out
const SWEEP_AT: usize = 4096;

/// Attempts one client may make per window.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub attempts: usize,
    pub window: Duration,
}

impl Quota {
    pub const fn new(attempts: usize, window: Duration) -> Self {
        Self { attempts, window }
    }
}

/// Credential endpoint being attempted; each has its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthAction {
    SignIn,
    SignUp,
}

impl AuthAction {
    fn label(self) -> &'static str {
        match self {
            AuthAction::SignIn => "sign-in",
            AuthAction::SignUp => "signup",
        }
    }
}

/// Sliding-window attempt log per (endpoint, client).
#[derive(Debug)]
pub struct AuthThrottle {
    sign_in: Quota,
    sign_up: Quota,
    log: Mutex<HashMap<(AuthAction, String), VecDeque<Instant>>>,
}

impl AuthThrottle {
    pub fn new(sign_in: Quota, sign_up: Quota) -> Self {
        Self {
            sign_in,
            sign_up,
            log: Mutex::new(HashMap::new()),
        }
    }

    fn quota(&self, action: AuthAction) -> Quota {
        match action {
            AuthAction::SignIn => self.sign_in,
            AuthAction::SignUp => self.sign_up,
        }
    }

    /// Count an attempt by `client`; over quota is a 429.
    pub async fn check(&self, action: AuthAction, client: &str) -> Result<(), ApiError> {
        match self.admit(action, client, Instant::now()).await {
            None => Ok(()),
            Some(wait) => {
                tracing::warn!(client = %client, action = action.label(), "throttled");
                Err(ApiError::too_many_requests(format!(
                    "too many {} attempts, retry in {}s",
                    action.label(),
                    wait.as_secs().max(1)
                )))
            }
        }
    }

    /// `None` when the attempt is admitted, otherwise the time until the
    /// oldest logged attempt leaves the window. Refused attempts are not
    /// logged.
    async fn admit(&self, action: AuthAction, client: &str, now: Instant) -> Option<Duration> {
        let quota = self.quota(action);
        let mut log = self.log.lock().await;

        if log.len() >= SWEEP_AT {
            log.retain(|(a, _), times| {
                let window = self.quota(*a).window;
                times
                    .back()
                    .is_some_and(|last| now.duration_since(*last) < window)
            });
        }

        let times = log.entry((action, client.to_owned())).or_default();
        while times
            .front()
            .is_some_and(|first| now.duration_since(*first) >= quota.window)
        {
            times.pop_front();
        }

        if times.len() < quota.attempts {
            times.push_back(now);
            return None;
        }
        let wait = times.front().map_or(quota.window, |first| {
            quota.window.saturating_sub(now.duration_since(*first))
        });
        Some(wait)
    }
}
