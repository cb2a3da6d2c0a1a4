mod app;

use app::{app_router, AppState, AuthThrottle, Quota};
use bookstore_core::identity::DEFAULT_TOKEN_LIFETIME_MINUTES;
use bookstore_core::{
    BookRepository, BookStore, FileStore, IdentityManager, IdentityStore, JwtSettings,
    LockoutPolicy, MemoryStore, TokenIssuer,
};
use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `BOOKSTORE_DATA_DIR` value that selects the volatile store
const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone)]
struct ApiConfig {
    bind: SocketAddr,
    data_dir: PathBuf,
    jwt: JwtSettings,
    /// 0 disables lockout
    lockout_attempts: u32,
    /// Allowed CORS origins; empty allows all
    cors_origins: Vec<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    external_login_key: Option<String>,
    /// Take client IPs from X-Real-IP / X-Forwarded-For
    trust_proxy: bool,
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl ApiConfig {
    fn from_env() -> Self {
        let bind = env::var("BOOKSTORE_BIND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let data_dir = env::var("BOOKSTORE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        // an absent secret stays empty here; TokenIssuer::new refuses it
        let secret = env::var("JWT_SECRET").unwrap_or_default();
        let issuer = env::var("JWT_VALID_ISSUER").unwrap_or_else(|_| "bookstore-api".into());
        let audience =
            env::var("JWT_VALID_AUDIENCE").unwrap_or_else(|_| "bookstore-clients".into());
        let lifetime = env::var("JWT_LIFETIME_MINUTES")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_MINUTES);
        let jwt = JwtSettings::new(secret, issuer, audience)
            .with_lifetime(chrono::Duration::minutes(lifetime));

        let lockout_attempts = env::var("BOOKSTORE_LOCKOUT_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        // comma separated; empty or "*" allows all
        let cors_origins = env::var("BOOKSTORE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed == "*" {
                    vec![]
                } else {
                    trimmed
                        .split(',')
                        .filter(|t| !t.trim().is_empty())
                        .map(|t| t.trim().to_string())
                        .collect()
                }
            })
            .unwrap_or_default();

        Self {
            bind,
            data_dir,
            jwt,
            lockout_attempts,
            cors_origins,
            admin_email: non_empty_var("BOOKSTORE_ADMIN_EMAIL"),
            admin_password: non_empty_var("BOOKSTORE_ADMIN_PASSWORD"),
            external_login_key: non_empty_var("BOOKSTORE_EXTERNAL_LOGIN_KEY"),
            trust_proxy: non_empty_var("BOOKSTORE_TRUST_PROXY")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

fn open_stores(data_dir: &Path) -> anyhow::Result<(Arc<dyn IdentityStore>, Arc<dyn BookStore>)> {
    if data_dir.as_os_str() == IN_MEMORY {
        info!("using in-memory store; data is lost on exit");
        let store = Arc::new(MemoryStore::new());
        let identity: Arc<dyn IdentityStore> = store.clone();
        let books: Arc<dyn BookStore> = store;
        return Ok((identity, books));
    }
    let store = Arc::new(FileStore::open(data_dir)?);
    let identity: Arc<dyn IdentityStore> = store.clone();
    let books: Arc<dyn BookStore> = store;
    Ok((identity, books))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenv();
    init_tracing();

    let config = ApiConfig::from_env();
    info!("starting API on {}", config.bind);

    // a missing JWT secret aborts startup here
    let issuer = TokenIssuer::new(config.jwt.clone())?;
    let (identity_store, book_store) = open_stores(&config.data_dir)?;

    let mut identity = IdentityManager::new(identity_store, issuer);
    if config.lockout_attempts > 0 {
        identity = identity.with_lockout(LockoutPolicy {
            max_failed_attempts: config.lockout_attempts,
            ..LockoutPolicy::default()
        });
    }
    let identity = Arc::new(identity);

    match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) => {
            let admin = identity.seed_admin(email, password).await?;
            info!(user_id = %admin.id, "admin account ready");
        }
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!(
                "BOOKSTORE_ADMIN_EMAIL and BOOKSTORE_ADMIN_PASSWORD must be set together; \
                 skipping admin seed"
            );
        }
        (None, None) => {}
    }

    let state = AppState {
        identity,
        books: Arc::new(BookRepository::new(book_store)),
        external_login_key: config.external_login_key.clone(),
        throttle: Arc::new(AuthThrottle::new(
            Quota::new(10, Duration::from_secs(60)),
            Quota::new(5, Duration::from_secs(300)),
        )),
        trust_proxy: config.trust_proxy,
    };

    let app = app_router(state, config.cors_origins.clone());
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("shutting down");
}
