use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    add_book, change_password, create_role, delete_book, delete_role, delete_user,
    edit_role_members, external_login, get_book, get_role, get_user, handler_404, health,
    list_books, list_claims, list_roles, list_users, me, set_role_claims, set_user_claims,
    set_user_roles, sign_in, sign_up, update_book, update_role, update_user,
};
use super::middleware::auth_middleware;
use super::state::AppState;

/// Build the CORS layer from the configured origin list
fn build_cors_layer(cors_origins: Vec<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true);

    if cors_origins.is_empty() {
        tracing::warn!(
            "BOOKSTORE_CORS_ORIGINS not configured, allowing all origins. \
             Set BOOKSTORE_CORS_ORIGINS in production."
        );
        // any() cannot be combined with credentials
        base.allow_origin(AllowOrigin::any())
            .allow_credentials(false)
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .into_iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        base.allow_origin(origins)
    }
}

/// Build the router with routes and middleware wired.
pub fn app_router(state: AppState, cors_origins: Vec<String>) -> Router {
    // no token required (see PUBLIC_PATHS in middleware)
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/accounts/signup", post(sign_up))
        .route("/api/accounts/signin", post(sign_in))
        .route("/api/accounts/external-login", post(external_login));

    let account_routes = Router::new().route("/api/accounts/me", get(me));

    // role checks happen in the extractors
    let book_routes = Router::new()
        .route("/api/books", get(list_books).post(add_book))
        .route(
            "/api/books/:id",
            get(get_book).put(update_book).delete(delete_book),
        );

    let admin_routes = Router::new()
        .route("/api/admin/roles", get(list_roles).post(create_role))
        .route(
            "/api/admin/roles/:id",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/api/admin/roles/:id/users", put(edit_role_members))
        .route("/api/admin/roles/:id/claims", put(set_role_claims))
        .route("/api/admin/users", get(list_users))
        .route(
            "/api/admin/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/admin/users/:id/roles", put(set_user_roles))
        .route("/api/admin/users/:id/claims", put(set_user_claims))
        .route("/api/admin/users/:id/password", post(change_password))
        .route("/api/admin/claims", get(list_claims));

    Router::new()
        .merge(public_routes)
        .merge(account_routes)
        .merge(book_routes)
        .merge(admin_routes)
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .fallback(handler_404)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(cors_origins))
        .with_state(state)
}
