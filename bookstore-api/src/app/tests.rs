use super::{app_router, AppState, AuthThrottle, Quota};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use bookstore_core::{BookRepository, IdentityManager, JwtSettings, MemoryStore, TokenIssuer};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const PASSWORD: &str = "Aa1!aaaa";
const BRIDGE_KEY: &str = "bridge-key-for-tests";

fn test_state() -> AppState {
    test_state_with(Quota::new(100, Duration::from_secs(60)))
}

fn test_state_with(quota: Quota) -> AppState {
    let store = Arc::new(MemoryStore::new());
    let issuer = TokenIssuer::new(JwtSettings::new(
        "api-test-secret-api-test-secret",
        "bookstore-api",
        "bookstore-clients",
    ))
    .unwrap();
    let identity = IdentityManager::new(store.clone(), issuer).with_password_cost(4);
    AppState {
        identity: Arc::new(identity),
        books: Arc::new(BookRepository::new(store)),
        external_login_key: Some(BRIDGE_KEY.into()),
        throttle: Arc::new(AuthThrottle::new(quota, quota)),
        trust_proxy: false,
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn sign_up_and_in(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/accounts/signup",
        None,
        Some(json!({ "email": email, "password": PASSWORD, "first_name": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    sign_in(app, email).await
}

async fn sign_in(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/accounts/signin",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_ok_without_auth() {
    let app = app_router(test_state(), Vec::new());
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn signup_then_signin_yields_customer_token() {
    let app = app_router(test_state(), Vec::new());
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/accounts/signup",
        None,
        Some(json!({ "email": "a@x.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["succeeded"], true);
    assert_eq!(body["stage"], "complete");

    let token = sign_in(&app, "a@x.com").await;
    let (status, me) = send(&app, Method::GET, "/api/accounts/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "a@x.com");
    assert_eq!(me["roles"], json!(["Customer"]));
    assert!(me["jti"].is_string());
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = app_router(test_state(), Vec::new());
    sign_up_and_in(&app, "a@x.com").await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/accounts/signup",
        None,
        Some(json!({ "email": "a@x.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "AlreadyExists");
}

#[tokio::test]
async fn invalid_signup_lists_field_errors() {
    let app = app_router(test_state(), Vec::new());
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/accounts/signup",
        None,
        Some(json!({ "email": "nope", "password": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationFailed");
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e["field"] == "email"));
    assert!(errors.iter().any(|e| e["field"] == "password"));
}

#[tokio::test]
async fn bad_credentials_are_indistinguishable() {
    let app = app_router(test_state(), Vec::new());
    sign_up_and_in(&app, "a@x.com").await;

    let (wrong_status, wrong_body) = send(
        &app,
        Method::POST,
        "/api/accounts/signin",
        None,
        Some(json!({ "email": "a@x.com", "password": "Zz9!zzzz" })),
    )
    .await;
    let (unknown_status, unknown_body) = send(
        &app,
        Method::POST,
        "/api/accounts/signin",
        None,
        Some(json!({ "email": "ghost@x.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, unknown_status);
    assert_eq!(wrong_body, unknown_body);
    assert!(wrong_body.get("access_token").is_none());
}

#[tokio::test]
async fn books_require_a_token() {
    let app = app_router(test_state(), Vec::new());
    let (status, _) = send(&app, Method::GET, "/api/books", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, Method::GET, "/api/books", Some("not.a.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn book_crud_over_http() {
    let app = app_router(test_state(), Vec::new());
    let token = sign_up_and_in(&app, "reader@x.com").await;

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/books",
        Some(&token),
        Some(json!({ "title": "Dune", "description": "Arrakis" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_u64().unwrap();
    let uri = format!("/api/books/{}", id);

    let (status, book) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["title"], "Dune");

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "id": id, "title": "Dune Messiah", "description": "Sequel" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, all) = send(&app, Method::GET, "/api/books", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all[0]["title"], "Dune Messiah");

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "id": id + 1, "title": "Mismatch" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_books_needs_customer_role() {
    let state = test_state();
    let identity = state.identity.clone();
    let app = app_router(state, Vec::new());
    let token = sign_up_and_in(&app, "a@x.com").await;

    let user = identity.find_by_email("a@x.com").await.unwrap().unwrap();
    identity.set_user_roles(&user.id, vec![]).await.unwrap();
    // old token still says Customer until it expires
    let (status, _) = send(&app, Method::GET, "/api/books", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let fresh = sign_in(&app, "a@x.com").await;
    let (status, _) = send(&app, Method::GET, "/api/books", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_routes_need_admin_role() {
    let state = test_state();
    state
        .identity
        .seed_admin("root@x.com", PASSWORD)
        .await
        .unwrap();
    let app = app_router(state, Vec::new());

    let customer = sign_up_and_in(&app, "a@x.com").await;
    let (status, _) = send(&app, Method::GET, "/api/admin/users", Some(&customer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = sign_in(&app, "root@x.com").await;
    let (status, users) = send(&app, Method::GET, "/api/admin/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let (status, role) = send(
        &app,
        Method::POST,
        "/api/admin/roles",
        Some(&admin),
        Some(json!({ "name": "Editor", "description": "edits books" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let role_uri = format!("/api/admin/roles/{}", role["id"].as_str().unwrap());

    let (status, details) = send(&app, Method::GET, &role_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["name"], "Editor");

    let (status, _) = send(&app, Method::DELETE, &role_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn role_policies_check_claims() {
    let state = test_state();
    let identity = state.identity.clone();
    let app = app_router(state, Vec::new());

    // admin by role only, without the role-editing claims
    sign_up_and_in(&app, "plain@x.com").await;
    let user = identity.find_by_email("plain@x.com").await.unwrap().unwrap();
    identity.ensure_role("Admin").await.unwrap();
    identity
        .set_user_roles(&user.id, vec!["Admin".into()])
        .await
        .unwrap();
    let token = sign_in(&app, "plain@x.com").await;

    let role = identity.ensure_role("Editor").await.unwrap();
    let role_uri = format!("/api/admin/roles/{}", role.id);
    let (status, _) = send(&app, Method::GET, &role_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::DELETE, &role_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, claims) = send(
        &app,
        Method::PUT,
        &format!("/api/admin/users/{}/claims", user.id),
        Some(&token),
        Some(json!([{ "claim_type": "Delete Role", "is_selected": true }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claims.as_array().unwrap().len(), 1);

    // claims are looked up per request, no new token needed
    let (status, _) = send(&app, Method::DELETE, &role_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn external_login_requires_bridge_key() {
    let app = app_router(test_state(), Vec::new());
    let info = json!({
        "provider": "Google",
        "provider_key": "g-123",
        "email": "ext@x.com"
    });

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/accounts/external-login",
        None,
        Some(info.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/accounts/external-login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-External-Login-Key", BRIDGE_KEY)
        .body(Body::from(info.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = app_router(test_state(), Vec::new());
    let token = sign_up_and_in(&app, "a@x.com").await;
    let (status, body) = send(&app, Method::GET, "/nope", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NotFound");
}

#[tokio::test]
async fn malformed_body_uses_error_shape() {
    let app = app_router(test_state(), Vec::new());
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/accounts/signup",
        None,
        Some(json!({ "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationFailed");
    assert_eq!(body["errors"][0]["field"], "password");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/accounts/signin")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn sign_in_from(socket: &str, spoofed: &str) -> Request<Body> {
    let socket: SocketAddr = socket.parse().unwrap();
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/api/accounts/signin")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Forwarded-For", spoofed)
        .header("X-Real-IP", spoofed)
        .body(Body::from(
            json!({ "email": "ghost@x.com", "password": PASSWORD }).to_string(),
        ))
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(socket));
    request
}

#[tokio::test]
async fn sign_in_is_throttled_per_client() {
    let state = test_state_with(Quota::new(1, Duration::from_secs(60)));
    let app = app_router(state, Vec::new());

    let first = app
        .clone()
        .oneshot(sign_in_from("192.0.2.1:5000", "203.0.113.1"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    // fresh proxy headers do not buy a fresh quota
    let second = app
        .clone()
        .oneshot(sign_in_from("192.0.2.1:5001", "203.0.113.2"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_client = app
        .clone()
        .oneshot(sign_in_from("192.0.2.9:5000", "203.0.113.1"))
        .await
        .unwrap();
    assert_eq!(other_client.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trusted_proxy_headers_identify_clients() {
    let mut state = test_state_with(Quota::new(1, Duration::from_secs(60)));
    state.trust_proxy = true;
    let app = app_router(state, Vec::new());

    for forwarded in ["203.0.113.1", "203.0.113.2"] {
        let response = app
            .clone()
            .oneshot(sign_in_from("192.0.2.1:5000", forwarded))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let repeat = app
        .clone()
        .oneshot(sign_in_from("192.0.2.1:5000", "203.0.113.1"))
        .await
        .unwrap();
    assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn username_clash_is_a_conflict() {
    let state = test_state();
    state
        .identity
        .seed_admin("root@x.com", PASSWORD)
        .await
        .unwrap();
    let identity = state.identity.clone();
    let app = app_router(state, Vec::new());
    sign_up_and_in(&app, "a@x.com").await;
    sign_up_and_in(&app, "b@x.com").await;
    let admin = sign_in(&app, "root@x.com").await;

    let b = identity.find_by_email("b@x.com").await.unwrap().unwrap();
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/admin/users/{}", b.id),
        Some(&admin),
        Some(json!({ "username": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "AlreadyExists");
}
