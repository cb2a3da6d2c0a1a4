//! Book catalogue handlers

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bookstore_core::BookModel;
use serde_json::json;

use super::super::error::ApiError;
use super::super::json::ApiJson;
use super::super::middleware::{AuthInfo, RequireCustomer};
use super::super::state::AppState;

/// POST /api/books
pub async fn add_book(
    State(state): State<AppState>,
    _auth: AuthInfo,
    ApiJson(model): ApiJson<BookModel>,
) -> Result<Response, ApiError> {
    let id = state.books.add_book(model).await?;
    let location = format!("/api/books/{}", id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "id": id })),
    )
        .into_response())
}

/// GET /api/books - customers only
pub async fn list_books(
    State(state): State<AppState>,
    RequireCustomer(_): RequireCustomer,
) -> Result<Json<Vec<BookModel>>, ApiError> {
    Ok(Json(state.books.get_all_books().await?))
}

/// GET /api/books/:id
pub async fn get_book(
    State(state): State<AppState>,
    _auth: AuthInfo,
    Path(id): Path<u64>,
) -> Result<Json<BookModel>, ApiError> {
    state
        .books
        .get_book(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("book {id} not found")))
}

/// PUT /api/books/:id
pub async fn update_book(
    State(state): State<AppState>,
    _auth: AuthInfo,
    Path(id): Path<u64>,
    ApiJson(model): ApiJson<BookModel>,
) -> Result<StatusCode, ApiError> {
    state.books.update_book(id, model).await?;
    Ok(StatusCode::OK)
}

/// DELETE /api/books/:id
pub async fn delete_book(
    State(state): State<AppState>,
    _auth: AuthInfo,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.books.delete_book(id).await?;
    Ok(StatusCode::OK)
}
