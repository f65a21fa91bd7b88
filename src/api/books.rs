//! Book catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppJson;
use crate::{
    error::AppResult,
    models::book::{AvailabilityResponse, Book, BookQuery, CreateBook, UpdateBook},
    AppState,
};

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Body returned after creating a book
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookCreatedResponse {
    pub message: String,
    pub book_id: i32,
}

/// Search books by title and/or author
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<Book>),
        (status = 404, description = "No books found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.catalog.list_books(&query).await?;
    Ok(Json(books))
}

/// Get a book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = BookCreatedResponse),
        (status = 400, description = "Missing title/author or duplicate ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AppJson(data): AppJson<CreateBook>,
) -> AppResult<(StatusCode, Json<BookCreatedResponse>)> {
    let book = state.services.catalog.create_book(data).await?;
    Ok((
        StatusCode::CREATED,
        Json(BookCreatedResponse {
            message: "Book added successfully".to_string(),
            book_id: book.id,
        }),
    ))
}

/// Update a book; omitted fields are left unchanged
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = MessageResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(data): AppJson<UpdateBook>,
) -> AppResult<Json<MessageResponse>> {
    state.services.catalog.update_book(id, data).await?;
    Ok(Json(MessageResponse {
        message: "Book updated successfully".to_string(),
    }))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    state.services.catalog.delete_book(id).await?;
    Ok(Json(MessageResponse {
        message: "Book deleted successfully".to_string(),
    }))
}

/// Check whether a book can currently be borrowed
#[utoipa::path(
    get,
    path = "/books/{id}/availability",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Availability flag", body = AvailabilityResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_availability(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<AvailabilityResponse>> {
    let availability = state.services.catalog.availability(id).await?;
    Ok(Json(AvailabilityResponse { availability }))
}
