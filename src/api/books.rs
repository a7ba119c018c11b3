//! Book endpoints and the paginated list envelope

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::book::{Book, BookPage, BookQuery, CreateBook, SearchParams, UpdateBook},
    AppState,
};

use super::{JsonBody, Librarian, PathParam};

/// Pagination metadata of a list response
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PageMetadata {
    pub current_page: i64,
    pub page_size: i64,
    pub total_records: i64,
    pub total_pages: i64,
}

impl PageMetadata {
    pub fn new(current_page: i64, page_size: i64, total_records: i64) -> Self {
        // ceil(total / size), overflow-free for any positive size
        let total_pages = if page_size > 0 {
            total_records / page_size + i64::from(total_records % page_size != 0)
        } else {
            0
        };

        Self {
            current_page,
            page_size,
            total_records,
            total_pages,
        }
    }
}

/// List envelope: `{ metadata, data }`. `data` is always an array.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub metadata: PageMetadata,
    pub data: Vec<T>,
}

impl PaginatedResponse<Book> {
    pub fn from_page(page: BookPage, params: &SearchParams) -> Self {
        Self {
            metadata: PageMetadata::new(params.page, params.limit, page.total_records),
            data: page.books,
        }
    }
}

/// Search books: `limit`, `page`, `title`, `author`, `sort`, `order`
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<Book>>> {
    let params = SearchParams::from(query);
    let page = state.services.catalog.search_books(&params).await?;
    Ok(Json(PaginatedResponse::from_page(page, &params)))
}

pub async fn get_book(
    State(state): State<AppState>,
    PathParam(id): PathParam<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a book (librarian only)
pub async fn create_book(
    State(state): State<AppState>,
    _librarian: Librarian,
    JsonBody(book): JsonBody<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = state.services.catalog.create_book(book).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book (librarian only)
pub async fn update_book(
    State(state): State<AppState>,
    _librarian: Librarian,
    PathParam(id): PathParam<i32>,
    JsonBody(book): JsonBody<UpdateBook>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.update_book(id, book).await?;
    Ok(Json(book))
}

/// Delete a book (librarian only)
pub async fn delete_book(
    State(state): State<AppState>,
    _librarian: Librarian,
    PathParam(id): PathParam<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
