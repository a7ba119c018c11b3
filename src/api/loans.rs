//! Loan endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::loan::{CreateLoan, Loan, LoanQuery},
    AppState,
};

use super::{AuthenticatedUser, JsonBody, Librarian, PathParam};

/// Borrow a book for the authenticated user
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    JsonBody(request): JsonBody<CreateLoan>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state
        .services
        .loans
        .borrow(request.book_id, claims.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    PathParam(id): PathParam<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.return_loan(id, &claims).await?;
    Ok(Json(loan))
}

/// List all loans, optionally by status (librarian only)
pub async fn list_loans(
    State(state): State<AppState>,
    _librarian: Librarian,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<Loan>>> {
    let status = query.status().map_err(AppError::BadRequest)?;
    let loans = state.services.loans.search(status).await?;
    Ok(Json(loans))
}

/// Active loans of the authenticated user
pub async fn my_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loans.active_for_user(claims.user_id).await?;
    Ok(Json(loans))
}
