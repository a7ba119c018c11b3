//! Loan service: borrow and return with stock bookkeeping
//!
//! Stock is the count of available copies. Every loan transition changes it
//! by exactly one inside the same transaction as the loan row, so the two
//! never drift apart.

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanStatus},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
}

impl LoansService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Lend one copy of a book to a user
    pub async fn borrow(&self, book_id: i32, user_id: i32) -> AppResult<Loan> {
        let mut tx = self.repository.loans.begin().await?;

        let stock = tx
            .lock_stock(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        if stock <= 0 {
            return Err(AppError::NoStockAvailable { book_id });
        }

        tx.adjust_stock(book_id, -1).await?;
        let loan = tx.insert_loan(book_id, user_id, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            "Loan {} created: book {} lent to user {}",
            loan.id,
            book_id,
            user_id
        );
        self.repository.books.invalidate(book_id).await;

        Ok(loan)
    }

    /// Close a loan and put the copy back in stock.
    ///
    /// Members may only return their own loans; librarians may return any.
    pub async fn return_loan(&self, loan_id: i32, claims: &UserClaims) -> AppResult<Loan> {
        let mut tx = self.repository.loans.begin().await?;

        let mut loan = tx
            .lock_loan(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        if !claims.is_librarian() && loan.user_id != claims.user_id {
            return Err(AppError::Authorization(
                "You can only return your own loans".to_string(),
            ));
        }

        if !loan.is_active() {
            return Err(AppError::AlreadyReturned { loan_id });
        }

        let now = Utc::now();
        tx.close_loan(loan_id, now).await?;
        tx.adjust_stock(loan.book_id, 1).await?;
        tx.commit().await?;

        tracing::info!("Loan {} returned: book {} back in stock", loan_id, loan.book_id);
        self.repository.books.invalidate(loan.book_id).await;

        loan.return_date = Some(now);
        Ok(loan)
    }

    /// Active loans of a user
    pub async fn active_for_user(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        self.repository.loans.active_for_user(user_id).await
    }

    /// All loans, optionally filtered by status
    pub async fn search(&self, status: Option<LoanStatus>) -> AppResult<Vec<Loan>> {
        self.repository.loans.search(status).await
    }
}
