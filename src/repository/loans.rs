//! Loans repository for database operations
//!
//! Borrow and return run inside a [`LoanTransaction`]: every read that feeds a
//! write takes a row lock, and dropping the transaction without committing
//! rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanBook, LoanStatus, LoanUser},
};

/// Unit of work for one borrow or return
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanTransaction: Send {
    /// Lock the book row and read its stock. `None` when the book is missing.
    async fn lock_stock(&mut self, book_id: i32) -> AppResult<Option<i32>>;

    /// Add `delta` to the stock of a previously locked book
    async fn adjust_stock(&mut self, book_id: i32, delta: i32) -> AppResult<()>;

    async fn insert_loan(&mut self, book_id: i32, user_id: i32, at: DateTime<Utc>) -> AppResult<Loan>;

    /// Lock the loan row. `None` when the loan is missing.
    async fn lock_loan(&mut self, loan_id: i32) -> AppResult<Option<Loan>>;

    /// Set the return date of an active loan
    async fn close_loan(&mut self, loan_id: i32, at: DateTime<Utc>) -> AppResult<()>;

    async fn commit(&mut self) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoansRepository: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn LoanTransaction>>;

    /// Active loans of a user, oldest first
    async fn active_for_user(&self, user_id: i32) -> AppResult<Vec<Loan>>;

    /// All loans, optionally restricted to one status
    async fn search(&self, status: Option<LoanStatus>) -> AppResult<Vec<Loan>>;
}

const LOAN_COLUMNS: &str = "id, book_id, user_id, loan_date, return_date";

fn loan_from_row(row: &PgRow) -> Loan {
    Loan {
        id: row.get("id"),
        book_id: row.get("book_id"),
        user_id: row.get("user_id"),
        loan_date: row.get("loan_date"),
        return_date: row.get("return_date"),
        book: None,
        user: None,
    }
}

fn touched_one(rows: u64, what: &str) -> AppResult<()> {
    if rows == 1 {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "{} affected {} rows instead of 1",
            what, rows
        )))
    }
}

pub struct PgLoanTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLoanTransaction {
    fn conn(&mut self) -> AppResult<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::Internal("Transaction already committed".to_string()))
    }
}

#[async_trait]
impl LoanTransaction for PgLoanTransaction {
    async fn lock_stock(&mut self, book_id: i32) -> AppResult<Option<i32>> {
        let tx = self.conn()?;
        let stock = sqlx::query_scalar::<_, i32>("SELECT stock FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(stock)
    }

    async fn adjust_stock(&mut self, book_id: i32, delta: i32) -> AppResult<()> {
        let tx = self.conn()?;
        let result = sqlx::query("UPDATE books SET stock = stock + $1 WHERE id = $2")
            .bind(delta)
            .bind(book_id)
            .execute(&mut **tx)
            .await?;

        touched_one(result.rows_affected(), "Stock update")
    }

    async fn insert_loan(&mut self, book_id: i32, user_id: i32, at: DateTime<Utc>) -> AppResult<Loan> {
        let tx = self.conn()?;
        let query = format!(
            "INSERT INTO loans (book_id, user_id, loan_date) VALUES ($1, $2, $3) RETURNING {}",
            LOAN_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(book_id)
            .bind(user_id)
            .bind(at)
            .fetch_one(&mut **tx)
            .await?;

        Ok(loan_from_row(&row))
    }

    async fn lock_loan(&mut self, loan_id: i32) -> AppResult<Option<Loan>> {
        let tx = self.conn()?;
        let query = format!("SELECT {} FROM loans WHERE id = $1 FOR UPDATE", LOAN_COLUMNS);
        let row = sqlx::query(&query)
            .bind(loan_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(row.as_ref().map(loan_from_row))
    }

    async fn close_loan(&mut self, loan_id: i32, at: DateTime<Utc>) -> AppResult<()> {
        let tx = self.conn()?;
        let result = sqlx::query(
            "UPDATE loans SET return_date = $1 WHERE id = $2 AND return_date IS NULL",
        )
        .bind(at)
        .bind(loan_id)
        .execute(&mut **tx)
        .await?;

        touched_one(result.rows_affected(), "Loan close")
    }

    async fn commit(&mut self) -> AppResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::Internal("Transaction already committed".to_string()))?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgLoansRepository {
    pool: Pool<Postgres>,
}

impl PgLoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoansRepository for PgLoansRepository {
    async fn begin(&self) -> AppResult<Box<dyn LoanTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLoanTransaction { tx: Some(tx) }))
    }

    async fn active_for_user(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.book_id, l.user_id, l.loan_date, l.return_date,
                   b.title AS book_title, b.isbn AS book_isbn
            FROM loans l
            JOIN books b ON b.id = l.book_id
            WHERE l.user_id = $1 AND l.return_date IS NULL
            ORDER BY l.loan_date, l.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut loan = loan_from_row(row);
                loan.book = Some(LoanBook {
                    id: loan.book_id,
                    title: row.get("book_title"),
                    isbn: row.get("book_isbn"),
                });
                loan
            })
            .collect())
    }

    async fn search(&self, status: Option<LoanStatus>) -> AppResult<Vec<Loan>> {
        let condition = match status {
            None => "",
            Some(LoanStatus::Active) => "WHERE l.return_date IS NULL",
            Some(LoanStatus::Returned) => "WHERE l.return_date IS NOT NULL",
        };
        let query = format!(
            r#"
            SELECT l.id, l.book_id, l.user_id, l.loan_date, l.return_date,
                   b.title AS book_title, u.username
            FROM loans l
            JOIN books b ON b.id = l.book_id
            JOIN users u ON u.id = l.user_id
            {}
            ORDER BY l.loan_date, l.id
            "#,
            condition
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut loan = loan_from_row(row);
                loan.book = Some(LoanBook {
                    id: loan.book_id,
                    title: row.get("book_title"),
                    isbn: None,
                });
                loan.user = Some(LoanUser {
                    id: loan.user_id,
                    username: row.get("username"),
                });
                loan
            })
            .collect())
    }
}
