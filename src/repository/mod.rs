//! Repository layer for database operations.
//!
//! Each aggregate is reached through a trait so the services can be driven
//! by any store honouring the same contract. The PostgreSQL implementations
//! live next to their trait.

pub mod authors;
pub mod books;
pub mod cache;
pub mod loans;
pub mod users;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

pub use authors::AuthorsRepository;
pub use books::BooksRepository;
pub use cache::{CachingBooksRepository, RedisCache};
pub use loans::{LoanTransaction, LoansRepository};
pub use users::UsersRepository;

/// Handles to every repository, shared by the services
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BooksRepository>,
    pub authors: Arc<dyn AuthorsRepository>,
    pub users: Arc<dyn UsersRepository>,
    pub loans: Arc<dyn LoansRepository>,
}

impl Repository {
    /// Create PostgreSQL-backed repositories sharing `pool`.
    /// Single-book reads go through `cache` when one is given.
    pub fn new(pool: Pool<Postgres>, cache: Option<RedisCache>) -> Self {
        let books: Arc<dyn BooksRepository> = Arc::new(books::PgBooksRepository::new(pool.clone()));
        let books = match cache {
            Some(cache) => Arc::new(CachingBooksRepository::new(books, cache)) as Arc<dyn BooksRepository>,
            None => books,
        };

        Self {
            books,
            authors: Arc::new(authors::PgAuthorsRepository::new(pool.clone())),
            users: Arc::new(users::PgUsersRepository::new(pool.clone())),
            loans: Arc::new(loans::PgLoansRepository::new(pool)),
        }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
