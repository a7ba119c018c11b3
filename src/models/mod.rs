//! Data models for Librarium

pub mod author;
pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::{Book, BookFilter, BookQuery, SearchParams, SortField, SortOrder};
pub use loan::{Loan, LoanStatus};
pub use user::{Role, User, UserClaims};
