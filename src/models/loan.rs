//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Book fields embedded in loan listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanBook {
    pub id: i32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
}

/// User fields embedded in loan listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanUser {
    pub id: i32,
    pub username: String,
}

/// A loan. `return_date` is `None` while the copy is still out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub loan_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<LoanBook>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<LoanUser>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Loan status filter for the librarian loan listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!(
                "Invalid status '{}': expected 'active' or 'returned'",
                s
            )),
        }
    }
}

/// Borrow request body. The borrower is always the authenticated user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLoan {
    pub book_id: i32,
}

/// Query string of `GET /loans`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoanQuery {
    pub status: Option<String>,
}

impl LoanQuery {
    /// Parse the status filter; an empty value means no filter
    pub fn status(&self) -> Result<Option<LoanStatus>, String> {
        match self.status.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }
}
