//! Book model, search parameters and write requests

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::author::Author;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const DEFAULT_PAGE: i64 = 1;

/// Book with its author hydrated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub published_date: NaiveDate,
    pub isbn: String,
    /// Number of copies currently available for loan
    pub stock: i32,
    pub author_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

/// Sortable fields. Anything outside this list is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    PublishedDate,
    Stock,
    Author,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(SortField::Title),
            "published_date" => Some(SortField::PublishedDate),
            "stock" => Some(SortField::Stock),
            "author" => Some(SortField::Author),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything other than a case-insensitive `desc` is ascending
    pub fn normalize(s: Option<&str>) -> Self {
        match s {
            Some(s) if s.trim().eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Substring filters shared by the count and page queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Raw query string of `GET /books`.
///
/// Everything is kept as text so that malformed numbers fall back to the
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookQuery {
    pub limit: Option<String>,
    pub page: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// Normalized book search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub filter: BookFilter,
    pub sort: Option<SortField>,
    pub order: SortOrder,
    pub limit: i64,
    pub page: i64,
}

fn positive_or(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<BookQuery> for SearchParams {
    fn from(query: BookQuery) -> Self {
        Self {
            limit: positive_or(query.limit.as_deref(), DEFAULT_PAGE_SIZE),
            page: positive_or(query.page.as_deref(), DEFAULT_PAGE),
            sort: query.sort.as_deref().and_then(SortField::parse),
            order: SortOrder::normalize(query.order.as_deref()),
            filter: BookFilter {
                title: non_empty(query.title),
                author: non_empty(query.author),
            },
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        BookQuery::default().into()
    }
}

impl SearchParams {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// One page of search results plus the size of the whole result set
#[derive(Debug, Clone, PartialEq)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub total_records: i64,
}

/// Canonical stored form: separators removed, `x` check digit uppercased
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && *c != ' ')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Accepts ISBN-10 (with optional `X` check digit) and ISBN-13, ignoring
/// hyphens and spaces; the check digit must be correct.
pub fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    let chars: Vec<char> = isbn.chars().filter(|c| *c != '-' && *c != ' ').collect();

    let valid = match chars.len() {
        10 => {
            let mut sum = 0;
            for (i, c) in chars.iter().enumerate() {
                let value = match (i, c) {
                    (9, 'X') | (9, 'x') => 10,
                    (_, c) => match c.to_digit(10) {
                        Some(d) => d,
                        None => return Err(invalid_isbn()),
                    },
                };
                sum += value * (10 - i as u32);
            }
            sum % 11 == 0
        }
        13 => {
            let mut sum = 0;
            for (i, c) in chars.iter().enumerate() {
                let digit = c.to_digit(10).ok_or_else(invalid_isbn)?;
                sum += if i % 2 == 0 { digit } else { digit * 3 };
            }
            sum % 10 == 0
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(invalid_isbn())
    }
}

fn invalid_isbn() -> ValidationError {
    let mut error = ValidationError::new("isbn");
    error.message = Some("This field must be a valid ISBN.".into());
    error
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBook {
    #[validate(length(min = 2, max = 100, message = "Title must be between 2 and 100 characters"))]
    pub title: String,
    pub published_date: NaiveDate,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: String,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    pub author_id: i32,
}

impl CreateBook {
    pub fn normalize(&mut self) {
        self.isbn = normalize_isbn(&self.isbn);
    }
}

/// Update book request. Stock only changes through loans.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateBook {
    #[validate(length(min = 2, max = 100, message = "Title must be between 2 and 100 characters"))]
    pub title: String,
    pub published_date: NaiveDate,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: String,
    pub author_id: i32,
}

impl UpdateBook {
    pub fn normalize(&mut self) {
        self.isbn = normalize_isbn(&self.isbn);
    }
}
