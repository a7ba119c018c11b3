//! Books repository for database operations

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::Author,
        book::{Book, BookFilter, CreateBook, SearchParams, SortField, UpdateBook},
    },
};

use super::{is_foreign_key_violation, is_unique_violation};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BooksRepository: Send + Sync {
    /// Get a book with its author
    async fn get_by_id(&self, id: i32) -> AppResult<Book>;

    /// Insert a book, returning its id
    async fn create(&self, book: &CreateBook) -> AppResult<i32>;

    /// Update descriptive fields. Stock is left untouched.
    async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<()>;

    async fn delete(&self, id: i32) -> AppResult<()>;

    /// Number of books matching `filter`
    async fn count(&self, filter: &BookFilter) -> AppResult<i64>;

    /// Ids of the requested page, in result order
    async fn page_ids(&self, params: &SearchParams) -> AppResult<Vec<i32>>;

    /// Hydrated books for `ids`, in no particular order
    async fn fetch_by_ids(&self, ids: &[i32]) -> AppResult<Vec<Book>>;

    /// Drop any cached copy of a book after its row changed
    async fn invalidate(&self, _id: i32) {}
}

const BOOK_COLUMNS: &str = r#"
    SELECT b.id, b.title, b.published_date, b.isbn, b.stock, b.author_id,
           a.name AS author_name, a.bio AS author_bio
    FROM books b
    LEFT JOIN authors a ON a.id = b.author_id
"#;

const FILTER_BASE: &str = "FROM books b LEFT JOIN authors a ON a.id = b.author_id WHERE 1=1";

#[derive(Debug, FromRow)]
struct BookRow {
    id: i32,
    title: String,
    published_date: NaiveDate,
    isbn: String,
    stock: i32,
    author_id: Option<i32>,
    author_name: Option<String>,
    author_bio: Option<String>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        let author = match (row.author_id, row.author_name) {
            (Some(id), Some(name)) => Some(Author {
                id,
                name,
                bio: row.author_bio,
            }),
            _ => None,
        };

        Book {
            id: row.id,
            title: row.title,
            published_date: row.published_date,
            isbn: row.isbn,
            stock: row.stock,
            author_id: row.author_id,
            author,
        }
    }
}

/// Escape LIKE metacharacters and wrap in `%` for a substring match
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Title => "b.title",
        SortField::PublishedDate => "b.published_date",
        SortField::Stock => "b.stock",
        SortField::Author => "a.name",
    }
}

/// Predicates shared by the count and page queries
fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &BookFilter) {
    if let Some(ref title) = filter.title {
        qb.push(" AND b.title ILIKE ").push_bind(like_pattern(title));
    }
    if let Some(ref author) = filter.author {
        qb.push(" AND a.name ILIKE ").push_bind(like_pattern(author));
    }
}

pub(crate) fn count_query(filter: &BookFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) {}", FILTER_BASE));
    push_filter(&mut qb, filter);
    qb
}

pub(crate) fn page_ids_query(params: &SearchParams) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT b.id {}", FILTER_BASE));
    push_filter(&mut qb, &params.filter);

    qb.push(" ORDER BY ");
    if let Some(field) = params.sort {
        qb.push(sort_column(field))
            .push(" ")
            .push(params.order.as_sql())
            .push(", ");
    }
    // id breaks ties so that pages never overlap
    qb.push("b.id ASC");

    qb.push(" LIMIT ").push_bind(params.limit);
    qb.push(" OFFSET ").push_bind(params.offset());
    qb
}

#[derive(Clone)]
pub struct PgBooksRepository {
    pool: Pool<Postgres>,
}

impl PgBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BooksRepository for PgBooksRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        let query = format!("{} WHERE b.id = $1", BOOK_COLUMNS);
        sqlx::query_as::<_, BookRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Book::from)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn create(&self, book: &CreateBook) -> AppResult<i32> {
        sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO books (title, published_date, isbn, stock, author_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&book.title)
        .bind(book.published_date)
        .bind(&book.isbn)
        .bind(book.stock)
        .bind(book.author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("A book with this ISBN already exists".to_string())
            } else if is_foreign_key_violation(&e) {
                AppError::BadRequest("Author with the specified ID does not exist".to_string())
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $1, published_date = $2, isbn = $3, author_id = $4
            WHERE id = $5
            "#,
        )
        .bind(&book.title)
        .bind(book.published_date)
        .bind(&book.isbn)
        .bind(book.author_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("A book with this ISBN already exists".to_string())
            } else if is_foreign_key_violation(&e) {
                AppError::BadRequest("Author with the specified ID does not exist".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict("Book has loan records and cannot be deleted".to_string())
                } else {
                    AppError::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    async fn count(&self, filter: &BookFilter) -> AppResult<i64> {
        let total = count_query(filter)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn page_ids(&self, params: &SearchParams) -> AppResult<Vec<i32>> {
        let ids = page_ids_query(params)
            .build_query_scalar::<i32>()
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn fetch_by_ids(&self, ids: &[i32]) -> AppResult<Vec<Book>> {
        let query = format!("{} WHERE b.id = ANY($1)", BOOK_COLUMNS);
        let rows = sqlx::query_as::<_, BookRow>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Book::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::SortOrder;

    fn where_clause(sql: &str) -> &str {
        let start = sql.find(" WHERE ").expect("no WHERE clause");
        let end = sql.find(" ORDER BY ").unwrap_or(sql.len());
        &sql[start..end]
    }

    fn params(filter: BookFilter, sort: Option<SortField>, order: SortOrder) -> SearchParams {
        SearchParams {
            filter,
            sort,
            order,
            ..SearchParams::default()
        }
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("hobbit"), "%hobbit%");
        assert_eq!(like_pattern("100%_sure\\"), "%100\\%\\_sure\\\\%");
    }

    #[test]
    fn test_count_and_page_queries_share_predicates() {
        let filter = BookFilter {
            title: Some("ring".to_string()),
            author: Some("tolkien".to_string()),
        };
        let count = count_query(&filter);
        let page = page_ids_query(&params(filter.clone(), Some(SortField::Title), SortOrder::Asc));

        assert_eq!(
            count.sql(),
            "SELECT COUNT(*) FROM books b LEFT JOIN authors a ON a.id = b.author_id \
             WHERE 1=1 AND b.title ILIKE $1 AND a.name ILIKE $2"
        );
        assert_eq!(where_clause(count.sql()), where_clause(page.sql()));
    }

    #[test]
    fn test_page_query_orders_with_tie_breaker() {
        let page = page_ids_query(&params(
            BookFilter::default(),
            Some(SortField::Author),
            SortOrder::Desc,
        ));
        assert!(page
            .sql()
            .ends_with("ORDER BY a.name DESC, b.id ASC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn test_unsorted_page_query_uses_natural_order() {
        let page = page_ids_query(&params(BookFilter::default(), None, SortOrder::Desc));
        assert!(page.sql().ends_with("WHERE 1=1 ORDER BY b.id ASC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn test_row_without_author() {
        let book = Book::from(BookRow {
            id: 1,
            title: "Orphan".to_string(),
            published_date: NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
            isbn: "9780306406157".to_string(),
            stock: 2,
            author_id: None,
            author_name: None,
            author_bio: None,
        });
        assert!(book.author.is_none());
    }
}
