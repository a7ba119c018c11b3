//! In-memory store shared by the integration tests.
//!
//! Implements every repository trait over one mutex-guarded state. A loan
//! transaction holds the mutex for its whole lifetime and works on a staged
//! copy, so commits are atomic and dropping an uncommitted transaction
//! discards its writes.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use librarium_server::{
    api,
    config::AppConfig,
    error::{AppError, AppResult},
    models::{
        author::{Author, CreateAuthor},
        book::{Book, BookFilter, CreateBook, SearchParams, SortField, SortOrder, UpdateBook},
        loan::{Loan, LoanBook, LoanStatus, LoanUser},
        user::{Role, User, UserClaims},
    },
    repository::{
        AuthorsRepository, BooksRepository, LoanTransaction, LoansRepository, Repository,
        UsersRepository,
    },
    services::users::hash_password,
    AppState,
};

pub const PASSWORD: &str = "secret";

/// Argon2 is slow in debug builds; hash the shared password once
fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap()).clone()
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub authors: BTreeMap<i32, Author>,
    pub books: BTreeMap<i32, Book>,
    pub users: BTreeMap<i32, User>,
    pub loans: BTreeMap<i32, Loan>,
    next_id: i32,
    /// Make the next loan insert fail, after the stock was decremented
    pub fail_loan_insert: bool,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn hydrate(&self, book: &Book) -> Book {
        let mut book = book.clone();
        book.author = book
            .author_id
            .and_then(|id| self.authors.get(&id).cloned());
        book
    }

    fn matches(&self, book: &Book, filter: &BookFilter) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };

        let title_ok = filter
            .title
            .as_deref()
            .map_or(true, |t| contains(&book.title, t));
        let author_ok = filter.author.as_deref().map_or(true, |a| {
            self.author_name(book)
                .map_or(false, |name| contains(&name, a))
        });
        title_ok && author_ok
    }

    fn author_name(&self, book: &Book) -> Option<String> {
        book.author_id
            .and_then(|id| self.authors.get(&id))
            .map(|a| a.name.clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repository(&self) -> Repository {
        Repository {
            books: Arc::new(self.clone()),
            authors: Arc::new(self.clone()),
            users: Arc::new(self.clone()),
            loans: Arc::new(self.clone()),
        }
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn set_fail_loan_insert(&self, fail: bool) {
        self.state.lock().await.fail_loan_insert = fail;
    }

    pub async fn seed_author(&self, name: &str) -> i32 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.authors.insert(
            id,
            Author {
                id,
                name: name.to_string(),
                bio: None,
            },
        );
        id
    }

    pub async fn seed_book(&self, title: &str, author_id: i32, stock: i32) -> i32 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.books.insert(
            id,
            Book {
                id,
                title: title.to_string(),
                published_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
                isbn: format!("seed-{}", id),
                stock,
                author_id: Some(author_id),
                author: None,
            },
        );
        id
    }

    pub async fn seed_user(&self, username: &str, role: Role) -> User {
        let hash = password_hash();
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let user = User {
            id,
            username: username.to_string(),
            password_hash: hash,
            role,
        };
        state.users.insert(id, user.clone());
        user
    }

    pub async fn stock(&self, book_id: i32) -> i32 {
        self.state.lock().await.books[&book_id].stock
    }

    pub async fn loans_for_book(&self, book_id: i32) -> Vec<Loan> {
        self.state
            .lock()
            .await
            .loans
            .values()
            .filter(|l| l.book_id == book_id)
            .cloned()
            .collect()
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[axum::async_trait]
impl LoanTransaction for MemoryTransaction {
    async fn lock_stock(&mut self, book_id: i32) -> AppResult<Option<i32>> {
        Ok(self.staged.books.get(&book_id).map(|b| b.stock))
    }

    async fn adjust_stock(&mut self, book_id: i32, delta: i32) -> AppResult<()> {
        let book = self
            .staged
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::Internal("Stock update affected 0 rows instead of 1".into()))?;
        if book.stock + delta < 0 {
            return Err(AppError::Internal("stock check constraint violated".into()));
        }
        book.stock += delta;
        Ok(())
    }

    async fn insert_loan(&mut self, book_id: i32, user_id: i32, at: DateTime<Utc>) -> AppResult<Loan> {
        if self.staged.fail_loan_insert {
            return Err(AppError::Internal("injected loan insert failure".into()));
        }

        let id = self.staged.next_id();
        let loan = Loan {
            id,
            book_id,
            user_id,
            loan_date: at,
            return_date: None,
            book: None,
            user: None,
        };
        self.staged.loans.insert(id, loan.clone());
        Ok(loan)
    }

    async fn lock_loan(&mut self, loan_id: i32) -> AppResult<Option<Loan>> {
        Ok(self.staged.loans.get(&loan_id).cloned())
    }

    async fn close_loan(&mut self, loan_id: i32, at: DateTime<Utc>) -> AppResult<()> {
        match self.staged.loans.get_mut(&loan_id) {
            Some(loan) if loan.return_date.is_none() => {
                loan.return_date = Some(at);
                Ok(())
            }
            _ => Err(AppError::Internal("Loan close affected 0 rows instead of 1".into())),
        }
    }

    async fn commit(&mut self) -> AppResult<()> {
        *self.guard = self.staged.clone();
        Ok(())
    }
}

#[axum::async_trait]
impl LoansRepository for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LoanTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }

    async fn active_for_user(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        let state = self.state.lock().await;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|l| l.user_id == user_id && l.return_date.is_none())
            .map(|l| {
                let mut loan = l.clone();
                loan.book = state.books.get(&l.book_id).map(|b| LoanBook {
                    id: b.id,
                    title: b.title.clone(),
                    isbn: Some(b.isbn.clone()),
                });
                loan
            })
            .collect();
        loans.sort_by_key(|l| (l.loan_date, l.id));
        Ok(loans)
    }

    async fn search(&self, status: Option<LoanStatus>) -> AppResult<Vec<Loan>> {
        let state = self.state.lock().await;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|l| match status {
                None => true,
                Some(LoanStatus::Active) => l.return_date.is_none(),
                Some(LoanStatus::Returned) => l.return_date.is_some(),
            })
            .map(|l| {
                let mut loan = l.clone();
                loan.book = state.books.get(&l.book_id).map(|b| LoanBook {
                    id: b.id,
                    title: b.title.clone(),
                    isbn: None,
                });
                loan.user = state.users.get(&l.user_id).map(|u| LoanUser {
                    id: u.id,
                    username: u.username.clone(),
                });
                loan
            })
            .collect();
        loans.sort_by_key(|l| (l.loan_date, l.id));
        Ok(loans)
    }
}

#[axum::async_trait]
impl BooksRepository for MemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        let state = self.state.lock().await;
        state
            .books
            .get(&id)
            .map(|b| state.hydrate(b))
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn create(&self, book: &CreateBook) -> AppResult<i32> {
        let mut state = self.state.lock().await;
        if state.books.values().any(|b| b.isbn == book.isbn) {
            return Err(AppError::Conflict("A book with this ISBN already exists".into()));
        }
        let id = state.next_id();
        state.books.insert(
            id,
            Book {
                id,
                title: book.title.clone(),
                published_date: book.published_date,
                isbn: book.isbn.clone(),
                stock: book.stock,
                author_id: Some(book.author_id),
                author: None,
            },
        );
        Ok(id)
    }

    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let book = state
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        book.title = update.title.clone();
        book.published_date = update.published_date;
        book.isbn = update.isbn.clone();
        book.author_id = Some(update.author_id);
        Ok(())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.books.contains_key(&id) {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        if state.loans.values().any(|l| l.book_id == id) {
            return Err(AppError::Conflict("Book has loan records and cannot be deleted".into()));
        }
        state.books.remove(&id);
        Ok(())
    }

    async fn count(&self, filter: &BookFilter) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.books.values().filter(|b| state.matches(b, filter)).count() as i64)
    }

    async fn page_ids(&self, params: &SearchParams) -> AppResult<Vec<i32>> {
        let state = self.state.lock().await;
        let mut books: Vec<&Book> = state
            .books
            .values()
            .filter(|b| state.matches(b, &params.filter))
            .collect();

        if let Some(field) = params.sort {
            books.sort_by(|a, b| {
                let ordering = match field {
                    SortField::Title => a.title.cmp(&b.title),
                    SortField::PublishedDate => a.published_date.cmp(&b.published_date),
                    SortField::Stock => a.stock.cmp(&b.stock),
                    SortField::Author => state.author_name(a).cmp(&state.author_name(b)),
                };
                let ordering = match params.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                ordering.then(a.id.cmp(&b.id))
            });
        }

        Ok(books
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit as usize)
            .map(|b| b.id)
            .collect())
    }

    /// Returned in descending id order, unlike any page order, so callers
    /// must restore the order themselves
    async fn fetch_by_ids(&self, ids: &[i32]) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        Ok(state
            .books
            .values()
            .rev()
            .filter(|b| ids.contains(&b.id))
            .map(|b| state.hydrate(b))
            .collect())
    }
}

#[axum::async_trait]
impl AuthorsRepository for MemoryStore {
    async fn list(&self) -> AppResult<Vec<Author>> {
        Ok(self.state.lock().await.authors.values().cloned().collect())
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Author> {
        self.state
            .lock()
            .await
            .authors
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    async fn exists(&self, id: i32) -> AppResult<bool> {
        Ok(self.state.lock().await.authors.contains_key(&id))
    }

    async fn create(&self, author: &CreateAuthor) -> AppResult<Author> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let author = Author {
            id,
            name: author.name.clone(),
            bio: author.bio.clone(),
        };
        state.authors.insert(id, author.clone());
        Ok(author)
    }
}

#[axum::async_trait]
impl UsersRepository for MemoryStore {
    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        Ok(self.get_by_username(username).await?.is_some())
    }

    async fn create(&self, username: &str, password_hash: &str, role: Role) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict("Username already exists".into()));
        }
        let id = state.next_id();
        let user = User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_role(&self, username: &str, role: Role) -> AppResult<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .values_mut()
            .find(|u| u.username == username)
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", username)))?;
        user.role = role;
        Ok(user.clone())
    }
}

/// Application state over `store` with default configuration
pub fn app_state(store: &MemoryStore) -> AppState {
    AppState::new(AppConfig::default(), store.repository())
}

pub fn app(store: &MemoryStore) -> axum::Router {
    api::router(app_state(store))
}

pub fn claims(user: &User) -> UserClaims {
    UserClaims::for_user(user, 1)
}

/// Bearer token for `user`, signed with the default secret
pub fn token(user: &User) -> String {
    let secret = AppConfig::default().auth.jwt_secret;
    claims(user).create_token(&secret).unwrap()
}
