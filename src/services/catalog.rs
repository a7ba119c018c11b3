//! Catalog service: book search, book and author management

use std::collections::HashMap;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, CreateAuthor},
        book::{Book, BookPage, CreateBook, SearchParams, UpdateBook},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

/// Put `books` back in the order of `ids`. Ids with no matching book are
/// skipped (the row vanished between the two queries).
fn reorder(ids: &[i32], books: Vec<Book>) -> Vec<Book> {
    let mut by_id: HashMap<i32, Book> = books.into_iter().map(|b| (b.id, b)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books.
    ///
    /// Runs a count query, then resolves the ids of the requested page, then
    /// hydrates exactly those ids in a single batch query.
    pub async fn search_books(&self, params: &SearchParams) -> AppResult<BookPage> {
        let total_records = self.repository.books.count(&params.filter).await?;
        let ids = self.repository.books.page_ids(params).await?;

        let books = if ids.is_empty() {
            Vec::new()
        } else {
            let fetched = self.repository.books.fetch_by_ids(&ids).await?;
            reorder(&ids, fetched)
        };

        Ok(BookPage {
            books,
            total_records,
        })
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    async fn ensure_author(&self, author_id: i32) -> AppResult<()> {
        if self.repository.authors.exists(author_id).await? {
            Ok(())
        } else {
            Err(AppError::BadRequest(
                "Author with the specified ID does not exist".to_string(),
            ))
        }
    }

    /// Create a book and return it with its author
    pub async fn create_book(&self, mut book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        book.normalize();
        self.ensure_author(book.author_id).await?;

        let id = self.repository.books.create(&book).await?;
        tracing::info!("Created book {} ({})", id, book.isbn);
        self.repository.books.get_by_id(id).await
    }

    /// Update descriptive fields of a book. Stock is not writable here.
    pub async fn update_book(&self, id: i32, mut book: UpdateBook) -> AppResult<Book> {
        book.validate()?;
        book.normalize();
        self.ensure_author(book.author_id).await?;

        self.repository.books.update(id, &book).await?;
        self.repository.books.get_by_id(id).await
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!("Deleted book {}", id);
        Ok(())
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.authors.list().await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    pub async fn create_author(&self, author: CreateAuthor) -> AppResult<Author> {
        author.validate()?;
        self.repository.authors.create(&author).await
    }
}
