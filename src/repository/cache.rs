//! Redis read-through cache for single-book reads
//!
//! Writes evict `book:{id}` only after the underlying change has committed.
//! A `get_by_id` that read the row before the commit and stores it after the
//! eviction re-caches the old row, which is then served until its TTL
//! (`cache.ttl_seconds`) expires. Stock shown on a cached book may therefore
//! lag by up to one TTL. Borrowing and returning never read through the
//! cache, so they always see the locked row.

use std::sync::Arc;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookFilter, CreateBook, SearchParams, UpdateBook},
};

use super::BooksRepository;

fn book_key(id: i32) -> String {
    format!("book:{}", id)
}

/// Connection to the cache server with the entry lifetime
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisCache {
    /// Connect and check the server answers
    pub async fn connect(url: &str, ttl_seconds: u64) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { conn, ttl_seconds })
    }

    async fn get(&self, id: i32) -> Option<Book> {
        let mut conn = self.conn.clone();
        let cached = match conn.get::<_, Option<String>>(book_key(id)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read book {} from cache: {}", id, e);
                return None;
            }
        };

        cached.and_then(|json| match serde_json::from_str(&json) {
            Ok(book) => Some(book),
            Err(e) => {
                tracing::warn!("Discarding malformed cache entry for book {}: {}", id, e);
                None
            }
        })
    }

    async fn put(&self, book: &Book) {
        let json = match serde_json::to_string(book) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize book {} for cache: {}", book.id, e);
                return;
            }
        };

        let mut conn = self.conn.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(book_key(book.id), json, self.ttl_seconds)
            .await
        {
            tracing::warn!("Failed to cache book {}: {}", book.id, e);
        }
    }

    async fn evict(&self, id: i32) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(book_key(id)).await {
            tracing::warn!("Failed to evict book {} from cache: {}", id, e);
        }
    }
}

/// Books repository answering `get_by_id` from Redis when possible
pub struct CachingBooksRepository {
    inner: Arc<dyn BooksRepository>,
    cache: RedisCache,
}

impl CachingBooksRepository {
    pub fn new(inner: Arc<dyn BooksRepository>, cache: RedisCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl BooksRepository for CachingBooksRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        if let Some(book) = self.cache.get(id).await {
            return Ok(book);
        }

        let book = self.inner.get_by_id(id).await?;
        self.cache.put(&book).await;
        Ok(book)
    }

    async fn create(&self, book: &CreateBook) -> AppResult<i32> {
        self.inner.create(book).await
    }

    async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<()> {
        self.inner.update(id, book).await?;
        self.cache.evict(id).await;
        Ok(())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        self.inner.delete(id).await?;
        self.cache.evict(id).await;
        Ok(())
    }

    async fn count(&self, filter: &BookFilter) -> AppResult<i64> {
        self.inner.count(filter).await
    }

    async fn page_ids(&self, params: &SearchParams) -> AppResult<Vec<i32>> {
        self.inner.page_ids(params).await
    }

    async fn fetch_by_ids(&self, ids: &[i32]) -> AppResult<Vec<Book>> {
        self.inner.fetch_by_ids(ids).await
    }

    async fn invalidate(&self, id: i32) {
        self.cache.evict(id).await;
    }
}
