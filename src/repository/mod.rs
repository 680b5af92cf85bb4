//! Repository layer for database operations
//!
//! The lifecycle and query services talk to storage through two traits:
//! [`BookLedger`] for copy counts and [`BorrowingStore`] for borrowing rows.
//! Every mutating method is a single statement, so each one is atomic on its
//! own; multi-step consistency is handled by the services.

pub mod books;
pub mod borrowings;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::Copies,
        borrowing::{
            Borrowing, BorrowingDetails, BorrowingFilter, BorrowingPatch, NewBorrowing,
            StatusSample,
        },
    },
};

/// Copy-count ledger of the book catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookLedger: Send + Sync {
    /// Current copy counts, `None` if the book does not exist
    async fn copies(&self, book_id: Uuid) -> AppResult<Option<Copies>>;

    /// Take one copy if any is available. Returns `false` when none is left
    /// (or the book is gone); the check and the decrement are one operation.
    async fn reserve_copy(&self, book_id: Uuid) -> AppResult<bool>;

    /// Put one copy back, clamped to `total_copies`. Returns the new counts,
    /// `None` if the book does not exist.
    async fn release_copy(&self, book_id: Uuid) -> AppResult<Option<Copies>>;
}

/// Borrowing records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowingStore: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<Borrowing>>;

    /// Id of the active loan for the pair, if any
    async fn find_active(&self, user_id: Uuid, book_id: Uuid) -> AppResult<Option<Uuid>>;

    /// Insert an active loan. Fails with `Conflict` if the pair already has
    /// one and with `NotFound` if the user or book does not exist.
    async fn insert(&self, borrowing: &NewBorrowing) -> AppResult<Borrowing>;

    /// Move an active loan to `returned`. `None` if the row is missing or not
    /// active any more.
    async fn mark_returned(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Borrowing>>;

    async fn patch(&self, id: Uuid, patch: &BorrowingPatch) -> AppResult<Option<Borrowing>>;

    /// Delete a row and return it as it was
    async fn delete(&self, id: Uuid) -> AppResult<Option<Borrowing>>;

    async fn details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<BorrowingDetails>>;

    /// Newest-created first
    async fn list(
        &self,
        filter: &BorrowingFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowingDetails>>;

    /// Active loans past their due date, earliest due date first
    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>>;

    /// Status and due date of every borrowing
    async fn status_samples(&self) -> AppResult<Vec<StatusSample>>;

    async fn ping(&self) -> AppResult<()>;
}

/// Postgres-backed stores sharing one connection pool
#[derive(Clone)]
pub struct Repository {
    pub books: books::BooksRepository,
    pub borrowings: borrowings::BorrowingsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            borrowings: borrowings::BorrowingsRepository::new(pool),
        }
    }
}
