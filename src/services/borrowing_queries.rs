//! Read-side borrowing queries: listings, overdue report and statistics

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::borrowing::{BorrowingDetails, BorrowingFilter, BorrowingStats},
    repository::BorrowingStore,
};

#[derive(Clone)]
pub struct BorrowingQueryService {
    store: Arc<dyn BorrowingStore>,
}

impl BorrowingQueryService {
    pub fn new(store: Arc<dyn BorrowingStore>) -> Self {
        Self { store }
    }

    /// List borrowings matching the filter, newest first
    pub async fn list(&self, filter: &BorrowingFilter) -> AppResult<Vec<BorrowingDetails>> {
        self.store.list(filter, Utc::now()).await
    }

    /// All borrowings of one user, newest first
    pub async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<BorrowingDetails>> {
        self.list(&BorrowingFilter::for_user(user_id)).await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        self.store
            .details(id, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))
    }

    /// Active borrowings past their due date, earliest due date first
    pub async fn list_overdue(&self) -> AppResult<Vec<BorrowingDetails>> {
        self.store.list_overdue(Utc::now()).await
    }

    pub async fn stats(&self) -> AppResult<BorrowingStats> {
        let samples = self.store.status_samples().await?;
        Ok(BorrowingStats::tally(samples, Utc::now()))
    }

    /// Check that the store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
