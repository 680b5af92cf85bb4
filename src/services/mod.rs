//! Business logic services

pub mod borrowing_queries;
pub mod borrowings;

use std::sync::Arc;

use crate::repository::{BookLedger, BorrowingStore, Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub borrowings: borrowings::BorrowingsService,
    pub borrowing_queries: borrowing_queries::BorrowingQueryService,
}

impl Services {
    /// Create all services on top of the Postgres repository
    pub fn new(repository: Repository) -> Self {
        Self::with_stores(
            Arc::new(repository.books),
            Arc::new(repository.borrowings),
        )
    }

    /// Create all services on top of arbitrary stores
    pub fn with_stores(ledger: Arc<dyn BookLedger>, store: Arc<dyn BorrowingStore>) -> Self {
        Self {
            borrowings: borrowings::BorrowingsService::new(ledger, store.clone()),
            borrowing_queries: borrowing_queries::BorrowingQueryService::new(store),
        }
    }
}
