//! Borrowing lifecycle service
//!
//! Per (user, book) pair a loan goes `NoActiveLoan -> Borrowed -> Returned`.
//! The service is the only writer of `borrowings.status`,
//! `borrowings.returned_at` and `books.available_copies`.
//!
//! The store offers no multi-statement transactions, so each operation is a
//! short sequence of atomic steps. When a later step fails after an earlier
//! one succeeded, the earlier step is compensated where possible; otherwise
//! the operation fails with [`AppError::Inconsistency`] and the ids needed for
//! manual reconciliation are logged.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::borrowing::{
        Borrowing, BorrowingDetails, BorrowingStatus, CreateBorrowing, UpdateBorrowing,
    },
    repository::{BookLedger, BorrowingStore},
};

#[derive(Clone)]
pub struct BorrowingsService {
    ledger: Arc<dyn BookLedger>,
    store: Arc<dyn BorrowingStore>,
}

impl BorrowingsService {
    pub fn new(ledger: Arc<dyn BookLedger>, store: Arc<dyn BorrowingStore>) -> Self {
        Self { ledger, store }
    }

    /// Lend a copy of a book to a user
    pub async fn create(&self, request: CreateBorrowing) -> AppResult<Borrowing> {
        let new = request.validate(Utc::now())?;

        let copies = self
            .ledger
            .copies(new.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", new.book_id)))?;

        if let Some(existing) = self.store.find_active(new.user_id, new.book_id).await? {
            return Err(AppError::Conflict(format!(
                "User has already borrowed this book (borrowing {})",
                existing
            )));
        }

        if !copies.can_lend() {
            return Err(AppError::Unavailable(
                "Book is not available for borrowing".to_string(),
            ));
        }

        // Another request may have taken the last copy since the read above
        if !self.ledger.reserve_copy(new.book_id).await? {
            return Err(AppError::Unavailable(
                "Book is not available for borrowing".to_string(),
            ));
        }

        let borrowing = match self.store.insert(&new).await {
            Ok(borrowing) => borrowing,
            Err(insert_err) => {
                // Give the reserved copy back before reporting the failure
                return match self.ledger.release_copy(new.book_id).await {
                    Ok(Some(_)) => Err(insert_err),
                    Ok(None) => Err(self.inconsistency(
                        None,
                        new.book_id,
                        "book disappeared while releasing a reserved copy",
                    )),
                    Err(release_err) => {
                        tracing::error!(
                            book_id = %new.book_id,
                            user_id = %new.user_id,
                            "Insert failed ({}) and reserved copy could not be released: {}",
                            insert_err,
                            release_err
                        );
                        Err(self.inconsistency(
                            None,
                            new.book_id,
                            "one copy reserved without a borrowing",
                        ))
                    }
                };
            }
        };

        tracing::info!(
            borrowing_id = %borrowing.id,
            user_id = %borrowing.user_id,
            book_id = %borrowing.book_id,
            due_date = %borrowing.due_date,
            "Borrowing created"
        );

        Ok(borrowing)
    }

    /// Return a borrowed book. Returning twice is rejected.
    pub async fn return_borrowing(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        let current = self.find(id).await?;
        if current.status == BorrowingStatus::Returned {
            return Err(AppError::Conflict("Book has already been returned".to_string()));
        }

        let now = Utc::now();
        let returned = self
            .store
            .mark_returned(id, now)
            .await?
            .ok_or_else(|| AppError::Conflict("Book has already been returned".to_string()))?;

        match self.ledger.release_copy(returned.book_id).await {
            Ok(Some(copies)) => {
                tracing::info!(
                    borrowing_id = %returned.id,
                    book_id = %returned.book_id,
                    available_copies = copies.available_copies,
                    "Borrowing returned"
                );
            }
            Ok(None) => {
                return Err(self.inconsistency(
                    Some(id),
                    returned.book_id,
                    "borrowing returned but its book no longer exists",
                ))
            }
            Err(err) => {
                tracing::error!(borrowing_id = %id, "Copy release failed: {}", err);
                return Err(self.inconsistency(
                    Some(id),
                    returned.book_id,
                    "borrowing returned but the copy was not put back",
                ));
            }
        }

        self.store
            .details(id, now)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))
    }

    /// Administrative correction of a borrowing.
    ///
    /// `due_date` and `notes` are plain edits. A status change is not a raw
    /// write: `returned` on an active loan goes through
    /// [`Self::return_borrowing`] so the ledger follows, and reopening a
    /// returned loan is refused since the transition is irreversible.
    pub async fn update(&self, id: Uuid, request: UpdateBorrowing) -> AppResult<Borrowing> {
        let (patch, status) = request.into_parts()?;
        if patch.is_empty() && status.is_none() {
            return Err(AppError::Validation(
                "Nothing to update: expected due_date, notes or status".to_string(),
            ));
        }

        let current = self.find(id).await?;

        let perform_return = match (current.status, status) {
            (BorrowingStatus::Returned, Some(BorrowingStatus::Borrowed)) => {
                return Err(AppError::Conflict(
                    "A returned borrowing cannot be reopened; create a new borrowing".to_string(),
                ));
            }
            (BorrowingStatus::Borrowed, Some(BorrowingStatus::Returned)) => true,
            _ => false,
        };

        if !patch.is_empty() {
            self.store
                .patch(id, &patch)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))?;
            tracing::info!(borrowing_id = %id, "Borrowing updated");
        }

        if perform_return {
            self.return_borrowing(id).await?;
        }

        self.find(id).await
    }

    /// Delete a borrowing. Deleting an active loan puts its copy back.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let removed = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))?;

        if removed.is_active() {
            if let Err(err) = self.ledger.release_copy(removed.book_id).await {
                tracing::error!(borrowing_id = %id, "Copy release failed: {}", err);
                return Err(self.inconsistency(
                    Some(id),
                    removed.book_id,
                    "active borrowing deleted but the copy was not put back",
                ));
            }
        }

        tracing::info!(
            borrowing_id = %id,
            book_id = %removed.book_id,
            was_active = removed.is_active(),
            "Borrowing deleted"
        );
        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Borrowing> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))
    }

    fn inconsistency(&self, borrowing_id: Option<Uuid>, book_id: Uuid, what: &str) -> AppError {
        let borrowing = borrowing_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());
        tracing::error!(
            borrowing_id = %borrowing,
            book_id = %book_id,
            "Ledger needs manual reconciliation: {}",
            what
        );
        AppError::Inconsistency(format!(
            "{} (borrowing {}, book {})",
            what, borrowing, book_id
        ))
    }
}
