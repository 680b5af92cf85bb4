//! In-memory store used by service and router tests.
//!
//! Mirrors the Postgres constraints the services rely on: the partial unique
//! index on active loans, the foreign keys, and the conditional updates on
//! `available_copies`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{BookLedger, BorrowingStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookSummary, Copies},
        borrowing::{
            Borrowing, BorrowingDetails, BorrowingFilter, BorrowingPatch, BorrowingStatus,
            NewBorrowing, StatusSample,
        },
        user::{Role, UserSummary},
    },
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserSummary>,
    books: HashMap<Uuid, BookSummary>,
    borrowings: Vec<Borrowing>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    pub fn add_user(&self, name: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        let user = UserSummary {
            id,
            email: format!("{}@example.org", name.to_lowercase()),
            name: name.to_string(),
            role,
        };
        self.state.write().unwrap().users.insert(id, user);
        id
    }

    pub fn add_book(&self, title: &str, total_copies: i32, available_copies: i32) -> Uuid {
        let id = Uuid::new_v4();
        let book = BookSummary {
            id,
            title: title.to_string(),
            author: "Anonymous".to_string(),
            isbn: None,
            cover_url: None,
            published_year: None,
            total_copies,
            available_copies,
        };
        self.state.write().unwrap().books.insert(id, book);
        id
    }

    /// Insert a borrowing row as-is, bypassing the lifecycle (fixtures)
    pub fn put_borrowing(&self, borrowing: Borrowing) {
        self.state.write().unwrap().borrowings.push(borrowing);
    }

    pub fn book_copies(&self, book_id: Uuid) -> Option<Copies> {
        self.state.read().unwrap().books.get(&book_id).map(BookSummary::copies)
    }

    pub fn active_loans(&self, user_id: Uuid, book_id: Uuid) -> usize {
        self.state
            .read()
            .unwrap()
            .borrowings
            .iter()
            .filter(|b| b.user_id == user_id && b.book_id == book_id && b.is_active())
            .count()
    }

    fn details_of(state: &State, borrowing: &Borrowing, now: DateTime<Utc>) -> BorrowingDetails {
        BorrowingDetails::new(
            borrowing.clone(),
            state.users.get(&borrowing.user_id).cloned(),
            state.books.get(&borrowing.book_id).cloned(),
            now,
        )
    }
}

#[async_trait]
impl BookLedger for MemoryStore {
    async fn copies(&self, book_id: Uuid) -> AppResult<Option<Copies>> {
        Ok(self.read()?.books.get(&book_id).map(BookSummary::copies))
    }

    async fn reserve_copy(&self, book_id: Uuid) -> AppResult<bool> {
        let mut state = self.write()?;
        let Some(book) = state.books.get_mut(&book_id) else {
            return Ok(false);
        };
        match book.copies().after_lend() {
            Some(copies) => {
                book.set_copies(copies);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_copy(&self, book_id: Uuid) -> AppResult<Option<Copies>> {
        let mut state = self.write()?;
        Ok(state.books.get_mut(&book_id).map(|book| {
            let copies = book.copies().after_release();
            book.set_copies(copies);
            copies
        }))
    }
}

#[async_trait]
impl BorrowingStore for MemoryStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<Borrowing>> {
        Ok(self.read()?.borrowings.iter().find(|b| b.id == id).cloned())
    }

    async fn find_active(&self, user_id: Uuid, book_id: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self
            .read()?
            .borrowings
            .iter()
            .find(|b| b.user_id == user_id && b.book_id == book_id && b.is_active())
            .map(|b| b.id))
    }

    async fn insert(&self, new: &NewBorrowing) -> AppResult<Borrowing> {
        let mut state = self.write()?;
        if !state.users.contains_key(&new.user_id) || !state.books.contains_key(&new.book_id) {
            return Err(AppError::NotFound(format!(
                "User {} or book {} not found",
                new.user_id, new.book_id
            )));
        }
        if state
            .borrowings
            .iter()
            .any(|b| b.user_id == new.user_id && b.book_id == new.book_id && b.is_active())
        {
            return Err(AppError::Conflict("User has already borrowed this book".to_string()));
        }

        let borrowing = Borrowing {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            book_id: new.book_id,
            borrowed_at: new.borrowed_at,
            due_date: new.due_date,
            returned_at: None,
            status: BorrowingStatus::Borrowed,
            notes: new.notes.clone(),
            created_at: new.borrowed_at,
            updated_at: new.borrowed_at,
        };
        state.borrowings.push(borrowing.clone());
        Ok(borrowing)
    }

    async fn mark_returned(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Borrowing>> {
        let mut state = self.write()?;
        Ok(state
            .borrowings
            .iter_mut()
            .find(|b| b.id == id && b.is_active())
            .map(|b| {
                b.status = BorrowingStatus::Returned;
                b.returned_at = Some(at);
                b.updated_at = at;
                b.clone()
            }))
    }

    async fn patch(&self, id: Uuid, patch: &BorrowingPatch) -> AppResult<Option<Borrowing>> {
        let mut state = self.write()?;
        Ok(state.borrowings.iter_mut().find(|b| b.id == id).map(|b| {
            if let Some(due_date) = patch.due_date {
                b.due_date = due_date;
            }
            if let Some(ref notes) = patch.notes {
                b.notes = (!notes.is_empty()).then(|| notes.clone());
            }
            b.updated_at = Utc::now();
            b.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> AppResult<Option<Borrowing>> {
        let mut state = self.write()?;
        let position = state.borrowings.iter().position(|b| b.id == id);
        Ok(position.map(|idx| state.borrowings.remove(idx)))
    }

    async fn details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<BorrowingDetails>> {
        let state = self.read()?;
        Ok(state
            .borrowings
            .iter()
            .find(|b| b.id == id)
            .map(|b| Self::details_of(&state, b, now)))
    }

    async fn list(
        &self,
        filter: &BorrowingFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let state = self.read()?;
        let mut rows: Vec<&Borrowing> = state
            .borrowings
            .iter()
            .filter(|b| filter.matches(b, now))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows.into_iter().map(|b| Self::details_of(&state, b, now)).collect())
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let state = self.read()?;
        let mut rows: Vec<&Borrowing> = state
            .borrowings
            .iter()
            .filter(|b| b.is_overdue(now))
            .collect();
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(rows.into_iter().map(|b| Self::details_of(&state, b, now)).collect())
    }

    async fn status_samples(&self) -> AppResult<Vec<StatusSample>> {
        Ok(self
            .read()?
            .borrowings
            .iter()
            .map(|b| StatusSample {
                status: b.status,
                due_date: b.due_date,
            })
            .collect())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
