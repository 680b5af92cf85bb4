//! Book summaries and the copy-count ledger

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Copy counts of a book title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Copies {
    pub total_copies: i32,
    pub available_copies: i32,
}

impl Copies {
    pub fn new(total_copies: i32, available_copies: i32) -> Self {
        Self {
            total_copies,
            available_copies,
        }
    }

    /// At least one copy can be lent out
    pub fn can_lend(&self) -> bool {
        self.available_copies > 0
    }

    /// Counts after one copy is lent, or `None` when nothing is left to lend
    pub fn after_lend(&self) -> Option<Copies> {
        self.can_lend()
            .then(|| Copies::new(self.total_copies, self.available_copies - 1))
    }

    /// Counts after one copy comes back. Never exceeds the physical total,
    /// so earlier drift cannot push the counter out of bounds.
    pub fn after_release(&self) -> Copies {
        let available = (self.available_copies.max(0) + 1).min(self.total_copies.max(0));
        Copies::new(self.total_copies, available)
    }

    /// `0 <= available_copies <= total_copies`
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        0 <= self.available_copies && self.available_copies <= self.total_copies
    }
}

/// Book summary joined into borrowing records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub cover_url: Option<String>,
    pub published_year: Option<i32>,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl BookSummary {
    pub fn copies(&self) -> Copies {
        Copies::new(self.total_copies, self.available_copies)
    }

    pub fn set_copies(&mut self, copies: Copies) {
        self.total_copies = copies.total_copies;
        self.available_copies = copies.available_copies;
    }
}
