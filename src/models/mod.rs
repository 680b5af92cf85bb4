//! Data models for Biblio

pub mod book;
pub mod borrowing;
pub mod user;

// Re-export commonly used types
pub use book::{BookSummary, Copies};
pub use borrowing::{Borrowing, BorrowingDetails, BorrowingStats, BorrowingStatus};
pub use user::{Role, UserClaims, UserSummary};
