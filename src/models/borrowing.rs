//! Borrowing (loan) model and related types

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{book::BookSummary, user::UserSummary};
use crate::error::{AppError, AppResult};

/// Stored borrowing status. Overdue is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Borrowed,
    Returned,
}

impl BorrowingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Borrowed => "borrowed",
            BorrowingStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "borrowed" => Ok(BorrowingStatus::Borrowed),
            "returned" => Ok(BorrowingStatus::Returned),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for BorrowingStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for BorrowingStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowingStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        let s: String = self.as_str().to_string();
        <String as Encode<Postgres>>::encode(s, buf)
    }
}

/// An active loan whose due date has passed
pub fn is_overdue(status: BorrowingStatus, due_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    status == BorrowingStatus::Borrowed && due_date < now
}

/// Borrowing model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrowing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Borrowing {
    pub fn is_active(&self) -> bool {
        self.status == BorrowingStatus::Borrowed
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        is_overdue(self.status, self.due_date, now)
    }
}

/// Borrowing joined with its user and book for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowingDetails {
    #[serde(flatten)]
    pub borrowing: Borrowing,
    pub user: Option<UserSummary>,
    pub book: Option<BookSummary>,
    pub is_overdue: bool,
}

impl BorrowingDetails {
    pub fn new(
        borrowing: Borrowing,
        user: Option<UserSummary>,
        book: Option<BookSummary>,
        now: DateTime<Utc>,
    ) -> Self {
        let is_overdue = borrowing.is_overdue(now);
        Self {
            borrowing,
            user,
            book,
            is_overdue,
        }
    }
}

/// Parse a due date given as an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS`
/// timestamp (read as UTC) or a `YYYY-MM-DD` calendar date. A bare date is due
/// at the end of that day.
pub fn parse_due_date(raw: &str) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation("due_date is required".to_string()));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(end_of_day) = date.and_hms_opt(23, 59, 59) {
            return Ok(Utc.from_utc_datetime(&end_of_day));
        }
    }

    Err(AppError::Validation(format!(
        "Invalid due_date '{}': expected YYYY-MM-DD or an RFC 3339 timestamp",
        raw
    )))
}

/// Create borrowing command, as received from the API layer
#[derive(Debug, Clone)]
pub struct CreateBorrowing {
    pub user_id: Uuid,
    pub book_id: Option<Uuid>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

/// Validated borrowing ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrowing {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl CreateBorrowing {
    /// Check required inputs and resolve the due date, which must fall on
    /// today or a later calendar day.
    pub fn validate(self, now: DateTime<Utc>) -> AppResult<NewBorrowing> {
        let book_id = self
            .book_id
            .ok_or_else(|| AppError::Validation("book_id and due_date are required".to_string()))?;
        let raw_due = self
            .due_date
            .ok_or_else(|| AppError::Validation("book_id and due_date are required".to_string()))?;

        let due_date = parse_due_date(&raw_due)?;
        if due_date.date_naive() < now.date_naive() {
            return Err(AppError::Validation(format!(
                "due_date {} is in the past",
                due_date.date_naive()
            )));
        }

        Ok(NewBorrowing {
            user_id: self.user_id,
            book_id,
            borrowed_at: now,
            due_date,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

/// Update borrowing request (admin/librarian)
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBorrowing {
    /// Corrected due date (YYYY-MM-DD or RFC 3339)
    pub due_date: Option<String>,
    /// New notes; an empty or blank string clears them
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    /// Only `returned` on an active loan is accepted; it performs a return
    pub status: Option<BorrowingStatus>,
}

/// Field changes that have no effect on the ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorrowingPatch {
    pub due_date: Option<DateTime<Utc>>,
    /// `Some("")` clears the notes
    pub notes: Option<String>,
}

impl BorrowingPatch {
    pub fn is_empty(&self) -> bool {
        self.due_date.is_none() && self.notes.is_none()
    }
}

impl UpdateBorrowing {
    /// Split into the plain field patch and the requested status, if any
    pub fn into_parts(self) -> AppResult<(BorrowingPatch, Option<BorrowingStatus>)> {
        let due_date = self.due_date.as_deref().map(parse_due_date).transpose()?;
        Ok((
            BorrowingPatch {
                due_date,
                notes: self
                    .notes
                    .map(|n| if n.trim().is_empty() { String::new() } else { n }),
            },
            self.status,
        ))
    }
}

/// Borrowing list filters; all optional, combined with AND
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BorrowingFilter {
    pub status: Option<BorrowingStatus>,
    pub user_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    /// Only borrowings whose due date has passed
    pub overdue: Option<bool>,
}

impl BorrowingFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, borrowing: &Borrowing, now: DateTime<Utc>) -> bool {
        self.status.map_or(true, |s| borrowing.status == s)
            && self.user_id.map_or(true, |id| borrowing.user_id == id)
            && self.book_id.map_or(true, |id| borrowing.book_id == id)
            && (self.overdue != Some(true) || borrowing.due_date < now)
    }
}

/// Status and due date of one borrowing, enough to compute statistics
#[derive(Debug, Clone, Copy, FromRow)]
pub struct StatusSample {
    pub status: BorrowingStatus,
    pub due_date: DateTime<Utc>,
}

/// Aggregate borrowing counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowingStats {
    pub total: i64,
    pub borrowed: i64,
    pub returned: i64,
    pub overdue: i64,
}

impl BorrowingStats {
    pub fn tally<I>(samples: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = StatusSample>,
    {
        samples.into_iter().fold(Self::default(), |mut stats, sample| {
            stats.total += 1;
            match sample.status {
                BorrowingStatus::Borrowed => stats.borrowed += 1,
                BorrowingStatus::Returned => stats.returned += 1,
            }
            if is_overdue(sample.status, sample.due_date, now) {
                stats.overdue += 1;
            }
            stats
        })
    }
}
