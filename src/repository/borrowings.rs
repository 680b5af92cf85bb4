//! Borrowings repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use super::BorrowingStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookSummary,
        borrowing::{
            Borrowing, BorrowingDetails, BorrowingFilter, BorrowingPatch, BorrowingStatus,
            NewBorrowing, StatusSample,
        },
        user::{Role, UserSummary},
    },
};

const BORROWING_COLUMNS: &str =
    "id, user_id, book_id, borrowed_at, due_date, returned_at, status, notes, created_at, updated_at";

/// Borrowing columns plus user and book summaries. Left joins so that a row
/// whose user or book vanished is still listed.
const DETAILS_SELECT: &str = r#"
    SELECT b.id, b.user_id, b.book_id, b.borrowed_at, b.due_date, b.returned_at,
           b.status, b.notes, b.created_at, b.updated_at,
           u.id AS u_id, u.email AS u_email, u.name AS u_name, u.role AS u_role,
           bk.id AS bk_id, bk.title AS bk_title, bk.author AS bk_author,
           bk.isbn AS bk_isbn, bk.cover_url AS bk_cover_url,
           bk.published_year AS bk_published_year,
           bk.total_copies AS bk_total_copies, bk.available_copies AS bk_available_copies
    FROM borrowings b
    LEFT JOIN users u ON u.id = b.user_id
    LEFT JOIN books bk ON bk.id = b.book_id
"#;

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Build the WHERE clause for list filters. Returns the clause and the
    /// index of the next free bind parameter.
    fn filter_clause(filter: &BorrowingFilter) -> (String, usize) {
        let mut conditions = vec!["1=1".to_string()];
        let mut idx = 1;

        macro_rules! add_condition {
            ($field:expr, $sql:literal) => {
                if $field.is_some() {
                    conditions.push(format!($sql, idx));
                    idx += 1;
                }
            };
        }

        add_condition!(filter.status, "b.status = ${}");
        add_condition!(filter.user_id, "b.user_id = ${}");
        add_condition!(filter.book_id, "b.book_id = ${}");
        if filter.overdue == Some(true) {
            conditions.push(format!("b.due_date < ${}", idx));
            idx += 1;
        }

        (conditions.join(" AND "), idx)
    }
}

fn details_from_row(row: &PgRow, now: DateTime<Utc>) -> Result<BorrowingDetails, sqlx::Error> {
    let borrowing = Borrowing {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        book_id: row.try_get("book_id")?,
        borrowed_at: row.try_get("borrowed_at")?,
        due_date: row.try_get("due_date")?,
        returned_at: row.try_get("returned_at")?,
        status: row.try_get("status")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };

    let user = match row.try_get::<Option<Uuid>, _>("u_id")? {
        Some(id) => Some(UserSummary {
            id,
            email: row.try_get("u_email")?,
            name: row.try_get("u_name")?,
            role: row.try_get::<Role, _>("u_role")?,
        }),
        None => None,
    };

    let book = match row.try_get::<Option<Uuid>, _>("bk_id")? {
        Some(id) => Some(BookSummary {
            id,
            title: row.try_get("bk_title")?,
            author: row.try_get("bk_author")?,
            isbn: row.try_get("bk_isbn")?,
            cover_url: row.try_get("bk_cover_url")?,
            published_year: row.try_get("bk_published_year")?,
            total_copies: row.try_get("bk_total_copies")?,
            available_copies: row.try_get("bk_available_copies")?,
        }),
        None => None,
    };

    Ok(BorrowingDetails::new(borrowing, user, book, now))
}

/// Map constraint violations on insert to lifecycle errors
fn insert_error(error: sqlx::Error, borrowing: &NewBorrowing) -> AppError {
    if let sqlx::Error::Database(ref db) = error {
        if db.is_unique_violation() {
            return AppError::Conflict("User has already borrowed this book".to_string());
        }
        if db.is_foreign_key_violation() {
            return AppError::NotFound(format!(
                "User {} or book {} not found",
                borrowing.user_id, borrowing.book_id
            ));
        }
    }
    AppError::Database(error)
}

#[async_trait]
impl BorrowingStore for BorrowingsRepository {
    async fn get(&self, id: Uuid) -> AppResult<Option<Borrowing>> {
        let query = format!("SELECT {} FROM borrowings WHERE id = $1", BORROWING_COLUMNS);
        let borrowing = sqlx::query_as::<_, Borrowing>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(borrowing)
    }

    async fn find_active(&self, user_id: Uuid, book_id: Uuid) -> AppResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM borrowings
            WHERE user_id = $1 AND book_id = $2 AND status = $3
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(BorrowingStatus::Borrowed)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert(&self, borrowing: &NewBorrowing) -> AppResult<Borrowing> {
        let query = format!(
            r#"
            INSERT INTO borrowings (user_id, book_id, borrowed_at, due_date, status, notes,
                                    created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $3, $3)
            RETURNING {}
            "#,
            BORROWING_COLUMNS
        );
        sqlx::query_as::<_, Borrowing>(&query)
            .bind(borrowing.user_id)
            .bind(borrowing.book_id)
            .bind(borrowing.borrowed_at)
            .bind(borrowing.due_date)
            .bind(BorrowingStatus::Borrowed)
            .bind(&borrowing.notes)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| insert_error(e, borrowing))
    }

    async fn mark_returned(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Borrowing>> {
        let query = format!(
            r#"
            UPDATE borrowings
            SET status = $2, returned_at = $3, updated_at = $3
            WHERE id = $1 AND status = $4
            RETURNING {}
            "#,
            BORROWING_COLUMNS
        );
        let borrowing = sqlx::query_as::<_, Borrowing>(&query)
            .bind(id)
            .bind(BorrowingStatus::Returned)
            .bind(at)
            .bind(BorrowingStatus::Borrowed)
            .fetch_optional(&self.pool)
            .await?;
        Ok(borrowing)
    }

    async fn patch(&self, id: Uuid, patch: &BorrowingPatch) -> AppResult<Option<Borrowing>> {
        let query = format!(
            r#"
            UPDATE borrowings
            SET due_date = COALESCE($2, due_date),
                notes = CASE WHEN $3::text IS NULL THEN notes ELSE NULLIF($3, '') END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BORROWING_COLUMNS
        );
        let borrowing = sqlx::query_as::<_, Borrowing>(&query)
            .bind(id)
            .bind(patch.due_date)
            .bind(&patch.notes)
            .fetch_optional(&self.pool)
            .await?;
        Ok(borrowing)
    }

    async fn delete(&self, id: Uuid) -> AppResult<Option<Borrowing>> {
        let query = format!("DELETE FROM borrowings WHERE id = $1 RETURNING {}", BORROWING_COLUMNS);
        let borrowing = sqlx::query_as::<_, Borrowing>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(borrowing)
    }

    async fn details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<BorrowingDetails>> {
        let query = format!("{} WHERE b.id = $1", DETAILS_SELECT);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(details_from_row(&row, now)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        filter: &BorrowingFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let (where_clause, _) = Self::filter_clause(filter);
        let query = format!(
            "{} WHERE {} ORDER BY b.created_at DESC",
            DETAILS_SELECT, where_clause
        );

        // Bind order must follow filter_clause
        let mut builder = sqlx::query(&query);
        if let Some(status) = filter.status {
            builder = builder.bind(status);
        }
        if let Some(user_id) = filter.user_id {
            builder = builder.bind(user_id);
        }
        if let Some(book_id) = filter.book_id {
            builder = builder.bind(book_id);
        }
        if filter.overdue == Some(true) {
            builder = builder.bind(now);
        }

        let rows = builder.fetch_all(&self.pool).await?;
        let details = rows
            .iter()
            .map(|row| details_from_row(row, now))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(details)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        // Same predicate as models::borrowing::is_overdue
        let query = format!(
            "{} WHERE b.status = $1 AND b.due_date < $2 ORDER BY b.due_date ASC",
            DETAILS_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(BorrowingStatus::Borrowed)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        let details = rows
            .iter()
            .map(|row| details_from_row(row, now))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(details)
    }

    async fn status_samples(&self) -> AppResult<Vec<StatusSample>> {
        let samples = sqlx::query_as::<_, StatusSample>("SELECT status, due_date FROM borrowings")
            .fetch_all(&self.pool)
            .await?;
        Ok(samples)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
