//! Book copy-count ledger backed by Postgres

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::BookLedger;
use crate::{error::AppResult, models::book::Copies};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookLedger for BooksRepository {
    async fn copies(&self, book_id: Uuid) -> AppResult<Option<Copies>> {
        let copies = sqlx::query_as::<_, Copies>(
            "SELECT total_copies, available_copies FROM books WHERE id = $1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(copies)
    }

    async fn reserve_copy(&self, book_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(book_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_copy(&self, book_id: Uuid) -> AppResult<Option<Copies>> {
        // Same arithmetic as Copies::after_release
        let copies = sqlx::query_as::<_, Copies>(
            r#"
            UPDATE books
            SET available_copies = LEAST(total_copies, GREATEST(available_copies, 0) + 1),
                updated_at = NOW()
            WHERE id = $1
            RETURNING total_copies, available_copies
            "#,
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(copies)
    }
}
