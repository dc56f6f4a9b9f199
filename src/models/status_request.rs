use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::card::CardStatus;

/// A user-submitted request to change a card's status, pending until an
/// administrator applies a status update for that card.
#[derive(Debug, Clone, FromRow)]
pub struct StatusRequest {
    pub id: Uuid,
    pub card_id: Uuid,
    pub requested_status: CardStatus,
    pub created_at: DateTime<Utc>,
}

impl StatusRequest {
    /// At most one pending request per card; re-filing replaces the old one.
    pub async fn upsert(
        pool: &PgPool,
        card_id: Uuid,
        requested_status: CardStatus,
    ) -> Result<Self, sqlx::Error> {
        let request = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO card_status_requests (card_id, requested_status)
            VALUES ($1, $2)
            ON CONFLICT (card_id) DO UPDATE
            SET requested_status = EXCLUDED.requested_status, created_at = NOW()
            RETURNING *
            "#,
        )
        .bind(card_id)
        .bind(requested_status)
        .fetch_one(pool)
        .await?;

        Ok(request)
    }

    /// Pending requests, oldest first, for the administrator review queue.
    pub async fn list(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let requests = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM card_status_requests
            ORDER BY created_at ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(requests)
    }

    /// Removes the pending request if one exists; returns whether it did.
    pub async fn delete_by_card_id<'e>(
        executor: impl PgExecutor<'e>,
        card_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM card_status_requests WHERE card_id = $1
            "#,
        )
        .bind(card_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
