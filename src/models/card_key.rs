use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

/// Per-card symmetric key, stored wrapped under the master key. Exactly one
/// row per card, created and deleted in the same transaction as the card.
#[derive(Debug, Clone, FromRow)]
pub struct CardKey {
    pub id: Uuid,
    pub card_id: Uuid,
    pub wrapped_key: Vec<u8>,
}

impl CardKey {
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        card_id: Uuid,
        wrapped_key: &[u8],
    ) -> Result<Self, sqlx::Error> {
        let key = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO card_keys (card_id, wrapped_key)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(card_id)
        .bind(wrapped_key)
        .fetch_one(executor)
        .await?;

        Ok(key)
    }

    pub async fn find_by_card_id(
        pool: &PgPool,
        card_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let key = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM card_keys WHERE card_id = $1
            "#,
        )
        .bind(card_id)
        .fetch_optional(pool)
        .await?;

        Ok(key)
    }

    pub async fn delete_by_card_id<'e>(
        executor: impl PgExecutor<'e>,
        card_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM card_keys WHERE card_id = $1
            "#,
        )
        .bind(card_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
