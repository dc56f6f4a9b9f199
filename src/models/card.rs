use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "card_status")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    #[sqlx(rename = "ACTIVE")]
    Active,
    #[sqlx(rename = "BLOCKED")]
    Blocked,
    #[sqlx(rename = "EXPIRED")]
    Expired,
}

#[derive(Debug, Clone, FromRow)]
pub struct Card {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub encrypted_number: Vec<u8>,
    pub validity_period: NaiveDate,
    pub status: CardStatus,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Capacity of the NUMERIC(15,2) balance column; the upper bound every
/// balance write is checked against.
pub fn max_balance() -> Decimal {
    Decimal::new(999_999_999_999_999, 2)
}

/// Card row joined with its owner's login, for list views.
#[derive(Debug, Clone, FromRow)]
pub struct CardWithOwner {
    #[sqlx(flatten)]
    pub card: Card,
    pub owner_login: String,
}

impl Card {
    /// Inserts a new card row. Runs inside the issuance transaction so the
    /// card only becomes visible together with its key and index reservation.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        owner_id: Uuid,
        encrypted_number: &[u8],
        validity_period: NaiveDate,
    ) -> Result<Self, sqlx::Error> {
        let card = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO cards (owner_id, encrypted_number, validity_period, status, balance)
            VALUES ($1, $2, $3, 'ACTIVE', 0)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(encrypted_number)
        .bind(validity_period)
        .fetch_one(executor)
        .await?;

        Ok(card)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let card = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM cards WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(card)
    }

    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: Uuid,
        status: Option<CardStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CardWithOwner>, sqlx::Error> {
        let cards = sqlx::query_as::<_, CardWithOwner>(
            r#"
            SELECT c.*, u.login AS owner_login
            FROM cards c
            JOIN users u ON u.id = c.owner_id
            WHERE c.owner_id = $1
              AND ($2::card_status IS NULL OR c.status = $2)
            ORDER BY c.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(owner_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(cards)
    }

    /// All cards of one owner, used by the user-deletion cascade.
    pub async fn find_all_by_owner(
        pool: &PgPool,
        owner_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let cards = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM cards WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;

        Ok(cards)
    }

    pub async fn list_all(
        pool: &PgPool,
        status: Option<CardStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CardWithOwner>, sqlx::Error> {
        let cards = sqlx::query_as::<_, CardWithOwner>(
            r#"
            SELECT c.*, u.login AS owner_login
            FROM cards c
            JOIN users u ON u.id = c.owner_id
            WHERE ($1::card_status IS NULL OR c.status = $1)
            ORDER BY c.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(cards)
    }

    pub async fn update_status<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        status: CardStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE cards SET status = $2 WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Applies a signed balance delta as one conditional update.
    ///
    /// The WHERE clause re-checks availability and both balance bounds
    /// against the row's current value, so two writers racing on the same
    /// card serialize on the row rather than losing an update or tripping a
    /// column overflow. Returns the new balance, or `None` when the guard
    /// rejected the write.
    pub async fn apply_balance_delta<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        delta: Decimal,
    ) -> Result<Option<Decimal>, sqlx::Error> {
        let new_balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE cards
            SET balance = balance + $2
            WHERE id = $1
              AND status = 'ACTIVE'
              AND validity_period >= CURRENT_DATE
              AND balance + $2 >= 0
              AND balance + $2 <= $3
            RETURNING balance
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(max_balance())
        .fetch_optional(executor)
        .await?;

        Ok(new_balance)
    }

    /// Flips every past-validity ACTIVE card to EXPIRED. BLOCKED cards are
    /// left alone so an administrator's block is never silently overridden.
    pub async fn expire_past_validity(
        pool: &PgPool,
        today: NaiveDate,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE cards
            SET status = 'EXPIRED'
            WHERE status = 'ACTIVE' AND validity_period < $1
            "#,
        )
        .bind(today)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM cards WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
