use sqlx::{PgExecutor, PgPool};

/// Outcome of an attempt to claim a number's uniqueness slot. A collision is
/// an ordinary result the generation loop retries on, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Inserted,
    Collided,
}

/// Atomically claims a digest under the primary-key constraint. Concurrent
/// attempts on the same digest have exactly one winner; losers observe
/// `Collided` with no partial insert.
pub async fn try_reserve<'e>(
    executor: impl PgExecutor<'e>,
    digest: &str,
) -> Result<ReserveOutcome, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO card_number_index (digest)
        VALUES ($1)
        ON CONFLICT (digest) DO NOTHING
        "#,
    )
    .bind(digest)
    .execute(executor)
    .await?;

    if result.rows_affected() == 1 {
        Ok(ReserveOutcome::Inserted)
    } else {
        Ok(ReserveOutcome::Collided)
    }
}

pub async fn release<'e>(executor: impl PgExecutor<'e>, digest: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        DELETE FROM card_number_index WHERE digest = $1
        "#,
    )
    .bind(digest)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn exists(pool: &PgPool, digest: &str) -> Result<bool, sqlx::Error> {
    let found = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(SELECT 1 FROM card_number_index WHERE digest = $1)
        "#,
    )
    .bind(digest)
    .fetch_one(pool)
    .await?;

    Ok(found)
}
