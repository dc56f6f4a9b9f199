use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[sqlx(rename = "USER")]
    User,
    #[sqlx(rename = "ADMIN")]
    Admin,
}

// No Serialize on purpose: the credential hash must never reach a response
// body. API responses use their own typed views.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub async fn create(
        pool: &PgPool,
        login: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO users (login, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(login)
        .bind(password_hash)
        .bind(role)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn update_role<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        role: UserRole,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users SET role = $2 WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(role)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Deletes the user row. Owned cards, their keys and pending requests go
    /// with it through the FK cascades; the number-index entries do not (no
    /// FK there), so the caller must release those in the same transaction.
    pub async fn delete<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
