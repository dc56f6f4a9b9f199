use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::card::Card;
use crate::models::user::{User, UserRole};
use crate::services::card_vault::{self, CardVaultError};
use crate::services::key_vault::KeyVault;
use crate::services::number_index::NumberIndex;

#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("Login is already taken")]
    LoginTaken,

    #[error("Password hashing failed")]
    Hashing,

    #[error(transparent)]
    CardVault(#[from] CardVaultError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => AppError::NotFound(err.to_string()),
            UserError::LoginTaken => AppError::Conflict(err.to_string()),
            UserError::Hashing => AppError::Internal(anyhow::Error::new(err)),
            UserError::CardVault(e) => e.into(),
            UserError::Database(e) => AppError::Database(e),
        }
    }
}

/// Registers a new user with an Argon2id credential hash and the USER role.
/// Credential verification itself lives in the external auth service; this
/// side only stores a hash it can hand over.
#[tracing::instrument(skip_all, fields(login = %login))]
pub async fn register(pool: &PgPool, login: &str, password: &str) -> Result<User, UserError> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| UserError::Hashing)?
        .to_string();

    let user = User::create(pool, login, &password_hash, UserRole::User)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => UserError::LoginTaken,
            _ => UserError::Database(e),
        })?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok(user)
}

pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>, UserError> {
    Ok(User::list(pool, limit, offset).await?)
}

pub async fn set_role(pool: &PgPool, user_id: Uuid, role: UserRole) -> Result<(), UserError> {
    if User::find_by_id(pool, user_id).await?.is_none() {
        return Err(UserError::NotFound);
    }

    User::update_role(pool, user_id, role).await?;

    Ok(())
}

/// Deletes a user and every card they own. The FK cascades take the cards,
/// keys and pending requests; the number-index reservations have no FK to
/// cascade through, so each owned card's digest is released in the same
/// transaction — a freed number must be issuable again afterwards.
#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn delete(
    pool: &PgPool,
    key_vault: &KeyVault,
    number_index: &NumberIndex,
    user_id: Uuid,
) -> Result<(), UserError> {
    let user = User::find_by_id(pool, user_id)
        .await?
        .ok_or(UserError::NotFound)?;

    let cards = Card::find_all_by_owner(pool, user.id).await?;

    let mut digests = Vec::with_capacity(cards.len());
    for card in &cards {
        let number = card_vault::decrypt_card_number(pool, key_vault, card).await?;
        digests.push(number_index.digest(&number));
    }

    let mut tx = pool.begin().await?;

    for digest in &digests {
        number_index.release(&mut *tx, digest).await?;
    }
    User::delete(&mut *tx, user.id).await?;

    tx.commit().await?;

    tracing::info!(cards_removed = cards.len(), "User deleted");

    Ok(())
}
