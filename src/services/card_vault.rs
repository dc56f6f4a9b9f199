use chrono::{Datelike, Days, Months, NaiveDate, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::card::{Card, CardStatus, CardWithOwner};
use crate::models::card_key::CardKey;
use crate::models::status_request::StatusRequest;
use crate::models::user::User;
use crate::services::access_guard::{self, GuardError, Principal};
use crate::services::card_cipher;
use crate::services::encryption::CryptoError;
use crate::services::key_vault::KeyVault;
use crate::services::number_index::{NumberIndex, ReserveOutcome};

/// Retry budget for the unique-number generation loop. The number space makes
/// exhaustion astronomically unlikely; hitting the cap means the RNG or the
/// index is broken, and that is an internal error rather than a hang.
pub const MAX_NUMBER_GENERATION_ATTEMPTS: u32 = 100;

const CARD_NUMBER_LEN: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum CardVaultError {
    #[error("User not found")]
    OwnerNotFound,

    #[error("Card not found")]
    CardNotFound,

    #[error("Too many attempts to generate a card number")]
    GenerationExhausted,

    #[error("Card key record is missing")]
    KeyMissing,

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<CardVaultError> for AppError {
    fn from(err: CardVaultError) -> Self {
        match err {
            CardVaultError::OwnerNotFound | CardVaultError::CardNotFound => {
                AppError::NotFound(err.to_string())
            }
            CardVaultError::Guard(e) => e.into(),
            CardVaultError::Database(e) => AppError::Database(e),
            // Exhaustion and crypto failures stay opaque to callers.
            CardVaultError::GenerationExhausted
            | CardVaultError::KeyMissing
            | CardVaultError::Crypto(_) => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}

/// Card as shown to its owner: masked number, MM/YY expiry.
#[derive(Debug, Serialize)]
pub struct OwnerCardView {
    pub id: Uuid,
    pub number: String,
    pub expires: String,
    pub status: CardStatus,
    pub balance: Decimal,
    pub owner: String,
}

/// Card as shown to an administrator. Still only the masked number; the
/// plaintext never leaves the service layer.
#[derive(Debug, Serialize)]
pub struct AdminCardView {
    pub id: Uuid,
    pub number: String,
    pub owner_id: Uuid,
    pub owner: String,
    pub validity_period: NaiveDate,
    pub status: CardStatus,
    pub balance: Decimal,
}

/// Separately-typed listing per audience instead of one shape filtered at
/// serialization time.
#[derive(Debug, Serialize)]
#[serde(tag = "view", content = "cards", rename_all = "snake_case")]
pub enum CardListing {
    Owner(Vec<OwnerCardView>),
    Admin(Vec<AdminCardView>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardAction {
    Activate,
    Block,
}

impl CardAction {
    fn target_status(self) -> CardStatus {
        match self {
            CardAction::Activate => CardStatus::Active,
            CardAction::Block => CardStatus::Blocked,
        }
    }
}

/// Issues a new card: resolves the owner, claims a unique number, envelope
/// encrypts it and persists card, wrapped key and reservation as one
/// transaction. A failure anywhere rolls the reservation back with the rest.
#[tracing::instrument(skip_all, fields(owner_id = %owner_id))]
pub async fn issue(
    pool: &PgPool,
    key_vault: &KeyVault,
    number_index: &NumberIndex,
    owner_id: Uuid,
    validity_months: Option<u32>,
    default_validity_months: u32,
) -> Result<OwnerCardView, CardVaultError> {
    let owner = User::find_by_id(pool, owner_id)
        .await?
        .ok_or(CardVaultError::OwnerNotFound)?;

    let months = validity_months.unwrap_or(default_validity_months);
    let validity_period = validity_end_of_month(Utc::now().date_naive(), months);

    let mut tx = pool.begin().await?;

    let number = claim_unique_number(&mut tx, number_index, generate_card_number).await?;

    let card_key = card_cipher::generate_card_key()?;
    let encrypted_number = card_cipher::encrypt_number(&number, &card_key)?;
    let wrapped_key = key_vault.wrap_key(&card_key)?;

    let card = Card::create(&mut *tx, owner.id, &encrypted_number, validity_period).await?;
    CardKey::create(&mut *tx, card.id, &wrapped_key).await?;

    tx.commit().await?;

    tracing::info!(card_id = %card.id, validity_period = %card.validity_period, "Card issued");

    Ok(owner_view(&card, &number, &owner.login))
}

/// Removes a card together with its wrapped key, its number reservation and
/// any pending status request, as one transaction. The number is decrypted
/// only to locate the index digest to release.
#[tracing::instrument(skip_all, fields(card_id = %card_id))]
pub async fn delete(
    pool: &PgPool,
    key_vault: &KeyVault,
    number_index: &NumberIndex,
    card_id: Uuid,
) -> Result<(), CardVaultError> {
    let card = Card::find_by_id(pool, card_id)
        .await?
        .ok_or(CardVaultError::CardNotFound)?;

    let number = decrypt_card_number(pool, key_vault, &card).await?;
    let digest = number_index.digest(&number);

    let mut tx = pool.begin().await?;

    number_index.release(&mut *tx, &digest).await?;
    CardKey::delete_by_card_id(&mut *tx, card.id).await?;
    StatusRequest::delete_by_card_id(&mut *tx, card.id).await?;
    Card::delete(&mut *tx, card.id).await?;

    tx.commit().await?;

    tracing::info!(card_id = %card.id, "Card deleted");

    Ok(())
}

/// Administrator status toggle. Setting the current status again is a no-op;
/// either way a pending status request for the card is consumed.
#[tracing::instrument(skip(pool), fields(card_id = %card_id))]
pub async fn set_status(
    pool: &PgPool,
    card_id: Uuid,
    action: CardAction,
) -> Result<(), CardVaultError> {
    let card = Card::find_by_id(pool, card_id)
        .await?
        .ok_or(CardVaultError::CardNotFound)?;

    let mut tx = pool.begin().await?;

    Card::update_status(&mut *tx, card.id, action.target_status()).await?;
    let consumed = StatusRequest::delete_by_card_id(&mut *tx, card.id).await?;

    tx.commit().await?;

    tracing::info!(card_id = %card.id, ?action, consumed_request = consumed, "Card status updated");

    Ok(())
}

/// Owner-filed request for an administrator to change the card's status.
pub async fn request_status_change(
    pool: &PgPool,
    principal: &Principal,
    card_id: Uuid,
    action: CardAction,
) -> Result<(), CardVaultError> {
    let card = Card::find_by_id(pool, card_id)
        .await?
        .ok_or(CardVaultError::CardNotFound)?;

    access_guard::require_owner(principal, &card)?;
    access_guard::require_available(&card, Utc::now().date_naive())?;

    StatusRequest::upsert(pool, card.id, action.target_status()).await?;

    tracing::info!(card_id = %card.id, requested = ?action, "Status change requested");

    Ok(())
}

/// Pending status request as shown in the administrator review queue.
#[derive(Debug, Serialize)]
pub struct StatusRequestView {
    pub id: Uuid,
    pub card_id: Uuid,
    pub requested_status: CardStatus,
    pub created_at: chrono::DateTime<Utc>,
}

/// Pending status requests, oldest first.
pub async fn list_status_requests(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<StatusRequestView>, CardVaultError> {
    let requests = StatusRequest::list(pool, limit, offset).await?;

    Ok(requests
        .into_iter()
        .map(|r| StatusRequestView {
            id: r.id,
            card_id: r.card_id,
            requested_status: r.requested_status,
            created_at: r.created_at,
        })
        .collect())
}

/// Lists cards for the caller: owners see their own cards, administrators see
/// everyone's in the admin shape.
pub async fn list(
    pool: &PgPool,
    key_vault: &KeyVault,
    principal: &Principal,
    status: Option<CardStatus>,
    limit: i64,
    offset: i64,
) -> Result<CardListing, CardVaultError> {
    if access_guard::require_admin(principal).is_ok() {
        let rows = Card::list_all(pool, status, limit, offset).await?;
        let mut views = Vec::with_capacity(rows.len());
        for CardWithOwner { card, owner_login } in rows {
            let number = decrypt_card_number(pool, key_vault, &card).await?;
            views.push(AdminCardView {
                id: card.id,
                number: mask_number(&number),
                owner_id: card.owner_id,
                owner: owner_login,
                validity_period: card.validity_period,
                status: card.status,
                balance: card.balance,
            });
        }
        return Ok(CardListing::Admin(views));
    }

    let rows = Card::list_by_owner(pool, principal.user_id, status, limit, offset).await?;
    let mut views = Vec::with_capacity(rows.len());
    for CardWithOwner { card, owner_login } in rows {
        let number = decrypt_card_number(pool, key_vault, &card).await?;
        views.push(owner_view(&card, &number, &owner_login));
    }

    Ok(CardListing::Owner(views))
}

/// Unwraps the card's key and decrypts its number. Internal-only; callers
/// expose at most the masked form.
pub async fn decrypt_card_number(
    pool: &PgPool,
    key_vault: &KeyVault,
    card: &Card,
) -> Result<String, CardVaultError> {
    let key_row = CardKey::find_by_card_id(pool, card.id)
        .await?
        .ok_or(CardVaultError::KeyMissing)?;

    let card_key = key_vault.unwrap_key(&key_row.wrapped_key)?;
    let number = card_cipher::decrypt_number(&card.encrypted_number, &card_key)?;

    Ok(number)
}

/// Draws candidates from `generate` until one reserves a fresh digest in the
/// number index, giving up after the retry budget. The reservation joins the
/// caller's transaction, so rolling back releases it.
pub async fn claim_unique_number<F>(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    number_index: &NumberIndex,
    mut generate: F,
) -> Result<String, CardVaultError>
where
    F: FnMut() -> Result<String, CryptoError>,
{
    for _ in 0..MAX_NUMBER_GENERATION_ATTEMPTS {
        let candidate = generate()?;
        let digest = number_index.digest(&candidate);

        match number_index.reserve(&mut **tx, &digest).await? {
            ReserveOutcome::Inserted => return Ok(candidate),
            ReserveOutcome::Collided => continue,
        }
    }

    Err(CardVaultError::GenerationExhausted)
}

fn owner_view(card: &Card, number: &str, owner_login: &str) -> OwnerCardView {
    OwnerCardView {
        id: card.id,
        number: mask_number(number),
        expires: format_expiry(card.validity_period),
        status: card.status,
        balance: card.balance,
        owner: owner_login.to_string(),
    }
}

/// Random numeric candidate of fixed length. Bytes of 250 and above are
/// redrawn so every digit is exactly uniform.
fn generate_card_number() -> Result<String, CryptoError> {
    let rng = SystemRandom::new();
    let mut number = String::with_capacity(CARD_NUMBER_LEN);
    let mut bytes = [0u8; CARD_NUMBER_LEN];

    while number.len() < CARD_NUMBER_LEN {
        rng.fill(&mut bytes)?;
        for &b in &bytes {
            if b < 250 && number.len() < CARD_NUMBER_LEN {
                number.push(char::from(b'0' + b % 10));
            }
        }
    }

    Ok(number)
}

/// Expiry is always the last calendar day of the target month, so a one-month
/// card issued any day in March runs to the end of April.
pub fn validity_end_of_month(today: NaiveDate, months: u32) -> NaiveDate {
    let target = today + Months::new(months);
    let first_of_month = target.with_day(1).expect("day 1 always valid");

    first_of_month + Months::new(1) - Days::new(1)
}

pub fn mask_number(number: &str) -> String {
    let last4 = &number[number.len().saturating_sub(4)..];

    format!("**** **** **** {}", last4)
}

pub fn format_expiry(date: NaiveDate) -> String {
    date.format("%m/%y").to_string()
}
