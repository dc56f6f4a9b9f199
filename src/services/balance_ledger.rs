use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::card::{max_balance, Card};
use crate::services::access_guard::{self, GuardError, Principal};

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("Card not found")]
    CardNotFound,

    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Cannot transfer to the same card")]
    SameCard,

    #[error("Not enough balance")]
    InsufficientFunds,

    #[error("Balance is too high")]
    BalanceOverflow,

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::CardNotFound => AppError::NotFound(err.to_string()),
            LedgerError::NegativeAmount | LedgerError::SameCard => {
                AppError::BadRequest(err.to_string())
            }
            LedgerError::InsufficientFunds => AppError::InsufficientFunds,
            LedgerError::BalanceOverflow => AppError::BalanceOverflow,
            LedgerError::Guard(e) => e.into(),
            LedgerError::Database(e) => AppError::Database(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceAction {
    DepositMoney,
    WithdrawMoney,
}

/// Checks that `balance + delta` stays within [0, max]. Distinct outcomes for
/// "would go negative" and "would overflow", both different from not-found
/// and unavailable.
fn validate_delta(balance: Decimal, delta: Decimal) -> Result<Decimal, LedgerError> {
    let new_balance = balance
        .checked_add(delta)
        .ok_or(LedgerError::BalanceOverflow)?;

    if new_balance > max_balance() {
        return Err(LedgerError::BalanceOverflow);
    }
    if new_balance < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds);
    }

    Ok(new_balance)
}

/// Deposit or withdrawal on a single card, owner-only.
///
/// The bounds are validated against the freshly loaded row, then applied as a
/// conditional update so a concurrent mutation cannot turn the validated
/// write into a lost update or a negative balance.
#[tracing::instrument(skip(pool, principal), fields(card_id = %card_id))]
pub async fn adjust(
    pool: &PgPool,
    principal: &Principal,
    card_id: Uuid,
    action: BalanceAction,
    amount: Decimal,
) -> Result<Decimal, LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::NegativeAmount);
    }

    let card = Card::find_by_id(pool, card_id)
        .await?
        .ok_or(LedgerError::CardNotFound)?;

    access_guard::require_owner(principal, &card)?;
    access_guard::require_available(&card, Utc::now().date_naive())?;

    let delta = match action {
        BalanceAction::DepositMoney => amount,
        BalanceAction::WithdrawMoney => -amount,
    };
    validate_delta(card.balance, delta)?;

    match Card::apply_balance_delta(pool, card.id, delta).await? {
        Some(new_balance) => {
            tracing::info!(card_id = %card.id, "Balance adjusted");
            Ok(new_balance)
        }
        // The row changed between validation and write; re-read to report the
        // outcome the caller actually raced against.
        None => Err(classify_rejection(pool, card_id, delta).await?),
    }
}

/// Moves `amount` between two cards of which the caller owns the source.
/// Both row updates run in one transaction: no reader ever sees the debit
/// without the credit.
#[tracing::instrument(skip(pool, principal), fields(from = %from_card_id, to = %to_card_id))]
pub async fn transfer(
    pool: &PgPool,
    principal: &Principal,
    from_card_id: Uuid,
    to_card_id: Uuid,
    amount: Decimal,
) -> Result<(), LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::NegativeAmount);
    }
    if from_card_id == to_card_id {
        return Err(LedgerError::SameCard);
    }

    let from_card = Card::find_by_id(pool, from_card_id)
        .await?
        .ok_or(LedgerError::CardNotFound)?;
    let to_card = Card::find_by_id(pool, to_card_id)
        .await?
        .ok_or(LedgerError::CardNotFound)?;

    // Only the authenticated owner of the source card may move money off it.
    access_guard::require_owner(principal, &from_card)?;

    let today = Utc::now().date_naive();
    access_guard::require_available(&from_card, today)?;
    access_guard::require_available(&to_card, today)?;

    validate_delta(from_card.balance, -amount)?;
    validate_delta(to_card.balance, amount)?;

    let mut tx = pool.begin().await?;

    // Touch the two rows in id order regardless of transfer direction, so
    // opposing transfers acquire their row locks in the same order and
    // cannot deadlock each other.
    let legs = if from_card.id < to_card.id {
        [(from_card.id, -amount), (to_card.id, amount)]
    } else {
        [(to_card.id, amount), (from_card.id, -amount)]
    };

    for (card_id, delta) in legs {
        if Card::apply_balance_delta(&mut *tx, card_id, delta)
            .await?
            .is_none()
        {
            tx.rollback().await?;
            return Err(classify_rejection(pool, card_id, delta).await?);
        }
    }

    tx.commit().await?;

    tracing::info!("Transfer completed");

    Ok(())
}

/// Current balance, owner-only.
pub async fn get_balance(
    pool: &PgPool,
    principal: &Principal,
    card_id: Uuid,
) -> Result<Decimal, LedgerError> {
    let card = Card::find_by_id(pool, card_id)
        .await?
        .ok_or(LedgerError::CardNotFound)?;

    access_guard::require_owner(principal, &card)?;

    Ok(card.balance)
}

/// A conditional balance update matched no row. Decides which invariant the
/// concurrent state violates now.
async fn classify_rejection(
    pool: &PgPool,
    card_id: Uuid,
    delta: Decimal,
) -> Result<LedgerError, sqlx::Error> {
    let card = match Card::find_by_id(pool, card_id).await? {
        Some(card) => card,
        None => return Ok(LedgerError::CardNotFound),
    };

    if !access_guard::is_available(&card, Utc::now().date_naive()) {
        return Ok(GuardError::CardUnavailable.into());
    }

    Ok(match validate_delta(card.balance, delta) {
        Err(e) => e,
        // Raced against a writer that has since made room; the caller retries.
        Ok(_) => LedgerError::InsufficientFunds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn deposit_within_bounds_passes() {
        assert_eq!(
            validate_delta(dec("50.00"), dec("150.00")).unwrap(),
            dec("200.00")
        );
    }

    #[test]
    fn withdrawal_below_zero_is_insufficient_funds() {
        assert!(matches!(
            validate_delta(dec("100.00"), dec("-150.00")),
            Err(LedgerError::InsufficientFunds)
        ));
    }

    #[test]
    fn withdrawal_to_exactly_zero_passes() {
        assert_eq!(
            validate_delta(dec("150.00"), dec("-150.00")).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn deposit_beyond_column_bound_is_overflow() {
        let balance = max_balance() - dec("0.50");

        assert!(matches!(
            validate_delta(balance, dec("1.00")),
            Err(LedgerError::BalanceOverflow)
        ));
        assert!(validate_delta(balance, dec("0.50")).is_ok());
    }

    #[test]
    fn rejection_reasons_map_to_distinct_responses() {
        use crate::error::AppError;

        assert!(matches!(
            AppError::from(LedgerError::InsufficientFunds),
            AppError::InsufficientFunds
        ));
        assert!(matches!(
            AppError::from(LedgerError::CardNotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(LedgerError::Guard(GuardError::CardUnavailable)),
            AppError::AccessDenied(_)
        ));
        assert!(matches!(
            AppError::from(LedgerError::NegativeAmount),
            AppError::BadRequest(_)
        ));
    }
}
