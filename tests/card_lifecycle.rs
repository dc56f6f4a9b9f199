//! Database-backed tests for the card lifecycle: number reservation,
//! issuance, deletion and balance movement. Each test runs against its own
//! freshly migrated database.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use cardvault::models::card::{self, Card};
use cardvault::models::card_key::CardKey;
use cardvault::models::number_index::ReserveOutcome;
use cardvault::models::user::UserRole;
use cardvault::services::access_guard::{GuardError, Principal};
use cardvault::services::balance_ledger::{self, BalanceAction, LedgerError};
use cardvault::services::card_vault::{self, CardAction, CardVaultError};
use cardvault::services::encryption::CryptoError;
use cardvault::services::key_vault::KeyVault;
use cardvault::services::number_index::NumberIndex;
use cardvault::services::users;

fn key_vault() -> KeyVault {
    KeyVault::new(vec![7u8; 32]).unwrap()
}

fn number_index() -> NumberIndex {
    NumberIndex::new(b"test-index-hmac-key")
}

fn owner(user_id: Uuid) -> Principal {
    Principal {
        user_id,
        role: UserRole::User,
    }
}

async fn set_balance(pool: &PgPool, card_id: Uuid, balance: Decimal) {
    sqlx::query("UPDATE cards SET balance = $2 WHERE id = $1")
        .bind(card_id)
        .bind(balance)
        .execute(pool)
        .await
        .unwrap();
}

async fn balance_of(pool: &PgPool, card_id: Uuid) -> Decimal {
    Card::find_by_id(pool, card_id)
        .await
        .unwrap()
        .unwrap()
        .balance
}

#[sqlx::test]
async fn issued_number_is_reserved_with_exactly_one_winner(pool: PgPool) {
    let vault = key_vault();
    let index = number_index();
    let user = users::register(&pool, "alice", "secret").await.unwrap();

    let view = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();

    let card = Card::find_by_id(&pool, view.id).await.unwrap().unwrap();
    let number = card_vault::decrypt_card_number(&pool, &vault, &card)
        .await
        .unwrap();
    let digest = index.digest(&number);

    assert!(index.exists(&pool, &digest).await.unwrap());

    // A second claimant of the same number loses the insert race.
    let outcome = index.reserve(&pool, &digest).await.unwrap();
    assert_eq!(outcome, ReserveOutcome::Collided);
}

#[sqlx::test]
async fn claiming_skips_numbers_already_in_the_index(pool: PgPool) {
    let index = number_index();

    let taken = "1111222233334444";
    let fresh = "5555666677778888";
    index.reserve(&pool, &index.digest(taken)).await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let mut candidates = [taken, fresh].into_iter();
    let claimed = card_vault::claim_unique_number(&mut tx, &index, move || {
        Ok::<_, CryptoError>(candidates.next().unwrap().to_string())
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(claimed, fresh);
    assert!(index.exists(&pool, &index.digest(fresh)).await.unwrap());
}

#[sqlx::test]
async fn claiming_gives_up_once_the_retry_budget_is_spent(pool: PgPool) {
    let index = number_index();

    // Exhaust a two-number space up front so every candidate collides.
    let space = ["1111222233334444", "5555666677778888"];
    for number in space {
        index.reserve(&pool, &index.digest(number)).await.unwrap();
    }

    let mut tx = pool.begin().await.unwrap();
    let mut n = 0usize;
    let result = card_vault::claim_unique_number(&mut tx, &index, move || {
        n += 1;
        Ok::<_, CryptoError>(space[n % 2].to_string())
    })
    .await;

    assert!(matches!(result, Err(CardVaultError::GenerationExhausted)));
}

#[sqlx::test]
async fn deleting_a_card_removes_every_trace_and_frees_the_number(pool: PgPool) {
    let vault = key_vault();
    let index = number_index();
    let user = users::register(&pool, "alice", "secret").await.unwrap();

    let view = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();
    let card = Card::find_by_id(&pool, view.id).await.unwrap().unwrap();
    let number = card_vault::decrypt_card_number(&pool, &vault, &card)
        .await
        .unwrap();
    let digest = index.digest(&number);

    card_vault::request_status_change(&pool, &owner(user.id), card.id, CardAction::Block)
        .await
        .unwrap();

    card_vault::delete(&pool, &vault, &index, card.id)
        .await
        .unwrap();

    assert!(Card::find_by_id(&pool, card.id).await.unwrap().is_none());
    assert!(CardKey::find_by_card_id(&pool, card.id)
        .await
        .unwrap()
        .is_none());
    assert!(!index.exists(&pool, &digest).await.unwrap());

    let pending: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM card_status_requests WHERE card_id = $1)")
            .bind(card.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(!pending);

    // The digest is claimable again, so the number can be reissued.
    let outcome = index.reserve(&pool, &digest).await.unwrap();
    assert_eq!(outcome, ReserveOutcome::Inserted);
}

#[sqlx::test]
async fn transfer_moves_the_exact_amount_between_own_cards(pool: PgPool) {
    let vault = key_vault();
    let index = number_index();
    let user = users::register(&pool, "alice", "secret").await.unwrap();
    let principal = owner(user.id);

    let a = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();
    let b = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();

    set_balance(&pool, a.id, Decimal::from(200)).await;
    set_balance(&pool, b.id, Decimal::from(50)).await;

    balance_ledger::transfer(&pool, &principal, a.id, b.id, Decimal::from(150))
        .await
        .unwrap();

    assert_eq!(balance_of(&pool, a.id).await, Decimal::from(50));
    assert_eq!(balance_of(&pool, b.id).await, Decimal::from(200));

    // Moving money back exercises the opposite row-id ordering as well.
    balance_ledger::transfer(&pool, &principal, b.id, a.id, Decimal::from(150))
        .await
        .unwrap();

    assert_eq!(balance_of(&pool, a.id).await, Decimal::from(200));
    assert_eq!(balance_of(&pool, b.id).await, Decimal::from(50));
}

#[sqlx::test]
async fn failed_transfer_leaves_both_balances_untouched(pool: PgPool) {
    let vault = key_vault();
    let index = number_index();
    let user = users::register(&pool, "alice", "secret").await.unwrap();
    let principal = owner(user.id);

    let a = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();
    let b = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();

    set_balance(&pool, a.id, Decimal::from(10)).await;
    set_balance(&pool, b.id, Decimal::from(50)).await;

    let result = balance_ledger::transfer(&pool, &principal, a.id, b.id, Decimal::from(150)).await;

    assert!(matches!(result, Err(LedgerError::InsufficientFunds)));
    assert_eq!(balance_of(&pool, a.id).await, Decimal::from(10));
    assert_eq!(balance_of(&pool, b.id).await, Decimal::from(50));
}

#[sqlx::test]
async fn blocked_card_rejects_balance_changes(pool: PgPool) {
    let vault = key_vault();
    let index = number_index();
    let user = users::register(&pool, "alice", "secret").await.unwrap();

    let view = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();
    set_balance(&pool, view.id, Decimal::from(100)).await;

    sqlx::query("UPDATE cards SET status = 'BLOCKED' WHERE id = $1")
        .bind(view.id)
        .execute(&pool)
        .await
        .unwrap();

    let result = balance_ledger::adjust(
        &pool,
        &owner(user.id),
        view.id,
        BalanceAction::DepositMoney,
        Decimal::from(25),
    )
    .await;

    assert!(matches!(
        result,
        Err(LedgerError::Guard(GuardError::CardUnavailable))
    ));
    assert_eq!(balance_of(&pool, view.id).await, Decimal::from(100));
}

#[sqlx::test]
async fn conditional_update_refuses_to_cross_the_balance_cap(pool: PgPool) {
    let vault = key_vault();
    let index = number_index();
    let user = users::register(&pool, "alice", "secret").await.unwrap();

    let view = card_vault::issue(&pool, &vault, &index, user.id, None, 24)
        .await
        .unwrap();
    set_balance(&pool, view.id, card::max_balance() - Decimal::ONE).await;

    // The guard itself must reject the write, not rely on callers having
    // pre-validated against a stale read.
    let updated = Card::apply_balance_delta(&pool, view.id, Decimal::from(2))
        .await
        .unwrap();
    assert!(updated.is_none());

    let updated = Card::apply_balance_delta(&pool, view.id, Decimal::ONE)
        .await
        .unwrap();
    assert_eq!(updated, Some(card::max_balance()));
}
