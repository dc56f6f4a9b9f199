// Core logic: the card-number vault and the balance-mutation engine, plus the
// guards and user management around them. HTTP handlers stay thin.

pub mod access_guard;
pub mod balance_ledger;
pub mod card_cipher;
pub mod card_vault;
pub mod encryption;
pub mod key_vault;
pub mod number_index;
pub mod users;
