// API module - HTTP endpoints

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::key_vault::KeyVault;
use crate::services::number_index::NumberIndex;

pub mod cards;
pub mod middleware;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub key_vault: Arc<KeyVault>,
    pub number_index: Arc<NumberIndex>,
}
