use chrono::Utc;
use sqlx::PgPool;

use crate::models::card::Card;

/// Daily sweep flipping ACTIVE cards past their validity date to EXPIRED.
///
/// Purely a status flip: availability checks already treat past-validity
/// cards as unusable, so a late sweep never opens a window. BLOCKED cards
/// are never touched.
pub async fn run(pool: &PgPool) {
    match Card::expire_past_validity(pool, Utc::now().date_naive()).await {
        Ok(0) => tracing::debug!("Expiration sweep: nothing to expire"),
        Ok(count) => tracing::info!(expired = count, "Expiration sweep completed"),
        Err(e) => tracing::error!(error = %e, "Expiration sweep failed"),
    }
}
