use ring::hmac;
use sqlx::{PgExecutor, PgPool};

use crate::models::number_index as index_rows;
pub use crate::models::number_index::ReserveOutcome;

/// Keyed digest index over plaintext card numbers.
///
/// The digest is deterministic so equality of numbers is equality of digests,
/// and the index key is disjoint from the encryption master key: neither key
/// helps defeat the other. Plaintext numbers are never stored or compared.
pub struct NumberIndex {
    key: hmac::Key,
}

impl NumberIndex {
    pub fn new(key_material: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, key_material),
        }
    }

    /// HMAC-SHA256 of the plaintext number, hex-encoded (64 chars).
    pub fn digest(&self, number: &str) -> String {
        let tag = hmac::sign(&self.key, number.as_bytes());
        hex::encode(tag.as_ref())
    }

    pub async fn reserve<'e>(
        &self,
        executor: impl PgExecutor<'e>,
        digest: &str,
    ) -> Result<ReserveOutcome, sqlx::Error> {
        index_rows::try_reserve(executor, digest).await
    }

    pub async fn release<'e>(
        &self,
        executor: impl PgExecutor<'e>,
        digest: &str,
    ) -> Result<(), sqlx::Error> {
        index_rows::release(executor, digest).await
    }

    pub async fn exists(&self, pool: &PgPool, digest: &str) -> Result<bool, sqlx::Error> {
        index_rows::exists(pool, digest).await
    }
}
