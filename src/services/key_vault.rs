use crate::services::encryption::{self, CryptoError, KEY_LEN};

/// Wraps per-card keys under the process-wide master key.
///
/// The master key never touches the database: rotating it means re-wrapping
/// the small per-card keys, not re-encrypting any card number.
pub struct KeyVault {
    master_key: Vec<u8>,
}

impl KeyVault {
    pub fn new(master_key: Vec<u8>) -> Result<Self, CryptoError> {
        if master_key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }

        Ok(Self { master_key })
    }

    pub fn wrap_key(&self, raw_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encryption::seal(raw_key, &self.master_key)
    }

    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encryption::open(wrapped, &self.master_key)
    }
}
