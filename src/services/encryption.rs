use ring::aead::{
    Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, AES_256_GCM,
};
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Errors from the AEAD layer. Messages carry no algorithm or key detail;
/// callers surface them as a generic internal error.
#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("Cryptographic operation failed")]
    OperationFailed,

    #[error("Invalid key length (expected {KEY_LEN} bytes)")]
    InvalidKeyLength,

    #[error("Invalid encrypted data format")]
    InvalidFormat,
}

impl From<Unspecified> for CryptoError {
    fn from(_: Unspecified) -> Self {
        CryptoError::OperationFailed
    }
}

struct SingleNonceSequence {
    nonce: [u8; NONCE_LEN],
}

impl SingleNonceSequence {
    fn new(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce }
    }
}

impl NonceSequence for SingleNonceSequence {
    fn advance(&mut self) -> Result<Nonce, Unspecified> {
        Nonce::try_assume_unique_for_key(&self.nonce)
    }
}

/// Seals `data` with AES-256-GCM under a fresh random nonce.
///
/// Format: [nonce (12 bytes)][ciphertext + auth tag]
pub fn seal(data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength);
    }

    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)?;
    let nonce_sequence = SingleNonceSequence::new(nonce_bytes);
    let mut sealing_key = SealingKey::new(unbound_key, nonce_sequence);

    let mut in_out = data.to_vec();
    sealing_key.seal_in_place_append_tag(Aad::empty(), &mut in_out)?;

    // Prepend nonce to ciphertext
    let mut result = Vec::with_capacity(NONCE_LEN + in_out.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&in_out);

    Ok(result)
}

/// Opens data sealed with `seal`. Expects format: [nonce (12 bytes)][ciphertext + auth tag]
pub fn open(encrypted: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength);
    }

    if encrypted.len() < NONCE_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&encrypted[..NONCE_LEN]);

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)?;
    let nonce_sequence = SingleNonceSequence::new(nonce_bytes);
    let mut opening_key = OpeningKey::new(unbound_key, nonce_sequence);

    let mut in_out = encrypted[NONCE_LEN..].to_vec();
    let decrypted = opening_key.open_in_place(Aad::empty(), &mut in_out)?;

    Ok(decrypted.to_vec())
}
