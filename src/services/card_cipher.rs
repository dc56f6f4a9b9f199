use ring::rand::{SecureRandom, SystemRandom};

use crate::services::encryption::{self, CryptoError, KEY_LEN};

/// Generates a fresh symmetric key for a single card. Keys are never reused
/// across cards, so one leaked key exposes exactly one number.
pub fn generate_card_key() -> Result<[u8; KEY_LEN], CryptoError> {
    let rng = SystemRandom::new();
    let mut key = [0u8; KEY_LEN];
    rng.fill(&mut key)?;

    Ok(key)
}

pub fn encrypt_number(number: &str, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    encryption::seal(number.as_bytes(), key)
}

pub fn decrypt_number(ciphertext: &[u8], key: &[u8]) -> Result<String, CryptoError> {
    let plaintext = encryption::open(ciphertext, key)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_card_key().unwrap();
        let number = "4276550012349876";

        let ciphertext = encrypt_number(number, &key).unwrap();
        let decrypted = decrypt_number(&ciphertext, &key).unwrap();

        assert_eq!(number, decrypted);
    }

    #[test]
    fn generated_keys_are_distinct() {
        let a = generate_card_key().unwrap();
        let b = generate_card_key().unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn one_cards_key_does_not_open_anothers_number() {
        let key_a = generate_card_key().unwrap();
        let key_b = generate_card_key().unwrap();

        let ciphertext = encrypt_number("1111222233334444", &key_a).unwrap();

        assert!(decrypt_number(&ciphertext, &key_b).is_err());
    }
}
