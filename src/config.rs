use base64::Engine;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    /// Master key wrapping per-card encryption keys. Base64, 32 bytes decoded.
    pub master_key: Secret<String>,

    /// Key for the card-number HMAC index. Base64, disjoint from the master key.
    pub index_hmac_key: Secret<String>,

    /// Validity period applied when a card is issued without an explicit one.
    pub default_validity_months: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            master_key: Secret::new(config.get("master_key")?),
            index_hmac_key: Secret::new(config.get("index_hmac_key")?),

            default_validity_months: config.get("default_validity_months").unwrap_or(24),
        })
    }

    /// Decodes the master key material. Fails at startup, never mid-request.
    pub fn master_key_bytes(&self) -> Result<Vec<u8>, config::ConfigError> {
        decode_key(self.master_key.expose_secret(), "master_key")
    }

    pub fn index_hmac_key_bytes(&self) -> Result<Vec<u8>, config::ConfigError> {
        decode_key(self.index_hmac_key.expose_secret(), "index_hmac_key")
    }
}

fn decode_key(encoded: &str, name: &str) -> Result<Vec<u8>, config::ConfigError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| config::ConfigError::Message(format!("{} is not valid base64", name)))
}
