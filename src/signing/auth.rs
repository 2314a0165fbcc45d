//! L2 authentication headers for the CLOB REST API.

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Config;
use crate::error::TradingError;

type HmacSha256 = Hmac<Sha256>;

/// API key triple issued by the CLOB.
#[derive(Clone)]
pub struct ApiCredentials {
    /// API key.
    pub key: String,
    /// Base64url-encoded HMAC secret.
    pub secret: String,
    /// Passphrase.
    pub passphrase: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ApiCredentials {
    /// Credentials from config, if all three parts are set.
    pub fn from_config(config: &Config) -> Option<Self> {
        match (
            &config.polymarket_api_key,
            &config.polymarket_api_secret,
            &config.polymarket_api_passphrase,
        ) {
            (Some(key), Some(secret), Some(passphrase))
                if !key.is_empty() && !secret.is_empty() && !passphrase.is_empty() =>
            {
                Some(Self {
                    key: key.clone(),
                    secret: secret.clone(),
                    passphrase: passphrase.clone(),
                })
            }
            _ => None,
        }
    }
}

/// HMAC-SHA256 over `timestamp + method + path + body`, base64url encoded.
pub fn l2_signature(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String, TradingError> {
    let secret_bytes = general_purpose::URL_SAFE
        .decode(secret)
        .map_err(|e| TradingError::SigningError(format!("bad API secret base64: {}", e)))?;

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| TradingError::SigningError(format!("HMAC init failed: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());

    Ok(general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// Headers authenticating one request. `path` excludes the query string.
pub fn l2_headers(
    creds: &ApiCredentials,
    address: &str,
    method: &str,
    path: &str,
    body: &str,
) -> Result<Vec<(&'static str, String)>, TradingError> {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = l2_signature(&creds.secret, &timestamp, method, path, body)?;

    Ok(vec![
        ("POLY_ADDRESS", address.to_string()),
        ("POLY_SIGNATURE", signature),
        ("POLY_TIMESTAMP", timestamp),
        ("POLY_API_KEY", creds.key.clone()),
        ("POLY_PASSPHRASE", creds.passphrase.clone()),
    ])
}
