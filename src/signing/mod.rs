//! Wallet signing for Polymarket.
//!
//! - [`auth`]: L2 (API key) request headers
//! - [`order`]: EIP-712 order signatures
//!
//! Signers are cached by a hash of the key so order placement and merges
//! never re-parse the key on the hot path.

pub mod auth;
pub mod order;

use std::collections::HashMap;
use std::sync::RwLock;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use once_cell::sync::Lazy;
use serde::Serialize;
use strum::{Display, EnumString};
use tracing::debug;

use crate::config::Config;
use crate::error::TradingError;

pub use auth::{l2_headers, ApiCredentials};
pub use order::{ExchangeOrder, OrderSigner, SignedOrder};

/// Global signer cache, keyed by a hash of the private key.
static SIGNER_CACHE: Lazy<RwLock<HashMap<u64, PrivateKeySigner>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn key_hash(private_key: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    private_key.hash(&mut hasher);
    hasher.finish()
}

/// How the trading wallet signs orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletKind {
    /// Plain externally owned account.
    #[default]
    Eoa,
    /// Email/Magic proxy wallet.
    Proxy,
    /// Gnosis Safe holding the funds, EOA as owner.
    GnosisSafe,
}

impl WalletKind {
    /// Map the configured signature type; unknown values fall back to EOA.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => WalletKind::Proxy,
            2 => WalletKind::GnosisSafe,
            _ => WalletKind::Eoa,
        }
    }

    /// Signature type sent with orders.
    pub fn as_u8(&self) -> u8 {
        match self {
            WalletKind::Eoa => 0,
            WalletKind::Proxy => 1,
            WalletKind::GnosisSafe => 2,
        }
    }
}

/// Create a signer from a hex private key, with or without `0x`.
pub fn create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = hex::decode(key)
        .map_err(|e| TradingError::SigningError(format!("invalid private key hex: {}", e)))?;

    if bytes.len() != 32 {
        return Err(TradingError::SigningError(format!(
            "private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);

    PrivateKeySigner::from_bytes(&key_bytes.into())
        .map_err(|e| TradingError::SigningError(format!("failed to create signer: {}", e)))
}

/// Cached signer for `private_key`.
pub fn get_or_create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let hash = key_hash(private_key);

    {
        let cache = SIGNER_CACHE.read().map_err(|e| {
            TradingError::SigningError(format!("signer cache poisoned: {}", e))
        })?;
        if let Some(signer) = cache.get(&hash) {
            return Ok(signer.clone());
        }
    }

    let signer = create_signer(private_key)?;

    let mut cache = SIGNER_CACHE.write().map_err(|e| {
        TradingError::SigningError(format!("signer cache poisoned: {}", e))
    })?;
    // Another thread may have raced us here.
    let signer = cache.entry(hash).or_insert(signer).clone();
    debug!(address = %signer.address(), "Signer cached");
    Ok(signer)
}

/// Drop every cached signer (key rotation, tests).
pub fn clear_signer_cache() {
    if let Ok(mut cache) = SIGNER_CACHE.write() {
        cache.clear();
    }
}

/// Address of the wallet behind `private_key`.
pub fn address_from_private_key(private_key: &str) -> Result<Address, TradingError> {
    Ok(get_or_create_signer(private_key)?.address())
}

/// Parse a `0x` address.
pub fn parse_address(value: &str) -> Result<Address, TradingError> {
    value
        .parse::<Address>()
        .map_err(|e| TradingError::SigningError(format!("invalid address {}: {}", value, e)))
}

/// Everything needed to act on behalf of the trading wallet.
#[derive(Debug, Clone)]
pub struct WalletIdentity {
    /// Signing key owner.
    pub signer: Address,
    /// Address holding funds and tokens (the Safe / proxy, or the EOA itself).
    pub funder: Address,
    /// Wallet kind.
    pub kind: WalletKind,
}

impl WalletIdentity {
    /// Resolve the identity configured in `config`.
    pub fn from_config(config: &Config) -> Result<Self, TradingError> {
        let signer = address_from_private_key(&config.polymarket_private_key)?;
        let kind = WalletKind::from_u8(config.polymarket_signature_type);
        let funder = match (&config.polymarket_funder, kind) {
            (Some(funder), WalletKind::Proxy | WalletKind::GnosisSafe) => parse_address(funder)?,
            _ => signer,
        };
        Ok(Self {
            signer,
            funder,
            kind,
        })
    }
}
