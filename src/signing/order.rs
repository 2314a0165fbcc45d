//! EIP-712 order signatures for the CTF exchange.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{address, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::WalletIdentity;
use crate::error::TradingError;
use crate::execution::order::{Side, TimeInForce};

/// Polygon mainnet.
pub const POLYGON_CHAIN_ID: u64 = 137;

/// CTF exchange contract.
pub const CTF_EXCHANGE: Address = address!("4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");

/// Neg-risk CTF exchange contract.
pub const NEG_RISK_CTF_EXCHANGE: Address = address!("C5d563A36AE78145C45a50134d48A1215220f80a");

/// Collateral and outcome tokens both use 6 decimals.
const UNIT_SCALE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

sol! {
    /// Order struct signed by the maker.
    #[derive(Debug)]
    struct Order {
        uint256 salt;
        address maker;
        address signer;
        address taker;
        uint256 tokenId;
        uint256 makerAmount;
        uint256 takerAmount;
        uint256 expiration;
        uint256 nonce;
        uint256 feeRateBps;
        uint8 side;
        uint8 signatureType;
    }
}

static SALT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_salt() -> u64 {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    (millis << 16) | (SALT_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xffff)
}

/// Convert a decimal amount to 6-decimal base units.
pub fn to_base_units(amount: Decimal) -> Result<U256, TradingError> {
    (amount * UNIT_SCALE)
        .trunc()
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| TradingError::InvalidParams(format!("amount out of range: {}", amount)))
}

fn parse_token_id(token_id: &str) -> Result<U256, TradingError> {
    U256::from_str_radix(token_id, 10)
        .map_err(|e| TradingError::InvalidParams(format!("invalid token id {}: {}", token_id, e)))
}

/// Order as posted to `/order`: addresses lowercase, amounts as decimal strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeOrder {
    /// Random salt.
    pub salt: u64,
    /// Funds holder.
    pub maker: String,
    /// Key owner.
    pub signer: String,
    /// Zero address (public order).
    pub taker: String,
    /// Outcome token.
    pub token_id: String,
    /// Amount given, base units.
    pub maker_amount: String,
    /// Amount received, base units.
    pub taker_amount: String,
    /// Unix expiry, 0 for none.
    pub expiration: String,
    /// Exchange nonce.
    pub nonce: String,
    /// Fee rate in basis points.
    pub fee_rate_bps: String,
    /// 0 buy, 1 sell.
    pub side: u8,
    /// Wallet kind.
    pub signature_type: u8,
    /// 0x-prefixed 65-byte signature.
    pub signature: String,
}

/// `POST /order` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    /// The signed order.
    pub order: ExchangeOrder,
    /// API key owning the order.
    pub owner: String,
    /// Time in force.
    pub order_type: String,
}

/// Builds and signs exchange orders for one wallet.
#[derive(Debug, Clone)]
pub struct OrderSigner {
    signer: PrivateKeySigner,
    identity: WalletIdentity,
    domain: Eip712Domain,
}

impl OrderSigner {
    /// Signer for the standard or the neg-risk exchange.
    pub fn new(signer: PrivateKeySigner, identity: WalletIdentity, neg_risk: bool) -> Self {
        let (name, contract) = if neg_risk {
            ("Polymarket Neg Risk CTF Exchange", NEG_RISK_CTF_EXCHANGE)
        } else {
            ("Polymarket CTF Exchange", CTF_EXCHANGE)
        };
        let domain = Eip712Domain::new(
            Some(Cow::Borrowed(name)),
            Some(Cow::Borrowed("1")),
            Some(U256::from(POLYGON_CHAIN_ID)),
            Some(contract),
            None,
        );
        Self {
            signer,
            identity,
            domain,
        }
    }

    /// Wallet this signer acts for.
    pub fn identity(&self) -> &WalletIdentity {
        &self.identity
    }

    /// Sign a collateral-denominated market buy of `token_id` at no worse than `price`.
    pub fn market_buy(
        &self,
        token_id: &str,
        usdc: Decimal,
        price: Decimal,
        tif: TimeInForce,
        owner: &str,
    ) -> Result<SignedOrder, TradingError> {
        if price <= Decimal::ZERO {
            return Err(TradingError::InvalidParams(format!("price must be positive: {}", price)));
        }
        let usdc = usdc.round_dp_with_strategy(2, RoundingStrategy::ToZero);
        let tokens = (usdc / price).round_dp_with_strategy(4, RoundingStrategy::ToZero);

        let salt = next_salt();
        let order = Order {
            salt: U256::from(salt),
            maker: self.identity.funder,
            signer: self.identity.signer,
            taker: Address::ZERO,
            tokenId: parse_token_id(token_id)?,
            makerAmount: to_base_units(usdc)?,
            takerAmount: to_base_units(tokens)?,
            expiration: U256::ZERO,
            nonce: U256::ZERO,
            feeRateBps: U256::ZERO,
            side: Side::Buy.as_u8(),
            signatureType: self.identity.kind.as_u8(),
        };

        let signature = self.sign(&order)?;
        Ok(SignedOrder {
            order: ExchangeOrder {
                salt,
                maker: format!("{:#x}", order.maker),
                signer: format!("{:#x}", order.signer),
                taker: format!("{:#x}", order.taker),
                token_id: token_id.to_string(),
                maker_amount: order.makerAmount.to_string(),
                taker_amount: order.takerAmount.to_string(),
                expiration: "0".to_string(),
                nonce: "0".to_string(),
                fee_rate_bps: "0".to_string(),
                side: order.side,
                signature_type: order.signatureType,
                signature,
            },
            owner: owner.to_string(),
            order_type: tif.to_string(),
        })
    }

    fn sign(&self, order: &Order) -> Result<String, TradingError> {
        let hash = order.eip712_signing_hash(&self.domain);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| TradingError::SigningError(format!("order signing failed: {}", e)))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{create_signer, WalletKind};
    use rust_decimal_macros::dec;

    const KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn order_signer() -> OrderSigner {
        let signer = create_signer(KEY).unwrap();
        let identity = WalletIdentity {
            signer: signer.address(),
            funder: signer.address(),
            kind: WalletKind::Eoa,
        };
        OrderSigner::new(signer, identity, false)
    }

    #[test]
    fn base_units_truncate() {
        assert_eq!(to_base_units(dec!(5)).unwrap(), U256::from(5_000_000u64));
        assert_eq!(to_base_units(dec!(0.1234567)).unwrap(), U256::from(123_456u64));
        assert!(to_base_units(dec!(-1)).is_err());
    }

    #[test]
    fn market_buy_amounts() {
        let signed = order_signer()
            .market_buy("12345", dec!(5), dec!(0.5), TimeInForce::FOK, "api-key")
            .unwrap();
        assert_eq!(signed.order.maker_amount, "5000000");
        assert_eq!(signed.order.taker_amount, "10000000");
        assert_eq!(signed.order.side, 0);
        assert_eq!(signed.order_type, "FOK");
        assert_eq!(signed.owner, "api-key");
        // 0x + 65 bytes
        assert_eq!(signed.order.signature.len(), 132);
        assert_eq!(signed.order.maker, signed.order.maker.to_lowercase());
    }

    #[test]
    fn market_buy_rejects_bad_inputs() {
        let signer = order_signer();
        assert!(signer.market_buy("12345", dec!(5), dec!(0), TimeInForce::FOK, "k").is_err());
        assert!(signer.market_buy("not-a-number", dec!(5), dec!(0.5), TimeInForce::FOK, "k").is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let signed = order_signer()
            .market_buy("1", dec!(1), dec!(0.25), TimeInForce::FOK, "k")
            .unwrap();
        let json = serde_json::to_value(&signed).unwrap();
        assert_eq!(json["orderType"], "FOK");
        assert_eq!(json["order"]["takerAmount"], "4000000");
        assert_eq!(json["order"]["signatureType"], 0);
    }
}
