//! Merging UP/DOWN pairs back into USDC through a Gnosis Safe.
//!
//! The Safe holds the outcome tokens, so `ConditionalTokens.mergePositions`
//! is wrapped in a Safe `execTransaction` signed by its single owner.

use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, B256, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::SettlementError;
use crate::execution::{MergeTarget, Settlement};
use crate::signing;

/// USDC.e collateral on Polygon.
pub const USDC_ADDRESS: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

/// Conditional Tokens Framework on Polygon.
pub const CTF_ADDRESS: Address = address!("4D97DCd97eC945f40cF65F87097ACe5EA0476045");

/// Smallest amount worth a transaction.
pub const MIN_MERGE_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Outcome tokens and USDC.e both use 6 decimals.
const TOKEN_DECIMALS: u32 = 6;

sol! {
    #[sol(rpc)]
    contract ConditionalTokens {
        function balanceOf(address owner, uint256 id) external view returns (uint256);

        function mergePositions(
            address collateralToken,
            bytes32 parentCollectionId,
            bytes32 conditionId,
            uint256[] calldata partition,
            uint256 amount
        ) external;
    }

    #[sol(rpc)]
    contract GnosisSafe {
        function nonce() external view returns (uint256);

        function getTransactionHash(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            uint256 _nonce
        ) external view returns (bytes32);

        function execTransaction(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes memory signatures
        ) external payable returns (bool success);
    }
}

/// Parse a 0x condition ID.
pub fn parse_condition_id(value: &str) -> Result<B256, SettlementError> {
    value.parse::<B256>().map_err(|e| SettlementError::InvalidId {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a decimal ERC-1155 token ID.
pub fn parse_token_id(value: &str) -> Result<U256, SettlementError> {
    U256::from_str_radix(value, 10).map_err(|e| SettlementError::InvalidId {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Decimal tokens to base units, truncated.
pub fn to_units(amount: Decimal) -> Result<U256, SettlementError> {
    amount
        .round_dp_with_strategy(TOKEN_DECIMALS, RoundingStrategy::ToZero)
        .checked_mul(Decimal::from(10u64.pow(TOKEN_DECIMALS)))
        .and_then(|units| units.to_u128())
        .map(U256::from)
        .ok_or(SettlementError::AmountTooSmall(amount))
}

/// Base units to decimal tokens.
pub fn from_units(units: U256) -> Decimal {
    let raw = u128::try_from(units).unwrap_or(u128::MAX).min(i64::MAX as u128) as i64;
    Decimal::new(raw, TOKEN_DECIMALS)
}

/// Single-owner Safe signature: `r || s || v` with `v` in {27, 28}.
fn safe_signature(signer: &PrivateKeySigner, hash: B256) -> Result<Bytes, SettlementError> {
    let signature = signer
        .sign_hash_sync(&hash)
        .map_err(|e| SettlementError::Signing(e.to_string()))?;
    let mut bytes = signature.as_bytes();
    if bytes[64] < 27 {
        bytes[64] += 27;
    }
    Ok(Bytes::copy_from_slice(&bytes))
}

fn rpc<E: std::fmt::Display>(e: E) -> SettlementError {
    SettlementError::Rpc(e.to_string())
}

/// Merges through a Gnosis Safe owned by the merge key.
#[derive(Debug, Clone)]
pub struct SafeMerger {
    rpc_url: String,
    owner: Option<PrivateKeySigner>,
    safe: Option<Address>,
    receipt_timeout: Duration,
}

impl SafeMerger {
    /// Merger over `rpc_url`. Without an owner or Safe it reports not ready.
    pub fn new(
        rpc_url: impl Into<String>,
        owner: Option<PrivateKeySigner>,
        safe: Option<Address>,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            owner,
            safe,
            receipt_timeout,
        }
    }

    /// Merger configured from `MERGE_PRIVATE_KEY` / `POLYMARKET_FUNDER`.
    ///
    /// An unusable key or address is logged and leaves the merger not ready.
    pub fn from_config(config: &Config) -> Self {
        let owner = config.merge_key().and_then(|key| match signing::create_signer(key) {
            Ok(signer) => Some(signer),
            Err(e) => {
                warn!(error = %e, "merge key unusable, merges disabled");
                None
            }
        });
        let safe = config
            .polymarket_funder
            .as_deref()
            .and_then(|funder| match signing::parse_address(funder) {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!(error = %e, "funder address unusable, merges disabled");
                    None
                }
            });
        Self::new(config.polygon_rpc_url.clone(), owner, safe, config.merge_timeout())
    }

    fn safe(&self) -> Result<Address, SettlementError> {
        self.safe
            .ok_or_else(|| SettlementError::NotReady("no Safe address".to_string()))
    }

    fn owner(&self) -> Result<&PrivateKeySigner, SettlementError> {
        self.owner
            .as_ref()
            .ok_or_else(|| SettlementError::NotReady("no merge key".to_string()))
    }
}

#[async_trait]
impl Settlement for SafeMerger {
    fn is_ready(&self) -> bool {
        self.owner.is_some() && self.safe.is_some() && !self.rpc_url.is_empty()
    }

    #[instrument(skip(self, target), fields(market = %crate::utils::short_id(&target.condition_id)))]
    async fn on_chain_redeemable_pairs(&self, target: &MergeTarget) -> Result<Decimal, SettlementError> {
        let safe = self.safe()?;
        let up_id = parse_token_id(&target.up_token_id)?;
        let down_id = parse_token_id(&target.down_token_id)?;

        let provider = ProviderBuilder::new().connect(&self.rpc_url).await.map_err(rpc)?;
        let ctf = ConditionalTokens::new(CTF_ADDRESS, &provider);

        let up_call = ctf.balanceOf(safe, up_id);
        let down_call = ctf.balanceOf(safe, down_id);
        let (up, down) = tokio::join!(up_call.call(), down_call.call());
        let (up, down) = (from_units(up.map_err(rpc)?), from_units(down.map_err(rpc)?));

        debug!(up = %up, down = %down, "on-chain balances");
        Ok(up.min(down))
    }

    #[instrument(skip(self, target), fields(market = %crate::utils::short_id(&target.condition_id)))]
    async fn merge(&self, target: &MergeTarget, pairs: Decimal) -> Result<Decimal, SettlementError> {
        let owner = self.owner()?.clone();
        let safe = self.safe()?;
        if pairs < MIN_MERGE_AMOUNT {
            return Err(SettlementError::AmountTooSmall(pairs));
        }
        let condition_id = parse_condition_id(&target.condition_id)?;
        let amount = to_units(pairs)?;

        let provider = ProviderBuilder::new()
            .wallet(owner.clone())
            .connect(&self.rpc_url)
            .await
            .map_err(rpc)?;
        let safe_contract = GnosisSafe::new(safe, &provider);

        let data = Bytes::from(
            ConditionalTokens::mergePositionsCall {
                collateralToken: USDC_ADDRESS,
                parentCollectionId: B256::ZERO,
                conditionId: condition_id,
                partition: vec![U256::from(1), U256::from(2)],
                amount,
            }
            .abi_encode(),
        );

        let nonce = safe_contract.nonce().call().await.map_err(rpc)?;
        let safe_tx_hash = safe_contract
            .getTransactionHash(
                CTF_ADDRESS,
                U256::ZERO,
                data.clone(),
                0,
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                Address::ZERO,
                Address::ZERO,
                nonce,
            )
            .call()
            .await
            .map_err(rpc)?;
        let signatures = safe_signature(&owner, safe_tx_hash)?;

        let pending = safe_contract
            .execTransaction(
                CTF_ADDRESS,
                U256::ZERO,
                data,
                0,
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                Address::ZERO,
                Address::ZERO,
                signatures,
            )
            .send()
            .await
            .map_err(rpc)?;
        let tx_hash = format!("{:#x}", pending.tx_hash());
        info!(tx_hash = %tx_hash, pairs = %pairs, "merge submitted");

        let receipt = tokio::time::timeout(self.receipt_timeout, pending.get_receipt())
            .await
            .map_err(|_| SettlementError::Timeout {
                timeout_secs: self.receipt_timeout.as_secs(),
            })?
            .map_err(rpc)?;
        if !receipt.status() {
            return Err(SettlementError::Reverted { tx_hash });
        }

        let merged = from_units(amount);
        info!(
            tx_hash = %tx_hash,
            block = receipt.block_number.unwrap_or(0),
            merged = %merged,
            "merge confirmed"
        );
        Ok(merged)
    }
}
