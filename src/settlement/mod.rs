//! On-chain settlement: merging matched pairs back into collateral.

pub mod onchain;

pub use onchain::{SafeMerger, CTF_ADDRESS, MIN_MERGE_AMOUNT, USDC_ADDRESS};
