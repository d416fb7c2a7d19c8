//! Chain module - the JSON-RPC side of the dispatcher
//!
//! This module provides:
//! - The `ChainClient` seam the dispatch engine talks to
//! - An ethers-backed implementation with multi-RPC failover

pub mod provider;

pub use provider::ChainProvider;

use crate::error::TipperResult;
use crate::wallet::WalletCredential;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

/// Fee-market parameters for one EIP-1559 transaction.
///
/// Both fields come from a single read so they always describe the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// A payable contract call, before gas and fees are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// A call ready for signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub call: ContractCall,
    pub gas_limit: U256,
    pub fee: FeeQuote,
}

/// Receipt summary of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: H256,
    pub block_number: u64,
}

/// Network operations used by the dispatch engine.
///
/// Every method is one suspension point; callers never run two of them concurrently
/// for the same wallet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain ID used for signing
    fn chain_id(&self) -> u64;

    /// Native balance of an address
    async fn get_balance(&self, address: Address) -> TipperResult<U256>;

    /// Raw gas estimate for a call sent from `from`
    async fn estimate_gas(&self, from: Address, call: &ContractCall) -> TipperResult<U256>;

    /// Current fee quote
    async fn fee_quote(&self) -> TipperResult<FeeQuote>;

    /// Sign and broadcast a prepared call, returning its hash
    async fn send_transaction(
        &self,
        wallet: &WalletCredential,
        prepared: &PreparedCall,
    ) -> TipperResult<H256>;

    /// Block until the transaction is mined with enough confirmations
    async fn wait_for_confirmation(&self, tx_hash: H256) -> TipperResult<Confirmation>;
}
