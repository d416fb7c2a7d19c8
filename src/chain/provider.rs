//! Chain provider with multi-RPC support and automatic failover

use super::{ChainClient, Confirmation, ContractCall, FeeQuote, PreparedCall};
use crate::config::NetworkConfig;
use crate::error::{TipperError, TipperResult};
use crate::wallet::WalletCredential;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const GWEI: u64 = 1_000_000_000;

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain ID, configured or queried at startup
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Tip fee for every quote, in wei
    priority_fee: U256,
    /// Upper bound on max fee per gas, in wei
    max_fee_cap: Option<U256>,
    /// Number of blocks a receipt must be buried under
    confirmations: u64,
    /// Receipt polling interval
    poll_interval: Duration,
}

impl ChainProvider {
    /// Create a new chain provider
    pub async fn new(
        config: &NetworkConfig,
        confirmations: u64,
        poll_interval: Duration,
    ) -> TipperResult<Self> {
        let mut http_providers = Vec::new();

        // Initialize HTTP providers
        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(poll_interval);
                    http_providers.push(provider);
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(TipperError::ChainConnection {
                chain_id: config.chain_id.unwrap_or_default(),
                message: "No valid RPC providers".to_string(),
            });
        }

        let mut provider = Self {
            chain_id: config.chain_id.unwrap_or_default(),
            http_providers,
            current_provider: AtomicUsize::new(0),
            priority_fee: U256::from(config.priority_fee_gwei) * U256::from(GWEI),
            max_fee_cap: config
                .max_fee_per_gas_gwei
                .map(|gwei| U256::from(gwei) * U256::from(GWEI)),
            confirmations,
            poll_interval,
        };

        if config.chain_id.is_none() {
            provider.chain_id = provider.fetch_chain_id().await?;
        }
        info!("Connected to chain {}", provider.chain_id);

        Ok(provider)
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    async fn fetch_chain_id(&self) -> TipperResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_chainid().await {
                Ok(id) => return Ok(id.as_u64()),
                Err(e) => {
                    warn!("Failed to get chain id: {}", e);
                    self.failover();
                }
            }
        }

        Err(TipperError::ChainConnection {
            chain_id: 0,
            message: "All providers failed to report a chain id".to_string(),
        })
    }

    /// Get current block number
    pub async fn get_block_number(&self) -> TipperResult<u64> {
        self.http()
            .get_block_number()
            .await
            .map(|b| b.as_u64())
            .map_err(|e| self.rpc_error(e, TipperError::Transaction))
    }

    /// Translate a provider error, failing over on transport problems
    fn rpc_error(&self, err: ProviderError, fallback: fn(String) -> TipperError) -> TipperError {
        // A JSON-RPC error object means the node answered; map its message
        if let Some(response) = RpcError::as_error_response(&err) {
            return TipperError::from_rpc_message(&response.message, fallback);
        }

        match &err {
            ProviderError::HTTPError(_) | ProviderError::JsonRpcClientError(_) => {
                self.failover();
                TipperError::ChainConnection {
                    chain_id: self.chain_id,
                    message: err.to_string(),
                }
            }
            other => TipperError::from_rpc_message(&other.to_string(), fallback),
        }
    }

    /// Derive a quote from the latest block's base fee
    fn quote_from_base_fee(&self, base_fee: U256) -> FeeQuote {
        // Max fee = 2 * base_fee + priority_fee (buffer for block variability)
        let mut max_fee = base_fee * 2 + self.priority_fee;
        if let Some(cap) = self.max_fee_cap {
            max_fee = std::cmp::min(max_fee, cap);
        }

        FeeQuote {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: std::cmp::min(self.priority_fee, max_fee),
        }
    }

    /// Build the signed-ready EIP-1559 transaction
    fn build_tx(
        &self,
        from: Address,
        nonce: U256,
        prepared: &PreparedCall,
    ) -> TypedTransaction {
        let tx = Eip1559TransactionRequest::new()
            .from(from)
            .to(prepared.call.to)
            .value(prepared.call.value)
            .data(prepared.call.data.clone())
            .nonce(nonce)
            .gas(prepared.gas_limit)
            .max_fee_per_gas(prepared.fee.max_fee_per_gas)
            .max_priority_fee_per_gas(prepared.fee.max_priority_fee_per_gas)
            .chain_id(self.chain_id);

        TypedTransaction::Eip1559(tx)
    }
}

#[async_trait]
impl ChainClient for ChainProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: Address) -> TipperResult<U256> {
        self.http()
            .get_balance(address, None)
            .await
            .map_err(|e| self.rpc_error(e, TipperError::BalanceCheck))
    }

    async fn estimate_gas(&self, from: Address, call: &ContractCall) -> TipperResult<U256> {
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(from)
            .to(call.to)
            .value(call.value)
            .data(call.data.clone())
            .into();

        self.http()
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| self.rpc_error(e, TipperError::GasEstimation))
    }

    async fn fee_quote(&self) -> TipperResult<FeeQuote> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| self.rpc_error(e, TipperError::FeeData))?
            .ok_or_else(|| TipperError::FeeData("No latest block".to_string()))?;

        match block.base_fee_per_gas {
            Some(base_fee) => Ok(self.quote_from_base_fee(base_fee)),
            None => {
                // Pre-London chain: a legacy gas price bounds both fields
                let price = self
                    .http()
                    .get_gas_price()
                    .await
                    .map_err(|e| self.rpc_error(e, TipperError::FeeData))?;
                Ok(FeeQuote {
                    max_fee_per_gas: price,
                    max_priority_fee_per_gas: price,
                })
            }
        }
    }

    async fn send_transaction(
        &self,
        wallet: &WalletCredential,
        prepared: &PreparedCall,
    ) -> TipperResult<H256> {
        let from = wallet.address();
        let nonce = self
            .http()
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.rpc_error(e, TipperError::Transaction))?;

        let tx = self.build_tx(from, nonce, prepared);

        let signer = wallet.signer().clone().with_chain_id(self.chain_id);
        let signature = signer
            .sign_transaction(&tx)
            .await
            .map_err(|e| TipperError::Wallet(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.rpc_error(e, TipperError::Transaction))?;

        debug!("Broadcast tx {:?} with nonce {}", pending.tx_hash(), nonce);
        Ok(pending.tx_hash())
    }

    async fn wait_for_confirmation(&self, tx_hash: H256) -> TipperResult<Confirmation> {
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;

            let receipt = match self.http().get_transaction_receipt(tx_hash).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    // Transient read failures while polling do not lose the transaction
                    warn!("Receipt poll for {:?} failed: {}", tx_hash, e);
                    self.failover();
                    continue;
                }
            };

            let Some(receipt) = receipt else {
                continue;
            };

            let Some(block_number) = receipt.block_number.map(|b| b.as_u64()) else {
                continue;
            };

            if receipt.status == Some(U64::zero()) {
                return Err(TipperError::Reverted(format!(
                    "{:?} reverted in block {}",
                    tx_hash, block_number
                )));
            }

            if self.confirmations > 1 {
                let head = match self.get_block_number().await {
                    Ok(head) => head,
                    Err(e) => {
                        warn!("Block number poll failed: {}", e);
                        continue;
                    }
                };
                if head.saturating_sub(block_number) + 1 < self.confirmations {
                    continue;
                }
            }

            return Ok(Confirmation {
                tx_hash,
                block_number,
            });
        }
    }
}
