//! Dispatch engine: balance gate, per-wallet attempt loop and the wallet driver
//!
//! Wallets run one after another in file order unless `wallet_concurrency` asks for a
//! bounded pool. Within a wallet every network call is awaited before the next starts.

mod balance;
mod engine;
mod report;
mod runner;

pub use balance::{GateDecision, WalletBalanceGate};
pub use engine::DispatchEngine;
pub use report::{RunSummary, WalletOutcome, WalletReport};

use crate::chain::ChainClient;
use crate::config::Settings;
use crate::recipients::RecipientCycler;
use crate::tx::{FeeEstimator, RetryPolicy, Token, TransactionDispatcher};

use ethers::types::U256;
use std::sync::Arc;

/// Fully resolved run parameters
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub tx_count: u32,
    pub amount_per_tx: U256,
    pub token: Token,
    pub explorer_url: String,
    pub wallet_concurrency: usize,
}

impl DispatchPlan {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            tx_count: settings.dispatch.tx_count,
            amount_per_tx: settings.amount_per_tx_wei()?,
            token: Token {
                token_type: settings.dispatch.token_type,
                token_address: settings.token_address()?,
            },
            explorer_url: settings.network.explorer_url.clone(),
            wallet_concurrency: settings.dispatch.wallet_concurrency.max(1),
        })
    }

    /// `<explorer>/tx/<hash>`
    pub fn explorer_link(&self, tx_hash: ethers::types::H256) -> String {
        format!("{}/tx/{:?}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// Read-only state shared by every wallet runner
pub struct DispatchContext {
    pub client: Arc<dyn ChainClient>,
    pub plan: DispatchPlan,
    pub recipients: RecipientCycler,
    pub gate: WalletBalanceGate,
    pub estimator: FeeEstimator,
    pub dispatcher: TransactionDispatcher,
    pub retry: RetryPolicy,
}

impl DispatchContext {
    pub fn from_settings(
        settings: &Settings,
        client: Arc<dyn ChainClient>,
        recipients: RecipientCycler,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            plan: DispatchPlan::from_settings(settings)?,
            recipients,
            gate: WalletBalanceGate,
            estimator: FeeEstimator::new(settings.dispatch.gas_limit_buffer_percent),
            dispatcher: TransactionDispatcher::new(
                settings.contract_address()?,
                settings.submit_timeout(),
                settings.confirmation_timeout(),
            ),
            retry: RetryPolicy::new(
                settings.dispatch.max_retries,
                settings.retry_delay(),
                settings.retry_backoff_max(),
            ),
        })
    }
}
