//! Wallet balance precheck

use crate::chain::ChainClient;

use ethers::types::{Address, U256};
use tracing::error;

/// Outcome of the precheck
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed { balance: U256 },
    Skip { balance: Option<U256>, reason: String },
}

/// Checks that a wallet can cover `amount_per_tx * tx_count` before anything is sent.
///
/// Advisory only: nothing is reserved, so a later submission can still run out of funds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalletBalanceGate;

impl WalletBalanceGate {
    /// Total value the wallet will transfer, `None` on overflow
    pub fn required_total(amount_per_tx: U256, tx_count: u32) -> Option<U256> {
        amount_per_tx.checked_mul(U256::from(tx_count))
    }

    /// Compare an observed balance with the requirement
    pub fn evaluate(balance: U256, required: Option<U256>) -> GateDecision {
        match required {
            Some(required) if balance >= required => GateDecision::Proceed { balance },
            Some(required) => GateDecision::Skip {
                balance: Some(balance),
                reason: format!(
                    "Insufficient funds: balance {} < required {}",
                    ethers::utils::format_ether(balance),
                    ethers::utils::format_ether(required)
                ),
            },
            None => GateDecision::Skip {
                balance: Some(balance),
                reason: "Required total overflows".to_string(),
            },
        }
    }

    /// Query the balance and evaluate it. A failed query skips the wallet, no retry.
    pub async fn check(
        &self,
        client: &dyn ChainClient,
        address: Address,
        required: Option<U256>,
    ) -> GateDecision {
        match client.get_balance(address).await {
            Ok(balance) => Self::evaluate(balance, required),
            Err(e) => {
                error!("Balance query for {:?} failed: {}", address, e);
                GateDecision::Skip {
                    balance: None,
                    reason: format!("Balance check failed: {}", e),
                }
            }
        }
    }
}
