//! Gas limit and fee estimation for tip calls

use crate::chain::{ChainClient, ContractCall, FeeQuote};
use crate::error::TipperResult;

use ethers::types::{Address, U256};
use tracing::debug;

/// Gas estimator for transactions
pub struct FeeEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

/// Resolved gas parameters for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub raw_gas: U256,
    pub gas_limit: U256,
    pub fee: FeeQuote,
}

impl FeeEstimator {
    /// Create a new estimator with the given gas limit buffer
    pub fn new(gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
        }
    }

    /// Estimate gas and read one fee quote for a call.
    ///
    /// The two reads run back to back, never concurrently.
    pub async fn estimate(
        &self,
        client: &dyn ChainClient,
        from: Address,
        call: &ContractCall,
    ) -> TipperResult<FeeEstimate> {
        let raw_gas = client.estimate_gas(from, call).await?;
        let gas_limit = self.buffered_gas_limit(raw_gas);
        let fee = client.fee_quote().await?;

        debug!(
            "Gas estimate {} -> limit {} (max fee {}, priority {})",
            raw_gas, gas_limit, fee.max_fee_per_gas, fee.max_priority_fee_per_gas
        );

        Ok(FeeEstimate {
            raw_gas,
            gas_limit,
            fee,
        })
    }

    /// `ceil(estimate * (100 + buffer) / 100)`, exact in integer arithmetic
    pub fn buffered_gas_limit(&self, estimate: U256) -> U256 {
        let scaled = estimate.saturating_mul(U256::from(100 + self.gas_limit_buffer_percent));
        let (quotient, remainder) = scaled.div_mod(U256::from(100));
        if remainder.is_zero() {
            quotient
        } else {
            quotient + 1
        }
    }

    /// Worst-case cost of an attempt in wei, value excluded
    pub fn max_cost(estimate: &FeeEstimate) -> U256 {
        estimate.gas_limit.saturating_mul(estimate.fee.max_fee_per_gas)
    }
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(20)
    }
}
