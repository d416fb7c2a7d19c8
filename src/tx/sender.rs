//! Transaction dispatcher: one signed submission and its confirmation

use super::tip::TipRequest;
use crate::chain::{ChainClient, Confirmation, FeeQuote, PreparedCall};
use crate::error::{TipperError, TipperResult};
use crate::wallet::WalletCredential;

use ethers::types::{Address, U256};
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

/// Submits a tip and waits for it to be mined.
///
/// Both suspension points are bounded. A send that does not return within
/// `submit_timeout` yields `Timeout`; a hash that is not mined within
/// `confirmation_timeout` yields `ConfirmationTimeout`.
pub struct TransactionDispatcher {
    contract: Address,
    submit_timeout: Duration,
    confirmation_timeout: Duration,
}

impl TransactionDispatcher {
    pub fn new(contract: Address, submit_timeout: Duration, confirmation_timeout: Duration) -> Self {
        Self {
            contract,
            submit_timeout,
            confirmation_timeout,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Sign and submit, then wait for confirmation
    pub async fn dispatch(
        &self,
        client: &dyn ChainClient,
        wallet: &WalletCredential,
        tip: &TipRequest,
        gas_limit: U256,
        fee: FeeQuote,
    ) -> TipperResult<Confirmation> {
        let tx_hash = self.submit(client, wallet, tip, gas_limit, fee).await?;
        self.await_confirmation(client, tx_hash).await
    }

    /// Sign and broadcast
    pub async fn submit(
        &self,
        client: &dyn ChainClient,
        wallet: &WalletCredential,
        tip: &TipRequest,
        gas_limit: U256,
        fee: FeeQuote,
    ) -> TipperResult<ethers::types::H256> {
        let prepared = PreparedCall {
            call: tip.to_call(self.contract),
            gas_limit,
            fee,
        };

        let tx_hash = timeout(self.submit_timeout, client.send_transaction(wallet, &prepared))
            .await
            .map_err(|_| TipperError::Timeout {
                operation: "send transaction".to_string(),
            })??;

        crate::metrics::record_tx_submitted();
        info!(
            "Transaction sent from wallet {:?}: hash {:?}, recipient {}, amount {}",
            wallet.address(),
            tx_hash,
            tip.recipient.id,
            ethers::utils::format_ether(tip.amount)
        );

        Ok(tx_hash)
    }

    /// Wait for a submitted hash to be mined
    pub async fn await_confirmation(
        &self,
        client: &dyn ChainClient,
        tx_hash: ethers::types::H256,
    ) -> TipperResult<Confirmation> {
        timeout(self.confirmation_timeout, client.wait_for_confirmation(tx_hash))
            .await
            .map_err(|_| TipperError::ConfirmationTimeout {
                tx_hash: format!("{:?}", tx_hash),
                secs: self.confirmation_timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::recipients::Recipient;
    use crate::tx::tip::{Token, TokenType};
    use crate::wallet::tests::{test_wallet, KEY_0};
    use ethers::types::H256;
    use tokio_test::{assert_err, assert_ok};

    fn tip() -> TipRequest {
        TipRequest::new(
            Token {
                token_type: TokenType::Native,
                token_address: Address::zero(),
            },
            Recipient::new("x", "bob"),
            U256::from(42u64),
        )
    }

    fn fee() -> FeeQuote {
        FeeQuote {
            max_fee_per_gas: U256::from(7u64),
            max_priority_fee_per_gas: U256::from(1u64),
        }
    }

    fn dispatcher(confirmation_timeout: Duration) -> TransactionDispatcher {
        TransactionDispatcher::new(
            Address::repeat_byte(0xd1),
            Duration::from_secs(5),
            confirmation_timeout,
        )
    }

    #[tokio::test]
    async fn test_dispatch_submits_prepared_call() {
        let wallet = test_wallet(KEY_0);
        let expected_from = wallet.address();
        let hash = H256::repeat_byte(0xab);

        let mut client = MockChainClient::new();
        client
            .expect_send_transaction()
            .withf(move |w, prepared| {
                w.address() == expected_from
                    && prepared.call.to == Address::repeat_byte(0xd1)
                    && prepared.call.value == U256::from(42u64)
                    && prepared.gas_limit == U256::from(120_000u64)
                    && prepared.fee == fee()
            })
            .times(1)
            .returning(move |_, _| Ok(hash));
        client
            .expect_wait_for_confirmation()
            .times(1)
            .returning(|h| {
                Ok(Confirmation {
                    tx_hash: h,
                    block_number: 77,
                })
            });

        let confirmation = assert_ok!(
            dispatcher(Duration::from_secs(5))
                .dispatch(&client, &wallet, &tip(), U256::from(120_000u64), fee())
                .await
        );
        assert_eq!(confirmation.tx_hash, hash);
        assert_eq!(confirmation.block_number, 77);
    }

    #[tokio::test]
    async fn test_send_error_skips_confirmation() {
        let wallet = test_wallet(KEY_0);
        let mut client = MockChainClient::new();
        client
            .expect_send_transaction()
            .returning(|_, _| Err(TipperError::InsufficientFunds("insufficient funds".into())));
        client.expect_wait_for_confirmation().never();

        let err = assert_err!(
            dispatcher(Duration::from_secs(5))
                .dispatch(&client, &wallet, &tip(), U256::from(1u64), fee())
                .await
        );
        assert!(err.is_fatal_to_wallet());
    }

    struct HangingChain;

    #[async_trait::async_trait]
    impl ChainClient for HangingChain {
        fn chain_id(&self) -> u64 {
            1
        }
        async fn get_balance(&self, _: Address) -> TipperResult<U256> {
            Ok(U256::zero())
        }
        async fn estimate_gas(
            &self,
            _: Address,
            _: &crate::chain::ContractCall,
        ) -> TipperResult<U256> {
            Ok(U256::zero())
        }
        async fn fee_quote(&self) -> TipperResult<FeeQuote> {
            Ok(fee())
        }
        async fn send_transaction(
            &self,
            _: &WalletCredential,
            _: &PreparedCall,
        ) -> TipperResult<H256> {
            Ok(H256::repeat_byte(1))
        }
        async fn wait_for_confirmation(&self, _: H256) -> TipperResult<Confirmation> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_confirmation_wait_is_bounded() {
        let wallet = test_wallet(KEY_0);
        let err = assert_err!(
            dispatcher(Duration::from_millis(20))
                .dispatch(&HangingChain, &wallet, &tip(), U256::from(1u64), fee())
                .await
        );
        assert!(matches!(err, TipperError::ConfirmationTimeout { .. }));
        assert!(err.is_fatal_to_wallet());
    }
}
