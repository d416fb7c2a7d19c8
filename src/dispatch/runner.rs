//! Per-wallet attempt loop

use super::report::{AttemptRecord, SkippedTx, TxRecord, WalletOutcome, WalletReport};
use super::{DispatchContext, GateDecision, WalletBalanceGate};
use crate::chain::{Confirmation, FeeQuote};
use crate::error::{TipperError, TipperResult};
use crate::tx::{AttemptDecision, FeeEstimator, TipRequest};
use crate::wallet::WalletCredential;

use ethers::types::{H256, U256};
use ethers::utils::format_ether;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where an attempt is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Estimating,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

/// One try at sending the tip for `index`
#[derive(Debug)]
pub struct TransactionAttempt<'a> {
    pub index: u32,
    pub retry: u32,
    pub wallet: &'a WalletCredential,
    pub tip: TipRequest,
    pub gas_limit: Option<U256>,
    pub fee_quote: Option<FeeQuote>,
    pub tx_hash: Option<H256>,
    pub status: AttemptStatus,
}

impl<'a> TransactionAttempt<'a> {
    pub fn new(index: u32, retry: u32, wallet: &'a WalletCredential, tip: TipRequest) -> Self {
        Self {
            index,
            retry,
            wallet,
            tip,
            gas_limit: None,
            fee_quote: None,
            tx_hash: None,
            status: AttemptStatus::Pending,
        }
    }

    fn transition(&mut self, next: AttemptStatus) {
        debug!(
            "Attempt {} (retry {}): {:?} -> {:?}",
            self.index + 1,
            self.retry,
            self.status,
            next
        );
        self.status = next;
    }

    fn record(&self, error: Option<&TipperError>) -> AttemptRecord {
        AttemptRecord {
            index: self.index,
            retry: self.retry,
            recipient: self.tip.recipient.id.clone(),
            status: self.status,
            tx_hash: self.tx_hash,
            error: error.map(|e| e.to_string()),
        }
    }
}

/// Runs the balance gate and then `tx_count` logical transactions for one wallet
pub struct WalletRunner<'a> {
    ctx: &'a DispatchContext,
    position: usize,
    total_wallets: usize,
    wallet: &'a WalletCredential,
}

impl<'a> WalletRunner<'a> {
    pub fn new(
        ctx: &'a DispatchContext,
        position: usize,
        total_wallets: usize,
        wallet: &'a WalletCredential,
    ) -> Self {
        Self {
            ctx,
            position,
            total_wallets,
            wallet,
        }
    }

    pub async fn run(self) -> WalletReport {
        let address = self.wallet.address();
        let plan = &self.ctx.plan;
        let mut report = WalletReport::new(self.position, address);

        let required = WalletBalanceGate::required_total(plan.amount_per_tx, plan.tx_count);
        let decision = self
            .ctx
            .gate
            .check(self.ctx.client.as_ref(), address, required)
            .await;

        let balance = match &decision {
            GateDecision::Proceed { balance } => Some(*balance),
            GateDecision::Skip { balance, .. } => *balance,
        };
        info!(
            "Wallet {}/{}: address {:?}, balance {}, required {}",
            self.position + 1,
            self.total_wallets,
            address,
            balance.map(format_ether).unwrap_or_else(|| "unknown".to_string()),
            required.map(format_ether).unwrap_or_else(|| "overflow".to_string())
        );
        if let Some(balance) = balance {
            if let Ok(native) = format_ether(balance).parse::<f64>() {
                crate::metrics::record_wallet_balance(&format!("{:?}", address), native);
            }
        }

        if let GateDecision::Skip { reason, .. } = decision {
            warn!("{}. Skipping wallet.", reason);
            crate::metrics::record_wallet_skipped();
            report.outcome = WalletOutcome::Skipped { reason };
            return report;
        }

        info!("Starting transaction sending...");
        self.attempt_loop(&mut report).await;
        report
    }

    /// `index` advances on confirmation or skip, never on retry
    async fn attempt_loop(&self, report: &mut WalletReport) {
        let plan = &self.ctx.plan;
        let mut index: u32 = 0;
        let mut retries_used: u32 = 0;

        while index < plan.tx_count {
            let recipient = self.ctx.recipients.recipient_for(index).clone();
            let tip = TipRequest::new(plan.token, recipient, plan.amount_per_tx);
            let mut attempt = TransactionAttempt::new(index, retries_used, self.wallet, tip);

            info!(
                "Preparing transaction {}/{} for {}{}",
                index + 1,
                plan.tx_count,
                attempt.tip.recipient.id,
                if retries_used > 0 {
                    format!(" (retry {})", retries_used)
                } else {
                    String::new()
                }
            );

            let started = Instant::now();
            match self.execute(&mut attempt).await {
                Ok(confirmation) => {
                    crate::metrics::record_tx_confirmed(started.elapsed().as_secs_f64());
                    let link = plan.explorer_link(confirmation.tx_hash);
                    info!(
                        "Transaction confirmed in block {}: {}",
                        confirmation.block_number, link
                    );

                    report.attempts.push(attempt.record(None));
                    report.confirmed.push(TxRecord {
                        index,
                        recipient: attempt.tip.recipient.id.clone(),
                        tx_hash: confirmation.tx_hash,
                        block_number: confirmation.block_number,
                        explorer_link: link,
                    });
                    index += 1;
                    retries_used = 0;
                }
                Err(err) => {
                    let class = err.classify();
                    crate::metrics::record_tx_failed(class);
                    error!(
                        "Error sending transaction {}/{}: {}",
                        index + 1,
                        plan.tx_count,
                        err
                    );
                    report.attempts.push(attempt.record(Some(&err)));

                    match self.ctx.retry.decide(&err, retries_used) {
                        AttemptDecision::AbortWallet => {
                            warn!("{}. Skipping wallet.", err);
                            report.outcome = WalletOutcome::Aborted {
                                index,
                                reason: err.to_string(),
                            };
                            return;
                        }
                        AttemptDecision::RetryAfter(delay) => {
                            retries_used += 1;
                            report.retries += 1;
                            crate::metrics::record_retry();
                            warn!(
                                "Transient failure, retrying transaction {} in {:?} ({}/{})",
                                index + 1,
                                delay,
                                retries_used,
                                self.ctx.retry.max_retries()
                            );
                            tokio::time::sleep(delay).await;
                        }
                        AttemptDecision::Skip => {
                            if err.is_retryable() {
                                warn!(
                                    "Retry budget exhausted for transaction {}, moving on",
                                    index + 1
                                );
                            }
                            report.skipped.push(SkippedTx {
                                index,
                                recipient: attempt.tip.recipient.id.clone(),
                                reason: err.to_string(),
                            });
                            index += 1;
                            retries_used = 0;
                        }
                    }
                }
            }
        }

        report.outcome = WalletOutcome::Completed;
    }

    /// Estimating -> Submitting -> AwaitingConfirmation -> Confirmed, or Failed
    async fn execute(&self, attempt: &mut TransactionAttempt<'_>) -> TipperResult<Confirmation> {
        let result = self.drive(attempt).await;
        let next = if result.is_ok() {
            AttemptStatus::Confirmed
        } else {
            AttemptStatus::Failed
        };
        attempt.transition(next);
        result
    }

    async fn drive(&self, attempt: &mut TransactionAttempt<'_>) -> TipperResult<Confirmation> {
        let client = self.ctx.client.as_ref();
        let dispatcher = &self.ctx.dispatcher;

        attempt.transition(AttemptStatus::Estimating);
        let call = attempt.tip.to_call(dispatcher.contract());
        let estimate = self
            .ctx
            .estimator
            .estimate(client, attempt.wallet.address(), &call)
            .await?;
        info!(
            "Gas estimate: {} (limit {} with buffer, max fee {})",
            estimate.raw_gas,
            estimate.gas_limit,
            format_ether(FeeEstimator::max_cost(&estimate))
        );
        attempt.gas_limit = Some(estimate.gas_limit);
        attempt.fee_quote = Some(estimate.fee);

        attempt.transition(AttemptStatus::Submitting);
        let tx_hash = dispatcher
            .submit(
                client,
                attempt.wallet,
                &attempt.tip,
                estimate.gas_limit,
                estimate.fee,
            )
            .await?;
        attempt.tx_hash = Some(tx_hash);

        attempt.transition(AttemptStatus::AwaitingConfirmation);
        dispatcher.await_confirmation(client, tx_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::dispatch::test_support::{context, plan};
    use crate::wallet::tests::{test_wallet, KEY_0};
    use ethers::utils::parse_ether;
    use std::sync::{Arc, Mutex};

    fn quote() -> FeeQuote {
        FeeQuote {
            max_fee_per_gas: U256::from(2_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        }
    }

    /// Mock with a funded balance, fixed estimate and quote, and instant confirmations
    fn happy_client(balance: &str, sent: Arc<Mutex<Vec<(String, U256)>>>) -> MockChainClient {
        let balance = parse_ether(balance).unwrap();
        let mut client = MockChainClient::new();
        client.expect_chain_id().return_const(688688u64);
        client.expect_get_balance().returning(move |_| Ok(balance));
        client
            .expect_estimate_gas()
            .returning(|_, _| Ok(U256::from(100_001u64)));
        client.expect_fee_quote().returning(|| Ok(quote()));
        client.expect_send_transaction().returning(move |_, prepared| {
            let mut sent = sent.lock().unwrap();
            sent.push((decode_recipient(&prepared.call.data), prepared.gas_limit));
            Ok(H256::from_low_u64_be(sent.len() as u64))
        });
        client.expect_wait_for_confirmation().returning(|hash| {
            Ok(Confirmation {
                tx_hash: hash,
                block_number: 1_000 + hash.to_low_u64_be(),
            })
        });
        client
    }

    fn decode_recipient(data: &[u8]) -> String {
        TipRequest::decode_recipient_id(data)
    }

    #[tokio::test]
    async fn test_five_tips_cycle_recipients() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(
            happy_client("1.0", sent.clone()),
            plan(5, parse_ether("0.001").unwrap()),
            &["alice", "bob"],
        );
        let wallet = test_wallet(KEY_0);

        let report = WalletRunner::new(&ctx, 0, 1, &wallet).run().await;

        assert_eq!(report.outcome, WalletOutcome::Completed);
        assert_eq!(report.confirmed.len(), 5);
        assert!(report.skipped.is_empty());
        assert_eq!(report.retries, 0);

        let sent = sent.lock().unwrap();
        let recipients: Vec<&str> = sent.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(recipients, vec!["alice", "bob", "alice", "bob", "alice"]);
        assert!(sent.iter().all(|(_, gas)| *gas == U256::from(120_002u64)));

        let indexes: Vec<u32> = report.confirmed.iter().map(|t| t.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            report.confirmed[0].explorer_link,
            format!("https://testnet.pharosscan.xyz/tx/{:?}", H256::from_low_u64_be(1))
        );
        assert!(report
            .attempts
            .iter()
            .all(|a| a.status == AttemptStatus::Confirmed));
    }

    #[tokio::test]
    async fn test_underfunded_wallet_never_submits() {
        let mut client = MockChainClient::new();
        client
            .expect_get_balance()
            .returning(|_| Ok(parse_ether("0.001").unwrap()));
        client.expect_estimate_gas().never();
        client.expect_fee_quote().never();
        client.expect_send_transaction().never();
        client.expect_wait_for_confirmation().never();

        let ctx = context(client, plan(1, parse_ether("0.01").unwrap()), &["alice"]);
        let wallet = test_wallet(KEY_0);
        let report = WalletRunner::new(&ctx, 0, 1, &wallet).run().await;

        assert!(matches!(report.outcome, WalletOutcome::Skipped { .. }));
        assert!(report.attempts.is_empty());
        assert_eq!(report.broadcasts(), 0);
    }

    #[tokio::test]
    async fn test_retry_keeps_index_and_recipient() {
        let mut client = MockChainClient::new();
        client
            .expect_get_balance()
            .returning(|_| Ok(parse_ether("1").unwrap()));
        client
            .expect_estimate_gas()
            .returning(|_, _| Ok(U256::from(50_000u64)));
        client.expect_fee_quote().returning(|| Ok(quote()));

        let sends = Arc::new(Mutex::new(Vec::new()));
        let recorded = sends.clone();
        client.expect_send_transaction().returning(move |_, prepared| {
            let mut sends = recorded.lock().unwrap();
            sends.push(decode_recipient(&prepared.call.data));
            // Second submission overall (index 1, first try) hits a stale nonce
            if sends.len() == 2 {
                Err(TipperError::NonceConflict("nonce too low".into()))
            } else {
                Ok(H256::from_low_u64_be(sends.len() as u64))
            }
        });
        client.expect_wait_for_confirmation().returning(|hash| {
            Ok(Confirmation {
                tx_hash: hash,
                block_number: 10,
            })
        });

        let ctx = context(client, plan(3, U256::from(1_000u64)), &["alice", "bob", "carol"]);
        let wallet = test_wallet(KEY_0);
        let report = WalletRunner::new(&ctx, 0, 1, &wallet).run().await;

        assert_eq!(report.outcome, WalletOutcome::Completed);
        assert_eq!(report.retries, 1);
        assert_eq!(
            *sends.lock().unwrap(),
            vec!["alice", "bob", "bob", "carol"]
        );

        let failed = &report.attempts[1];
        assert_eq!(failed.status, AttemptStatus::Failed);
        assert_eq!((failed.index, failed.retry), (1, 0));
        let retried = &report.attempts[2];
        assert_eq!(retried.status, AttemptStatus::Confirmed);
        assert_eq!((retried.index, retried.retry), (1, 1));
        assert_eq!(retried.recipient, failed.recipient);

        let indexes: Vec<u32> = report.confirmed.iter().map(|t| t.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_insufficient_funds_aborts_wallet() {
        let mut client = MockChainClient::new();
        client
            .expect_get_balance()
            .returning(|_| Ok(parse_ether("1").unwrap()));
        client
            .expect_estimate_gas()
            .returning(|_, _| Ok(U256::from(50_000u64)));
        client.expect_fee_quote().returning(|| Ok(quote()));
        let mut sends = 0u32;
        client.expect_send_transaction().times(2).returning(move |_, _| {
            sends += 1;
            if sends == 2 {
                Err(TipperError::InsufficientFunds(
                    "insufficient funds for gas * price + value".into(),
                ))
            } else {
                Ok(H256::from_low_u64_be(sends as u64))
            }
        });
        client.expect_wait_for_confirmation().times(1).returning(|hash| {
            Ok(Confirmation {
                tx_hash: hash,
                block_number: 10,
            })
        });

        let ctx = context(client, plan(5, U256::from(1_000u64)), &["alice"]);
        let wallet = test_wallet(KEY_0);
        let report = WalletRunner::new(&ctx, 0, 1, &wallet).run().await;

        assert!(matches!(report.outcome, WalletOutcome::Aborted { index: 1, .. }));
        assert_eq!(report.confirmed.len(), 1);
        assert_eq!(report.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_unclassified_error_skips_index() {
        let mut client = MockChainClient::new();
        client
            .expect_get_balance()
            .returning(|_| Ok(parse_ether("1").unwrap()));
        let mut estimates = 0u32;
        client.expect_estimate_gas().returning(move |_, _| {
            estimates += 1;
            if estimates == 1 {
                Err(TipperError::Reverted("execution reverted".into()))
            } else {
                Ok(U256::from(50_000u64))
            }
        });
        client.expect_fee_quote().times(1).returning(|| Ok(quote()));
        client
            .expect_send_transaction()
            .times(1)
            .returning(|_, _| Ok(H256::from_low_u64_be(9)));
        client.expect_wait_for_confirmation().returning(|hash| {
            Ok(Confirmation {
                tx_hash: hash,
                block_number: 10,
            })
        });

        let ctx = context(client, plan(2, U256::from(1_000u64)), &["alice", "bob"]);
        let wallet = test_wallet(KEY_0);
        let report = WalletRunner::new(&ctx, 0, 1, &wallet).run().await;

        assert_eq!(report.outcome, WalletOutcome::Completed);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 0);
        assert_eq!(report.skipped[0].recipient, "alice");
        assert_eq!(report.confirmed.len(), 1);
        assert_eq!(report.confirmed[0].index, 1);
        assert_eq!(report.confirmed[0].recipient, "bob");
    }

    #[tokio::test]
    async fn test_exhausted_retries_skip_index() {
        let mut client = MockChainClient::new();
        client
            .expect_get_balance()
            .returning(|_| Ok(parse_ether("1").unwrap()));
        client
            .expect_estimate_gas()
            .returning(|_, _| Ok(U256::from(50_000u64)));
        client.expect_fee_quote().returning(|| Ok(quote()));
        // 1 initial try + 3 retries, all underpriced
        client
            .expect_send_transaction()
            .times(4)
            .returning(|_, _| Err(TipperError::Underpriced("replacement transaction underpriced".into())));
        client.expect_wait_for_confirmation().never();

        let ctx = context(client, plan(1, U256::from(1_000u64)), &["alice"]);
        let wallet = test_wallet(KEY_0);
        let report = WalletRunner::new(&ctx, 0, 1, &wallet).run().await;

        assert_eq!(report.outcome, WalletOutcome::Completed);
        assert_eq!(report.retries, 3);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.attempts.iter().all(|a| a.index == 0));
        assert!(report.confirmed.is_empty());
    }

    #[tokio::test]
    async fn test_transient_estimate_failure_is_retried() {
        let mut client = MockChainClient::new();
        client
            .expect_get_balance()
            .returning(|_| Ok(parse_ether("1").unwrap()));
        let mut estimates = 0u32;
        client.expect_estimate_gas().times(2).returning(move |_, _| {
            estimates += 1;
            if estimates == 1 {
                Err(TipperError::ChainConnection {
                    chain_id: 688688,
                    message: "connection reset by peer".into(),
                })
            } else {
                Ok(U256::from(50_000u64))
            }
        });
        client.expect_fee_quote().times(1).returning(|| Ok(quote()));
        client
            .expect_send_transaction()
            .times(1)
            .returning(|_, _| Ok(H256::from_low_u64_be(1)));
        client.expect_wait_for_confirmation().returning(|hash| {
            Ok(Confirmation {
                tx_hash: hash,
                block_number: 10,
            })
        });

        let ctx = context(client, plan(1, U256::from(1_000u64)), &["alice"]);
        let wallet = test_wallet(KEY_0);
        let report = WalletRunner::new(&ctx, 0, 1, &wallet).run().await;

        assert_eq!(report.outcome, WalletOutcome::Completed);
        assert_eq!(report.retries, 1);
        assert_eq!(report.confirmed.len(), 1);
        assert_eq!(report.attempts[0].status, AttemptStatus::Failed);
        assert!(report.attempts[0].tx_hash.is_none());
    }

    #[test]
    fn test_attempt_starts_pending() {
        let wallet = test_wallet(KEY_0);
        let tip = TipRequest::new(
            plan(1, U256::one()).token,
            crate::recipients::Recipient::new("x", "alice"),
            U256::one(),
        );
        let attempt = TransactionAttempt::new(0, 0, &wallet, tip);
        assert_eq!(attempt.status, AttemptStatus::Pending);
        assert!(attempt.gas_limit.is_none() && attempt.fee_quote.is_none());
        assert_eq!(attempt.wallet.address(), wallet.address());
    }
}
