//! Top-level driver: runs every wallet and collects the run summary

use super::report::RunSummary;
use super::runner::WalletRunner;
use super::DispatchContext;
use crate::wallet::WalletCredential;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::info;
use uuid::Uuid;

/// Drives wallet runners over the credential list
pub struct DispatchEngine {
    ctx: DispatchContext,
}

impl DispatchEngine {
    pub fn new(ctx: DispatchContext) -> Self {
        Self { ctx }
    }

    /// Process all wallets. Results come back in file order whatever the concurrency.
    pub async fn run(&self, wallets: &[WalletCredential]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = wallets.len();

        info!(
            "Starting run {}: {} wallets, {} tips each, recipients: {}",
            run_id,
            total,
            self.ctx.plan.tx_count,
            self.ctx.recipients.handles().join(", ")
        );
        info!(
            "Will send {} ({} wei) per transaction",
            ethers::utils::format_ether(self.ctx.plan.amount_per_tx),
            self.ctx.plan.amount_per_tx
        );

        // buffered(1) only builds the next runner once the previous one finished
        let reports = stream::iter(wallets.iter().enumerate())
            .map(|(position, wallet)| WalletRunner::new(&self.ctx, position, total, wallet).run())
            .buffered(self.ctx.plan.wallet_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            wallets: reports,
        }
    }
}
