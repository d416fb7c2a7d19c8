//! Per-wallet and per-run outcome records

use crate::error::{TipperError, TipperResult};

use super::runner::AttemptStatus;
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// A confirmed tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxRecord {
    pub index: u32,
    pub recipient: String,
    pub tx_hash: H256,
    pub block_number: u64,
    pub explorer_link: String,
}

/// An index given up on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTx {
    pub index: u32,
    pub recipient: String,
    pub reason: String,
}

/// One pass through the attempt state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub index: u32,
    pub retry: u32,
    pub recipient: String,
    pub status: AttemptStatus,
    pub tx_hash: Option<H256>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletOutcome {
    /// Precheck failed, nothing was sent
    Skipped { reason: String },
    /// The loop ran to `tx_count`
    Completed,
    /// A wallet-fatal error stopped the loop at `index`
    Aborted { index: u32, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletReport {
    pub position: usize,
    pub address: Address,
    pub outcome: WalletOutcome,
    pub confirmed: Vec<TxRecord>,
    pub skipped: Vec<SkippedTx>,
    pub attempts: Vec<AttemptRecord>,
    pub retries: u32,
}

impl WalletReport {
    pub fn new(position: usize, address: Address) -> Self {
        Self {
            position,
            address,
            outcome: WalletOutcome::Completed,
            confirmed: Vec::new(),
            skipped: Vec::new(),
            attempts: Vec::new(),
            retries: 0,
        }
    }

    /// Attempts that were broadcast and got a hash back
    pub fn broadcasts(&self) -> usize {
        self.attempts.iter().filter(|a| a.tx_hash.is_some()).count()
    }
}

/// Everything a run did, in wallet file order
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wallets: Vec<WalletReport>,
}

impl RunSummary {
    pub fn confirmed_count(&self) -> usize {
        self.wallets.iter().map(|w| w.confirmed.len()).sum()
    }

    pub fn skipped_tx_count(&self) -> usize {
        self.wallets.iter().map(|w| w.skipped.len()).sum()
    }

    pub fn skipped_wallet_count(&self) -> usize {
        self.wallets
            .iter()
            .filter(|w| matches!(w.outcome, WalletOutcome::Skipped { .. }))
            .count()
    }

    pub fn aborted_wallet_count(&self) -> usize {
        self.wallets
            .iter()
            .filter(|w| matches!(w.outcome, WalletOutcome::Aborted { .. }))
            .count()
    }

    /// Human-readable closing summary
    pub fn log(&self) {
        for wallet in &self.wallets {
            match &wallet.outcome {
                WalletOutcome::Skipped { reason } => {
                    warn!("Wallet {} ({:?}) skipped: {}", wallet.position + 1, wallet.address, reason)
                }
                WalletOutcome::Completed => info!(
                    "Wallet {} ({:?}) completed: {} confirmed, {} skipped, {} retries",
                    wallet.position + 1,
                    wallet.address,
                    wallet.confirmed.len(),
                    wallet.skipped.len(),
                    wallet.retries
                ),
                WalletOutcome::Aborted { index, reason } => warn!(
                    "Wallet {} ({:?}) aborted at transaction {}: {} ({} confirmed before)",
                    wallet.position + 1,
                    wallet.address,
                    index + 1,
                    reason,
                    wallet.confirmed.len()
                ),
            }
        }

        info!(
            "All transactions processed: {} confirmed, {} skipped, {} wallets skipped, {} wallets aborted (run {})",
            self.confirmed_count(),
            self.skipped_tx_count(),
            self.skipped_wallet_count(),
            self.aborted_wallet_count(),
            self.run_id
        );
    }

    /// Write the summary as pretty JSON
    pub fn write_json(&self, path: &Path) -> TipperResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TipperError::Internal(format!("Failed to serialize summary: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            TipperError::Internal(format!("Failed to write {}: {}", path.display(), e))
        })?;
        info!("Run summary written to {}", path.display());
        Ok(())
    }
}
