//! Error types for the tip dispatcher

use thiserror::Error;

/// Main error type for the dispatcher
#[derive(Error, Debug)]
pub enum TipperError {
    #[error("No usable private keys found in {path}")]
    NoCredentials { path: String },

    #[error("Credential file error: {0}")]
    Credentials(String),

    #[error("Recipient list is empty")]
    NoRecipients,

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Balance check failed: {0}")]
    BalanceCheck(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Fee underpriced: {0}")]
    Underpriced(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Fee data error: {0}")]
    FeeData(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Transaction {tx_hash} not confirmed within {secs}s")]
    ConfirmationTimeout { tx_hash: String, secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a failed attempt affects the wallet loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Abort the remaining attempts of the current wallet
    FatalToWallet,
    /// Re-attempt the same index after a backoff
    Retryable,
    /// Record the failure and advance to the next index
    SkipAndContinue,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::FatalToWallet => "fatal_to_wallet",
            FailureClass::Retryable => "retryable",
            FailureClass::SkipAndContinue => "skip_and_continue",
        }
    }
}

impl TipperError {
    /// Classify an attempt-level failure. Anything without an explicit mapping skips.
    pub fn classify(&self) -> FailureClass {
        match self {
            TipperError::InsufficientFunds(_) | TipperError::ConfirmationTimeout { .. } => {
                FailureClass::FatalToWallet
            }
            TipperError::NonceConflict(_)
            | TipperError::Underpriced(_)
            | TipperError::ChainConnection { .. }
            | TipperError::FeeData(_)
            | TipperError::Timeout { .. } => FailureClass::Retryable,
            _ => FailureClass::SkipAndContinue,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.classify() == FailureClass::Retryable
    }

    /// Check if error ends the current wallet's run
    pub fn is_fatal_to_wallet(&self) -> bool {
        self.classify() == FailureClass::FatalToWallet
    }

    /// Map a JSON-RPC error message onto a variant.
    ///
    /// Nodes report these conditions only through the message text, so matching is
    /// case-insensitive on the well-known geth/erigon phrases. `fallback` wraps anything
    /// that is not recognised.
    pub fn from_rpc_message(message: &str, fallback: fn(String) -> TipperError) -> TipperError {
        let lower = message.to_lowercase();
        let message = message.to_string();

        if lower.contains("insufficient funds") {
            TipperError::InsufficientFunds(message)
        } else if lower.contains("nonce too low")
            || lower.contains("nonce expired")
            || lower.contains("nonce has already been used")
            || lower.contains("already known")
        {
            TipperError::NonceConflict(message)
        } else if lower.contains("underpriced")
            || lower.contains("max fee per gas less than block base fee")
            || lower.contains("fee cap less than block base fee")
        {
            TipperError::Underpriced(message)
        } else if lower.contains("execution reverted") || lower.contains("revert") {
            TipperError::Reverted(message)
        } else {
            fallback(message)
        }
    }
}

/// Result type for dispatcher operations
pub type TipperResult<T> = Result<T, TipperError>;
