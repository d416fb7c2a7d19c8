//! Transaction building, fee estimation, submission and retry classification

mod gas;
mod retry;
mod sender;
mod tip;

pub use gas::{FeeEstimate, FeeEstimator};
pub use retry::{AttemptDecision, RetryPolicy};
pub use sender::TransactionDispatcher;
pub use tip::{TipRequest, Token, TokenType};
