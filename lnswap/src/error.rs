//! Error taxonomy of the swap coordinator.
//!
//! Callers branch on the category rather than on messages:
//!
//! - [`ConfigError`]: the configured time locks or chain constants cannot
//!   work. Never retried.
//! - [`PermanentError`]: this leg of the swap cannot proceed. The caller
//!   decides whether to cancel the commitment; retrying with the same hash
//!   risks double-attempting against the same HTLC.
//! - [`TransportError`]: the payment node did not answer in time or a stream
//!   went away. The caller may re-query or re-subscribe.
//! - [`InvoiceError`]: the commitment reached a state that ends the swap.

use crate::{node::NodeError, swap_hash, SwapHash, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Permanent(#[from] PermanentError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
}

impl Error {
    /// True if retrying the same operation cannot succeed.
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("extended time lock of {extended}s leaves nothing after removing our forwarding delta of {forward_delta}s")]
    InsufficientTimeLock { extended: u64, forward_delta: u32 },
    #[error("time lock budget needs {required} blocks but the limit is {limit}")]
    BudgetExceeded { required: u32, limit: u32 },
    #[error("final cltv delta must be greater than zero")]
    ZeroFinalDelta,
    #[error("seconds per block must be greater than zero")]
    ZeroBlockTime,
    #[error("no chain constants known for {symbol}")]
    MissingChainConstants { symbol: String },
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PermanentError {
    #[error("no route to destination: {0}")]
    NoRoute(String),
    #[error("all candidate routes exceed the time lock budget: {0}")]
    TimeLockBudgetExceeded(String),
    #[error("payment rejected: {0}")]
    PaymentRejected(String),
    #[error("payment node rejected request: {0}")]
    NodeRejected(String),
    #[error("preimage does not hash to {swap_hash}")]
    PreimageMismatch { swap_hash: SwapHash },
    #[error("payment for {swap_hash} succeeded without a preimage")]
    MissingPreimage { swap_hash: SwapHash },
    #[error("payment for {swap_hash} was never attempted")]
    PaymentNotInitiated { swap_hash: SwapHash },
    #[error("payment for {swap_hash} failed")]
    PaymentFailed { swap_hash: SwapHash },
    #[error("payment for {swap_hash} is complete but not in the list of completed payments")]
    PreimageNotFound { swap_hash: SwapHash },
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("invalid swap hash")]
    InvalidHash(#[from] swap_hash::FromErr),
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("invoice subscription for {swap_hash} closed before a terminal state")]
    StreamClosed { swap_hash: SwapHash },
    #[error("operation was cancelled")]
    Cancelled,
    #[error("payment node unreachable: {0}")]
    Node(String),
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InvoiceError {
    #[error("invoice for {swap_hash} is already settled")]
    AlreadySettled { swap_hash: SwapHash },
    #[error("invoice for {swap_hash} was canceled")]
    Canceled { swap_hash: SwapHash },
    #[error("invoice for {swap_hash} expired at {expired_at}")]
    Expired {
        swap_hash: SwapHash,
        expired_at: Timestamp,
    },
}

impl From<NodeError> for Error {
    fn from(error: NodeError) -> Self {
        match error {
            NodeError::DeadlineExceeded => TransportError::DeadlineExceeded.into(),
            NodeError::Transport(msg) => TransportError::Node(msg).into(),
            NodeError::HashAlreadyExists => {
                PermanentError::NodeRejected(NodeError::HashAlreadyExists.to_string()).into()
            }
            NodeError::Rejected(msg) => PermanentError::NodeRejected(msg).into(),
        }
    }
}
