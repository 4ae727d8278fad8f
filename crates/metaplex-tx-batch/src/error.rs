use solana_sdk::{
    signature::Signature, signer::SignerError, transaction::TransactionError,
};
use thiserror::Error;

pub type TxPipelineResult<T> = Result<T, TxPipelineError>;

/// Errors raised by a [`crate::Connection`] implementation
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("RPC client error: {0}")]
    RpcClient(#[from] solana_client::client_error::ClientError),

    #[error("Signature subscription failed: {0}")]
    Subscription(String),

    #[error("Unexpected RPC response: {0}")]
    UnexpectedResponse(String),
}

/// Errors raised by a [`crate::WalletSigner`] implementation
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet not connected")]
    NotConnected,

    #[error("Signing request rejected: {0}")]
    Rejected(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),
}

/// Coarse classification of a failed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    OnChain,
    Transport,
}

/// Outcome of a single submission that did not land cleanly
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Timed out awaiting confirmation on transaction {signature}")]
    Timeout { signature: Signature },

    #[error("Transaction {signature} failed: {}", .message.as_deref().unwrap_or("custom instruction error"))]
    OnChain {
        signature: Signature,
        error: Option<TransactionError>,
        message: Option<String>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] ConnectionError),
}

impl SendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SendError::Timeout { .. } => FailureKind::Timeout,
            SendError::OnChain { .. } => FailureKind::OnChain,
            SendError::Transport(_) => FailureKind::Transport,
        }
    }

    /// Signature of the submitted transaction, if it got far enough to have one
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            SendError::Timeout { signature } | SendError::OnChain { signature, .. } => {
                Some(signature)
            }
            SendError::Transport(_) => None,
        }
    }

    /// The cluster no longer knows the transaction's blockhash; resending the
    /// same bytes cannot land
    pub fn is_expired_blockhash(&self) -> bool {
        matches!(
            self,
            SendError::OnChain {
                error: Some(TransactionError::BlockhashNotFound),
                ..
            }
        )
    }

    /// Whether a fresh attempt (possibly with a new blockhash) may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SendError::Timeout { .. } | SendError::Transport(_) => true,
            SendError::OnChain { error, .. } => matches!(
                error,
                Some(
                    TransactionError::BlockhashNotFound
                        | TransactionError::AccountInUse
                        | TransactionError::ClusterMaintenance
                )
            ),
        }
    }
}

/// Errors that can occur while preparing or running a pipeline operation
#[derive(Error, Debug)]
pub enum TxPipelineError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("No instructions provided")]
    NoInstructions,

    #[error("No fee payer: signer set is empty but the fee payer was expected in it")]
    NoFeePayer,

    #[error("Transaction too large: {size} bytes (max: {max})")]
    TransactionTooLarge { size: usize, max: usize },

    #[error("Failed to sign transaction: {0}")]
    Signing(#[from] SignerError),

    #[error("Wallet returned {returned} signed transactions for {requested} requested")]
    SignedCountMismatch { requested: usize, returned: usize },

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("Configuration error: {0}")]
    Config(String),
}
