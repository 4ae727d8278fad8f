//! The network capability the pipeline consumes.
//!
//! Everything the senders need from a cluster goes through [`Connection`], so
//! the pipeline can run against [`crate::RpcConnection`] in production and a
//! scripted chain in tests.

use crate::ConnectionError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, signature::Signature,
    transaction::{Transaction, TransactionError},
};

/// Status of a signature as reported by a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    /// `None` once the block is rooted
    pub confirmations: Option<usize>,
    pub err: Option<TransactionError>,
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations.map_or(true, |confirmations| confirmations > 0)
    }
}

/// Result of a signature confirmation, from either a notification or a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureConfirmation {
    pub slot: u64,
    pub err: Option<TransactionError>,
}

/// Result of simulating a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait Connection: Send + Sync {
    /// Submit a signed transaction without preflight simulation
    async fn send_transaction(&self, transaction: &Transaction)
        -> Result<Signature, ConnectionError>;

    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureStatus>>, ConnectionError>;

    async fn get_latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> Result<Hash, ConnectionError>;

    async fn get_slot(&self, commitment: CommitmentConfig) -> Result<u64, ConnectionError>;

    /// Resolve with the first processed notification for `signature`
    async fn wait_for_signature(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<SignatureConfirmation, ConnectionError>;

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
        commitment: CommitmentConfig,
    ) -> Result<SimulationOutcome, ConnectionError>;

    /// Log messages of a confirmed transaction, `None` if the node does not have it
    async fn get_transaction_logs(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<Vec<String>>, ConnectionError>;
}
