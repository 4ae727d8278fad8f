use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    packet::PACKET_DATA_SIZE,
};
use std::time::Duration;

/// Number of slots a blockhash stays usable after the slot it was fetched at
pub const BLOCKHASH_VALIDITY_SLOTS: u64 = 150;

/// Configuration for pipeline operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TxPipelineConfig {
    /// Commitment level for blockhash, slot and confirmation queries
    pub commitment: CommitmentLevel,

    /// How long to wait for a confirmation before reporting a timeout
    pub transaction_timeout_ms: u64,

    /// Interval between re-broadcasts of an unconfirmed transaction
    pub resubmit_interval_ms: u64,

    /// Interval between signature status polls
    pub status_poll_interval_ms: u64,

    /// Attempts per transaction in the smart sender before giving up on it
    pub max_signing_attempts: usize,

    /// Consecutive attempts without progress before manual retry gives up
    pub max_stalled_attempts: usize,

    /// First delay between smart sender attempts
    pub retry_initial_interval_ms: u64,

    /// Upper bound for the delay between smart sender attempts
    pub retry_max_interval_ms: u64,

    /// Whether the smart sender stops at the first transaction it gives up on
    pub abort_on_failure: bool,

    /// Maximum serialized transaction size in bytes
    pub max_transaction_size_bytes: usize,

    /// Number of transactions per wallet approval when sending in chunks
    pub chunk_size: usize,
}

impl Default for TxPipelineConfig {
    fn default() -> Self {
        Self {
            commitment: CommitmentLevel::Confirmed,
            transaction_timeout_ms: 15_000,
            resubmit_interval_ms: 500,
            status_poll_interval_ms: 2_000,
            max_signing_attempts: 3,
            max_stalled_attempts: 3,
            retry_initial_interval_ms: 1_000,
            retry_max_interval_ms: 10_000,
            abort_on_failure: false,
            max_transaction_size_bytes: PACKET_DATA_SIZE,
            chunk_size: 40,
        }
    }
}

impl TxPipelineConfig {
    pub fn commitment_config(&self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.commitment,
        }
    }

    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            commitment: self.commitment_config(),
            timeout: Duration::from_millis(self.transaction_timeout_ms),
            resubmit_interval: Duration::from_millis(self.resubmit_interval_ms),
            status_poll_interval: Duration::from_millis(self.status_poll_interval_ms),
        }
    }

    pub fn smart_send_options(&self) -> SmartSendOptions {
        SmartSendOptions {
            send: self.send_options(),
            max_signing_attempts: self.max_signing_attempts,
            abort_on_failure: self.abort_on_failure,
            retry_initial_interval: Duration::from_millis(self.retry_initial_interval_ms),
            retry_max_interval: Duration::from_millis(self.retry_max_interval_ms),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_signing_attempts == 0 {
            return Err("max_signing_attempts must be at least 1".to_string());
        }
        if self.max_stalled_attempts == 0 {
            return Err("max_stalled_attempts must be at least 1".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be at least 1".to_string());
        }
        if self.resubmit_interval_ms == 0 || self.status_poll_interval_ms == 0 {
            return Err("resubmit and poll intervals must be non-zero".to_string());
        }
        if self.max_transaction_size_bytes > PACKET_DATA_SIZE {
            return Err(format!(
                "max_transaction_size_bytes {} exceeds packet limit {}",
                self.max_transaction_size_bytes, PACKET_DATA_SIZE
            ));
        }
        Ok(())
    }
}

/// Options for submitting and confirming one signed transaction
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub commitment: CommitmentConfig,
    pub timeout: Duration,
    pub resubmit_interval: Duration,
    pub status_poll_interval: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        TxPipelineConfig::default().send_options()
    }
}

/// Options for the smart sender
#[derive(Debug, Clone, Copy)]
pub struct SmartSendOptions {
    pub send: SendOptions,
    pub max_signing_attempts: usize,
    pub abort_on_failure: bool,
    pub retry_initial_interval: Duration,
    pub retry_max_interval: Duration,
}

impl Default for SmartSendOptions {
    fn default() -> Self {
        TxPipelineConfig::default().smart_send_options()
    }
}

impl SmartSendOptions {
    /// Delay schedule between attempts; attempt count is bounded separately
    pub fn retry_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.retry_initial_interval,
            current_interval: self.retry_initial_interval,
            max_interval: self.retry_max_interval,
            max_elapsed_time: None,
            multiplier: 2.0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TxPipelineConfig::default();
        assert_eq!(config.transaction_timeout_ms, 15_000);
        assert_eq!(config.resubmit_interval_ms, 500);
        assert_eq!(config.status_poll_interval_ms, 2_000);
        assert_eq!(config.max_signing_attempts, 3);
        assert_eq!(config.max_transaction_size_bytes, 1232);
        assert!(!config.abort_on_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: TxPipelineConfig = serde_json::from_str(
            r#"{ "commitment": "finalized", "transaction_timeout_ms": 60000 }"#,
        )
        .unwrap();
        assert_eq!(config.commitment, CommitmentLevel::Finalized);
        assert_eq!(
            config.send_options().timeout,
            Duration::from_secs(60)
        );
        assert_eq!(config.max_signing_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_oversized_limit() {
        let config = TxPipelineConfig {
            max_transaction_size_bytes: 4096,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
