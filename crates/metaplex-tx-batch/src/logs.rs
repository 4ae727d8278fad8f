//! Extraction of human-readable failure reasons from program logs.

use crate::{Connection, ConnectionError};
use once_cell::sync::Lazy;
use regex::Regex;
use solana_sdk::{commitment_config::CommitmentConfig, signature::Signature};

pub const PROGRAM_LOG_PREFIX: &str = "Program log: ";

static ERROR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"Error: (.*)").expect("valid regex"));

/// Every `Error: ...` reason found in `logs`, in log order
pub fn decode_program_errors<S: AsRef<str>>(logs: &[S]) -> Vec<String> {
    logs.iter()
        .flat_map(|line| {
            ERROR_PATTERN
                .captures_iter(line.as_ref())
                .filter_map(|captures| captures.get(1))
                .map(|reason| reason.as_str().to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// The deepest `Program log:` message, scanning from the end of the logs
pub fn last_program_log<S: AsRef<str>>(logs: &[S]) -> Option<&str> {
    logs.iter()
        .rev()
        .find_map(|line| line.as_ref().strip_prefix(PROGRAM_LOG_PREFIX))
}

/// Error reasons logged by a confirmed transaction
pub async fn get_error_for_transaction<C: Connection + ?Sized>(
    connection: &C,
    signature: &Signature,
    commitment: CommitmentConfig,
) -> Result<Vec<String>, ConnectionError> {
    let logs = connection
        .get_transaction_logs(signature, commitment)
        .await?
        .unwrap_or_default();
    Ok(decode_program_errors(&logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MockConnection;
    use tokio_test::{assert_err, assert_ok};

    fn auction_logs() -> Vec<String> {
        vec![
            "Program p1nCH111111111111111111111111111111111111 invoke [1]".to_string(),
            "Program log: Instruction: PlaceBid".to_string(),
            "Program log: Error: Bid is too small".to_string(),
            "Program log: Custom program error: 0x1771".to_string(),
            "Program p1nCH111111111111111111111111111111111111 failed: custom program error: 0x1771"
                .to_string(),
        ]
    }

    #[test]
    fn test_decode_program_errors() {
        assert_eq!(decode_program_errors(&auction_logs()), vec!["Bid is too small"]);
        assert!(decode_program_errors::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_last_program_log_scans_in_reverse() {
        assert_eq!(
            last_program_log(&auction_logs()),
            Some("Custom program error: 0x1771")
        );
        assert_eq!(last_program_log(&["Program invoke [1]"]), None);
    }

    #[tokio::test]
    async fn test_get_error_for_transaction() {
        let mut connection = MockConnection::new();
        connection
            .expect_get_transaction_logs()
            .returning(|_, _| Box::pin(async { Ok(Some(auction_logs())) }));

        let errors = assert_ok!(
            get_error_for_transaction(
                &connection,
                &Signature::new_unique(),
                CommitmentConfig::confirmed(),
            )
            .await
        );
        assert_eq!(errors, vec!["Bid is too small".to_string()]);
    }

    #[tokio::test]
    async fn test_log_fetch_failure_propagates() {
        let mut connection = MockConnection::new();
        connection.expect_get_transaction_logs().returning(|_, _| {
            Box::pin(async { Err(ConnectionError::UnexpectedResponse("pruned".to_string())) })
        });

        assert_err!(
            get_error_for_transaction(
                &connection,
                &Signature::new_unique(),
                CommitmentConfig::confirmed(),
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_missing_transaction_has_no_errors() {
        let mut connection = MockConnection::new();
        connection
            .expect_get_transaction_logs()
            .returning(|_, _| Box::pin(async { Ok(None) }));

        let errors = assert_ok!(
            get_error_for_transaction(
                &connection,
                &Signature::new_unique(),
                CommitmentConfig::confirmed(),
            )
            .await
        );
        assert!(errors.is_empty());
    }
}
