/*!
# RPC Connection

[`Connection`] over a JSON-RPC node, with signature notifications from the
node's websocket endpoint.
*/

use crate::{
    Connection, ConnectionError, SignatureConfirmation, SignatureStatus, SimulationOutcome,
};
use async_trait::async_trait;
use futures::StreamExt;
use solana_client::{
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_config::{
        RpcSendTransactionConfig, RpcSignatureSubscribeConfig, RpcSimulateTransactionConfig,
        RpcTransactionConfig,
    },
    rpc_response::RpcSignatureResult,
};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::{option_serializer::OptionSerializer, UiTransactionEncoding};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

/// Default JSON-RPC port of a validator; its websocket listens one port up
const DEFAULT_RPC_PORT: u16 = 8899;

/// Websocket endpoint matching an HTTP RPC endpoint
pub fn websocket_url_for(rpc_url: &str) -> Result<String, ConnectionError> {
    let mut url = Url::parse(rpc_url)
        .map_err(|e| ConnectionError::UnexpectedResponse(format!("invalid RPC URL {rpc_url}: {e}")))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ConnectionError::UnexpectedResponse(format!(
                "unsupported RPC URL scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ConnectionError::UnexpectedResponse(format!("cannot derive websocket URL from {rpc_url}")))?;
    if url.port() == Some(DEFAULT_RPC_PORT) {
        url.set_port(Some(DEFAULT_RPC_PORT + 1))
            .map_err(|_| ConnectionError::UnexpectedResponse(format!("cannot derive websocket URL from {rpc_url}")))?;
    }
    Ok(url.to_string())
}

/// Connection to a cluster through its RPC and websocket endpoints.
///
/// One websocket is opened on the first subscription and shared by every
/// later one; a failed connect is retried on the next subscription.
pub struct RpcConnection {
    rpc_client: Arc<RpcClient>,
    websocket_url: Option<String>,
    pubsub_client: OnceCell<Arc<PubsubClient>>,
}

impl RpcConnection {
    /// Wrap an existing client; without a websocket URL confirmation relies on polling
    pub fn new(rpc_client: Arc<RpcClient>, websocket_url: Option<String>) -> Self {
        Self {
            rpc_client,
            websocket_url,
            pubsub_client: OnceCell::new(),
        }
    }

    /// Connect to `rpc_url`, deriving the websocket endpoint from it
    pub fn from_url(rpc_url: &str, commitment: CommitmentConfig) -> Result<Self, ConnectionError> {
        let websocket_url = websocket_url_for(rpc_url)?;
        let rpc_client = RpcClient::new_with_commitment(rpc_url.to_string(), commitment);
        Ok(Self::new(Arc::new(rpc_client), Some(websocket_url)))
    }

    pub fn rpc_client(&self) -> &Arc<RpcClient> {
        &self.rpc_client
    }

    async fn pubsub_client(&self) -> Result<&Arc<PubsubClient>, ConnectionError> {
        let websocket_url = self.websocket_url.as_deref().ok_or_else(|| {
            ConnectionError::Subscription("no websocket endpoint configured".to_string())
        })?;
        self.pubsub_client
            .get_or_try_init(|| async {
                info!("Connecting to websocket {}", websocket_url);
                let client = PubsubClient::new(websocket_url)
                    .await
                    .map_err(|e| ConnectionError::Subscription(e.to_string()))?;
                Ok::<_, ConnectionError>(Arc::new(client))
            })
            .await
    }
}

#[async_trait]
impl Connection for RpcConnection {
    async fn send_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, ConnectionError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: None,
            encoding: None,
            max_retries: None,
            min_context_slot: None,
        };
        Ok(self
            .rpc_client
            .send_transaction_with_config(transaction, config)
            .await?)
    }

    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureStatus>>, ConnectionError> {
        let response = self.rpc_client.get_signature_statuses(signatures).await?;
        Ok(response
            .value
            .into_iter()
            .map(|status| {
                status.map(|status| SignatureStatus {
                    slot: status.slot,
                    confirmations: status.confirmations,
                    err: status.err,
                })
            })
            .collect())
    }

    async fn get_latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> Result<Hash, ConnectionError> {
        let (blockhash, _last_valid_block_height) = self
            .rpc_client
            .get_latest_blockhash_with_commitment(commitment)
            .await?;
        Ok(blockhash)
    }

    async fn get_slot(&self, commitment: CommitmentConfig) -> Result<u64, ConnectionError> {
        Ok(self.rpc_client.get_slot_with_commitment(commitment).await?)
    }

    async fn wait_for_signature(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<SignatureConfirmation, ConnectionError> {
        let client = self.pubsub_client().await?;

        let (mut notifications, unsubscribe) = client
            .signature_subscribe(
                signature,
                Some(RpcSignatureSubscribeConfig {
                    commitment: Some(commitment),
                    enable_received_notification: Some(false),
                }),
            )
            .await
            .map_err(|e| ConnectionError::Subscription(e.to_string()))?;

        let mut confirmation = None;
        while let Some(response) = notifications.next().await {
            if let RpcSignatureResult::ProcessedSignature(processed) = response.value {
                confirmation = Some(SignatureConfirmation {
                    slot: response.context.slot,
                    err: processed.err,
                });
                break;
            }
        }
        drop(notifications);
        unsubscribe().await;

        confirmation.ok_or_else(|| {
            ConnectionError::Subscription(format!(
                "notification stream for {signature} closed before confirmation"
            ))
        })
    }

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
        commitment: CommitmentConfig,
    ) -> Result<SimulationOutcome, ConnectionError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(commitment),
            encoding: None,
            accounts: None,
            min_context_slot: None,
            inner_instructions: false,
        };
        let result = self
            .rpc_client
            .simulate_transaction_with_config(transaction, config)
            .await?;
        Ok(SimulationOutcome {
            err: result.value.err,
            logs: result.value.logs.unwrap_or_default(),
        })
    }

    async fn get_transaction_logs(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<Vec<String>>, ConnectionError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(commitment),
            max_supported_transaction_version: Some(0),
        };
        let transaction = self
            .rpc_client
            .get_transaction_with_config(signature, config)
            .await?;
        let logs = transaction
            .transaction
            .meta
            .and_then(|meta| match meta.log_messages {
                OptionSerializer::Some(logs) => Some(logs),
                OptionSerializer::None | OptionSerializer::Skip => None,
            });
        debug!(
            "Fetched {} log lines for {}",
            logs.as_ref().map_or(0, Vec::len),
            signature
        );
        Ok(logs)
    }
}
