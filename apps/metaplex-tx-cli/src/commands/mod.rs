pub mod blockhash;
pub mod retry_batch;
pub mod send_batch;
pub mod smart_send;

use crate::{
    config::CliConfig,
    error::{CliError, CliResult},
};
use metaplex_tx_batch::{KeypairWallet, RpcConnection, TxPipelineClient};
use solana_sdk::signature::read_keypair_file;
use std::sync::Arc;
use tracing::info;

pub type Client = TxPipelineClient<RpcConnection, KeypairWallet>;

/// Connection only; no keypair needed
pub fn connect(config: &CliConfig) -> CliResult<RpcConnection> {
    info!("Connecting to {}", config.rpc_url);
    Ok(RpcConnection::from_url(
        &config.rpc_url,
        config.pipeline.commitment_config(),
    )?)
}

/// Client signing with the configured keypair
pub fn client(config: &CliConfig) -> CliResult<Client> {
    let keypair_path = config.keypair_path.as_ref().ok_or_else(|| {
        CliError::InvalidConfig("no keypair given; pass --keypair or set keypair_path".to_string())
    })?;
    let keypair = read_keypair_file(keypair_path).map_err(|e| {
        CliError::InvalidConfig(format!(
            "Failed to read keypair {}: {}",
            keypair_path.display(),
            e
        ))
    })?;
    let connection = connect(config)?;
    Ok(TxPipelineClient::with_config(
        Arc::new(connection),
        Arc::new(KeypairWallet::new(keypair)),
        config.pipeline.clone(),
    )?)
}
