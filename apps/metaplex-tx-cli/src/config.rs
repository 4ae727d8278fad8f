use crate::error::{CliError, CliResult};
use metaplex_tx_batch::{InstructionSet, Pubkey, TxPipelineConfig};
use serde::{Deserialize, Serialize};
use solana_sdk::system_instruction;
use std::{fs, path::Path, path::PathBuf, str::FromStr};

/// CLI configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Solana RPC URL; the websocket endpoint is derived from it
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Path to the fee payer keypair file
    #[serde(default)]
    pub keypair_path: Option<PathBuf>,

    /// Send, confirmation and retry settings
    #[serde(default)]
    pub pipeline: TxPipelineConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            keypair_path: None,
            pipeline: TxPipelineConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load `path`, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let config: Self = match path {
            Some(path) => serde_yaml::from_str(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.pipeline.validate().map_err(CliError::InvalidConfig)?;
        Ok(config)
    }
}

/// A list of transfer batches; every batch becomes one logical action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPlan {
    pub batches: Vec<TransferBatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferBatch {
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    /// Base58 recipient address
    pub recipient: String,
    pub lamports: u64,
}

impl TransferPlan {
    pub fn load(path: &Path) -> CliResult<Self> {
        Ok(serde_yaml::from_str(&fs::read_to_string(path)?)?)
    }

    /// One instruction set per batch, transfers paid from `payer`
    pub fn instruction_sets(&self, payer: &Pubkey) -> CliResult<Vec<InstructionSet>> {
        self.batches
            .iter()
            .enumerate()
            .map(|(index, batch)| {
                let instructions = batch
                    .transfers
                    .iter()
                    .map(|transfer| {
                        let recipient = Pubkey::from_str(&transfer.recipient).map_err(|e| {
                            CliError::InvalidConfig(format!(
                                "batch {index}: invalid recipient {}: {e}",
                                transfer.recipient
                            ))
                        })?;
                        Ok(system_instruction::transfer(payer, &recipient, transfer.lamports))
                    })
                    .collect::<CliResult<Vec<_>>>()?;
                Ok(InstructionSet::new(instructions, vec![]))
            })
            .collect()
    }
}

fn default_rpc_url() -> String {
    "http://localhost:8899".to_string()
}
