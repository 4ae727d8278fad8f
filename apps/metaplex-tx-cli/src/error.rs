use metaplex_tx_batch::{ConnectionError, TxPipelineError};
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Pipeline(#[from] TxPipelineError),

    #[error("Command execution failed: {0}")]
    CommandExecution(String),
}
