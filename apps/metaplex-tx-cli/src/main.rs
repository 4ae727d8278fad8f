use clap::{Parser, Subcommand, ValueEnum};
use metaplex_tx_batch::SequencePolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;

use config::CliConfig;
use error::CliResult;

#[derive(Parser)]
#[command(name = "metaplex-tx")]
#[command(about = "Batch, sign and confirm Solana transactions")]
#[command(version)]
struct Cli {
    /// CLI configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Solana RPC URL, overriding the configuration file
    #[arg(short, long, global = true)]
    rpc_url: Option<String>,

    /// Fee payer keypair file, overriding the configuration file
    #[arg(short, long, global = true)]
    keypair: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// How a batch is dispatched
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    /// Send everything at once
    Parallel,
    /// One at a time, stopping only when asked to
    Sequential,
    /// One at a time, stopping at the first failure
    StopOnFailure,
}

impl From<PolicyArg> for SequencePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Parallel => SequencePolicy::Parallel,
            PolicyArg::Sequential => SequencePolicy::Sequential,
            PolicyArg::StopOnFailure => SequencePolicy::StopOnFailure,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a blockhash snapshot
    Blockhash,

    /// Sign a transfer plan in one approval and send it as a batch
    SendBatch {
        /// Transfer plan file (YAML)
        plan: PathBuf,

        #[arg(short, long, value_enum, default_value = "stop-on-failure")]
        policy: PolicyArg,

        /// Split batches that do not fit in one transaction
        #[arg(long)]
        split: bool,

        /// Approve and send in chunks of the configured chunk size
        #[arg(long)]
        chunked: bool,
    },

    /// Send a transfer plan, re-signing and re-sending what failed
    RetryBatch {
        /// Transfer plan file (YAML)
        plan: PathBuf,
    },

    /// Send a transfer plan one transaction at a time, re-signing on blockhash expiry
    SmartSend {
        /// Transfer plan file (YAML)
        plan: PathBuf,

        /// Stop at the first transaction that cannot be landed
        #[arg(long)]
        abort_on_failure: bool,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(rpc_url) = cli.rpc_url {
        config.rpc_url = rpc_url;
    }
    if let Some(keypair) = cli.keypair {
        config.keypair_path = Some(keypair);
    }

    match cli.command {
        Commands::Blockhash => commands::blockhash::execute(config).await,

        Commands::SendBatch {
            plan,
            policy,
            split,
            chunked,
        } => commands::send_batch::execute(config, plan, policy.into(), split, chunked).await,

        Commands::RetryBatch { plan } => commands::retry_batch::execute(config, plan).await,

        Commands::SmartSend {
            plan,
            abort_on_failure,
        } => {
            if abort_on_failure {
                config.pipeline.abort_on_failure = true;
            }
            commands::smart_send::execute(config, plan).await
        }
    }
}
