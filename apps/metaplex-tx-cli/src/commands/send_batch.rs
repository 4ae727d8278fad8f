use super::client;
use crate::{
    config::{CliConfig, TransferPlan},
    error::{CliError, CliResult},
};
use metaplex_tx_batch::{
    SendError, SequencePolicy, Signature, Transaction, TxPipelineError, WalletSigner,
};
use std::path::PathBuf;
use tracing::info;

pub async fn execute(
    config: CliConfig,
    plan: PathBuf,
    policy: SequencePolicy,
    split: bool,
    chunked: bool,
) -> CliResult<()> {
    let client = client(&config)?;
    let payer = client
        .wallet()
        .public_key()
        .ok_or(TxPipelineError::WalletNotConnected)?;
    let plan = TransferPlan::load(&plan)?;
    let mut sets = plan.instruction_sets(&payer)?;
    if split {
        sets = client.fit_instruction_sets(&sets)?;
    }

    println!("📦 Sending {} batches ({:?})", sets.len(), policy);

    let on_success = |signature: &Signature, index: usize| {
        println!("✅ #{index} landed: {signature}");
    };
    let on_failure = |_: &Transaction, error: &SendError, index: usize| {
        println!("❌ #{index} failed: {error}");
        false
    };
    let outcome = if chunked {
        info!("Approving in chunks of {}", config.pipeline.chunk_size);
        client
            .send_transactions_in_chunks(&sets, policy, on_success, on_failure)
            .await?
    } else {
        client
            .send_transactions(&sets, policy, None, on_success, on_failure)
            .await?
    };

    let landed = outcome.landed().count();
    println!("\n📊 Summary:");
    println!("  - {} of {} transactions landed", landed, outcome.built);
    if let Some(index) = outcome.stopped_at {
        println!("  - Stopped at #{index}; resume from #{}", outcome.resume_index());
    }

    if outcome.is_success() {
        Ok(())
    } else {
        Err(CliError::CommandExecution(format!(
            "{} of {} transactions failed",
            outcome.failures().count(),
            outcome.built
        )))
    }
}
