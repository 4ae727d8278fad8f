use super::client;
use crate::{
    config::{CliConfig, TransferPlan},
    error::{CliError, CliResult},
};
use metaplex_tx_batch::{TxPipelineError, WalletSigner};
use std::path::PathBuf;

pub async fn execute(config: CliConfig, plan: PathBuf) -> CliResult<()> {
    let client = client(&config)?;
    let payer = client
        .wallet()
        .public_key()
        .ok_or(TxPipelineError::WalletNotConnected)?;
    let sets = TransferPlan::load(&plan)?.instruction_sets(&payer)?;

    println!("🔁 Sending {} batches with manual retry", sets.len());
    let outcome = client.send_transactions_with_manual_retry(&sets).await?;

    for confirmed in &outcome.landed {
        println!("✅ {} (slot {})", confirmed.signature, confirmed.slot);
    }
    println!("\n📊 Summary:");
    println!("  - {} landed in {} attempts", outcome.landed.len(), outcome.attempts);

    if outcome.is_complete() {
        Ok(())
    } else {
        Err(CliError::CommandExecution(format!(
            "{} batches still unsent after {} attempts",
            outcome.remaining.len(),
            outcome.attempts
        )))
    }
}
