use super::client;
use crate::{
    config::{CliConfig, TransferPlan},
    error::{CliError, CliResult},
};
use futures::StreamExt;
use metaplex_tx_batch::{SmartSendEvent, TxPipelineError, WalletSigner};
use std::path::PathBuf;

pub async fn execute(config: CliConfig, plan: PathBuf) -> CliResult<()> {
    let client = client(&config)?;
    let payer = client
        .wallet()
        .public_key()
        .ok_or(TxPipelineError::WalletNotConnected)?;
    let plan = TransferPlan::load(&plan)?;
    let sets = plan.instruction_sets(&payer)?;

    println!("🧠 Smart sending {} batches", sets.len());
    let mut events = client.send_smart(sets)?;

    let mut failed = 0;
    while let Some(event) = events.next().await {
        match event {
            SmartSendEvent::Progress {
                index,
                signature,
                slot,
            } => println!("✅ #{index} landed at slot {slot}: {signature}"),
            SmartSendEvent::ReSign { attempt, index } => {
                println!("🔑 Blockhash expired, re-signed from #{index} (attempt {attempt})")
            }
            SmartSendEvent::Failure { error, index, .. } => {
                failed += 1;
                println!("❌ #{index} failed: {error}");
            }
            SmartSendEvent::Finished {
                successful,
                attempted,
            } => {
                println!("\n📊 Summary:");
                println!("  - {successful} of {attempted} transactions landed");
            }
            SmartSendEvent::Aborted { error, index } => {
                return Err(CliError::CommandExecution(format!(
                    "aborted at #{index}: {error}"
                )));
            }
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::CommandExecution(format!(
            "{failed} transactions failed"
        )))
    }
}
