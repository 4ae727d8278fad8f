use super::connect;
use crate::{config::CliConfig, error::CliResult};
use metaplex_tx_batch::fetch_blockhash_snapshot;

pub async fn execute(config: CliConfig) -> CliResult<()> {
    let connection = connect(&config)?;
    let snapshot =
        fetch_blockhash_snapshot(&connection, config.pipeline.commitment_config()).await?;

    println!("Blockhash: {}", snapshot.blockhash);
    println!("Slot: {}", snapshot.slot);
    Ok(())
}
