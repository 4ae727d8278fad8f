/*!
# Metaplex Transaction Pipeline

Batches logical marketplace operations (each a list of instructions with its
own co-signers) into transactions, gets them approved by a wallet in one go,
submits them with re-broadcasting and re-signing, and tracks confirmation with
timeouts and error classification.

## Quick Start

```rust,no_run
use metaplex_tx_batch::{
    InstructionSet, KeypairWallet, RpcConnection, SequencePolicy, TxPipelineClient,
};
use solana_sdk::{commitment_config::CommitmentConfig, signature::Keypair};
use std::sync::Arc;

# async fn example() -> Result<(), Box<dyn std::error::Error>> {
let connection = RpcConnection::from_url("https://api.devnet.solana.com", CommitmentConfig::confirmed())?;
let wallet = KeypairWallet::new(Keypair::new());
let client = TxPipelineClient::new(Arc::new(connection), Arc::new(wallet));

let sets: Vec<InstructionSet> = vec![/* your instruction sets */];
let outcome = client
    .send_transactions(&sets, SequencePolicy::StopOnFailure, None, |_, _| {}, |_, _, _| false)
    .await?;
println!("Landed {} of {}", outcome.landed().count(), outcome.built);
# Ok(())
# }
```

## Smart Sending

Long sequences go through the smart sender, which re-signs the remainder
whenever the blockhash it was built with has expired:

```rust,no_run
# use metaplex_tx_batch::{InstructionSet, KeypairWallet, RpcConnection, TxPipelineClient, SmartSendEvent};
# use solana_sdk::{commitment_config::CommitmentConfig, signature::Keypair};
# use std::sync::Arc;
use futures::StreamExt;

# async fn example() -> Result<(), Box<dyn std::error::Error>> {
# let connection = RpcConnection::from_url("http://localhost:8899", CommitmentConfig::confirmed())?;
# let client = TxPipelineClient::new(Arc::new(connection), Arc::new(KeypairWallet::new(Keypair::new())));
# let sets: Vec<InstructionSet> = vec![];
let mut events = client.send_smart(sets)?;
while let Some(event) = events.next().await {
    if let SmartSendEvent::Progress { index, signature, .. } = event {
        println!("{index}: {signature}");
    }
}
# Ok(())
# }
```
*/

mod batch;
mod blockhash;
mod builder;
mod client;
mod config;
mod connection;
mod error;
mod logs;
mod rpc;
mod sender;
mod sizing;
mod smart;
mod wallet;

pub use batch::{
    send_transactions, send_transactions_in_chunks, send_transactions_with_manual_retry,
    BatchOutcome, ManualRetryOutcome, SequencePolicy, TransactionReport,
};
pub use blockhash::{fetch_blockhash_snapshot, BlockhashSnapshot};
pub use builder::{
    build_transaction, build_transactions, instruction_matrix, non_empty_sets, required_signers,
    InstructionSet, SignerSet,
};
pub use client::TxPipelineClient;
pub use config::{SendOptions, SmartSendOptions, TxPipelineConfig, BLOCKHASH_VALIDITY_SLOTS};
pub use connection::{Connection, SignatureConfirmation, SignatureStatus, SimulationOutcome};
pub use error::{
    ConnectionError, FailureKind, SendError, TxPipelineError, TxPipelineResult, WalletError,
};
pub use logs::{decode_program_errors, get_error_for_transaction, last_program_log};
pub use rpc::{websocket_url_for, RpcConnection};
pub use sender::{
    send_signed_transaction, send_transaction, send_transaction_with_retry, BeforeSend,
    Confirmed, SubmissionResult,
};
pub use sizing::{fits_in_transaction, split_instruction_set, transaction_size};
pub use smart::{send_smart, SmartSendConfig, SmartSendEvent, SmartSendEvents};
pub use wallet::{connected_public_key, KeypairWallet, WalletSigner};

// Re-export key Solana types for convenience
pub use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::Transaction,
};
