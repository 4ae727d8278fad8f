/*!
# Metaplex Transaction Pipeline Testing

A scripted in-memory chain ([`ScriptedConnection`]) and a wallet that records
its approvals ([`RecordingWallet`]), for driving the pipeline end to end
without a validator. Transactions are identified by a one-byte tag carried as
the first data byte of their first instruction.
*/

mod recording_wallet;
mod scripted_connection;
mod test_fixture;

pub use recording_wallet::RecordingWallet;
pub use scripted_connection::{transaction_tag, ScriptedConnection, ScriptedOutcome, Submission};
pub use test_fixture::TestFixture;

use {
    metaplex_tx_batch::{InstructionSet, SignerSet},
    solana_sdk::{
        instruction::{AccountMeta, Instruction},
        pubkey::Pubkey,
        signature::Keypair,
        signer::Signer,
    },
    std::sync::Arc,
};

/// Memo-like program the tagged instructions are addressed to
pub const TEST_PROGRAM_ID: Pubkey = Pubkey::new_from_array([7; 32]);

/// Instruction set tagged `tag` with `instruction_count` instructions and
/// `signer_count` fresh co-signers, all referenced by the first instruction
pub fn tagged_set(tag: u8, instruction_count: usize, signer_count: usize) -> InstructionSet {
    let signers: SignerSet = (0..signer_count).map(|_| Arc::new(Keypair::new())).collect();
    let instructions = (0..instruction_count)
        .map(|position| {
            let accounts = if position == 0 {
                signers
                    .iter()
                    .map(|signer| AccountMeta::new_readonly(signer.pubkey(), true))
                    .collect()
            } else {
                Vec::new()
            };
            Instruction::new_with_bytes(TEST_PROGRAM_ID, &[tag, position as u8], accounts)
        })
        .collect();
    InstructionSet::new(instructions, signers)
}

/// Single-instruction set tagged `tag`
pub fn tagged(tag: u8) -> InstructionSet {
    tagged_set(tag, 1, 0)
}

/// Program logs ending in a program-emitted error message
pub fn program_error_logs(message: &str) -> Vec<String> {
    vec![
        format!("Program {TEST_PROGRAM_ID} invoke [1]"),
        "Program log: Instruction: Process".to_string(),
        format!("Program log: Error: {message}"),
        format!("Program {TEST_PROGRAM_ID} failed: custom program error: 0x1"),
    ]
}
