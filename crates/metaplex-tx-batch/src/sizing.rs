//! Wire-size estimation and splitting of instruction sets that do not fit in
//! one transaction.

use crate::{
    builder::compile_message, InstructionSet, SignerSet, TxPipelineError, TxPipelineResult,
};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::SIGNATURE_BYTES, signer::Signer};

fn short_vec_len(len: usize) -> usize {
    match len {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        _ => 3,
    }
}

/// Exact serialized size of the transaction `set` would build into
pub fn transaction_size(set: &InstructionSet, fee_payer: &Pubkey) -> usize {
    let message = compile_message(
        &set.instructions,
        &set.signer_pubkeys(),
        fee_payer,
        &Hash::default(),
    );
    let signatures = message.header.num_required_signatures as usize;
    short_vec_len(signatures) + signatures * SIGNATURE_BYTES + message.serialize().len()
}

/// Whether `set` fits in one transaction of at most `max_size` bytes
pub fn fits_in_transaction(set: &InstructionSet, fee_payer: &Pubkey, max_size: usize) -> bool {
    transaction_size(set, fee_payer) <= max_size
}

/// Greedily pack the instructions of `set`, in order, into as few sets as fit
/// under `max_size`.
///
/// Each resulting set carries the signers its instructions reference; signers
/// no instruction references travel with the first set.
pub fn split_instruction_set(
    set: &InstructionSet,
    fee_payer: &Pubkey,
    max_size: usize,
) -> TxPipelineResult<Vec<InstructionSet>> {
    if fits_in_transaction(set, fee_payer, max_size) {
        return Ok(vec![set.clone()]);
    }

    let mut chunks: Vec<InstructionSet> = Vec::new();
    let mut current = InstructionSet::default();
    for instruction in &set.instructions {
        let mut candidate = current.clone();
        candidate.instructions.push(instruction.clone());
        candidate.signers = signers_for(set, &candidate, chunks.is_empty());

        if fits_in_transaction(&candidate, fee_payer, max_size) {
            current = candidate;
            continue;
        }

        let single = InstructionSet {
            instructions: vec![instruction.clone()],
            signers: signers_for(
                set,
                &InstructionSet::new(vec![instruction.clone()], vec![]),
                chunks.is_empty() && current.is_empty(),
            ),
        };
        let size = transaction_size(&single, fee_payer);
        if size > max_size {
            return Err(TxPipelineError::TransactionTooLarge {
                size,
                max: max_size,
            });
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        current = single;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Signers of `source` that `chunk` needs
fn signers_for(
    source: &InstructionSet,
    chunk: &InstructionSet,
    is_first_chunk: bool,
) -> SignerSet {
    source
        .signers
        .iter()
        .filter(|signer| {
            let key = signer.pubkey();
            let referenced_here = chunk.instructions.iter().any(|ix| {
                ix.accounts
                    .iter()
                    .any(|meta| meta.pubkey == key && meta.is_signer)
            });
            let referenced_anywhere = source.instructions.iter().any(|ix| {
                ix.accounts
                    .iter()
                    .any(|meta| meta.pubkey == key && meta.is_signer)
            });
            referenced_here || (is_first_chunk && !referenced_anywhere)
        })
        .cloned()
        .collect()
}
