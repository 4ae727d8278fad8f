/*!
# Transaction Builder

Turns an [`InstructionSet`] into a partially signed [`Transaction`]. Building
never touches the network: the caller supplies the blockhash.

The required-signer section of the message is always the fee payer followed by
every key of the signer set, even when no instruction marks that key as a
signer. Local keypairs sign immediately; the fee payer slot is left for the
wallet.
*/

use crate::{TxPipelineError, TxPipelineResult};
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::Transaction,
};
use std::sync::Arc;

/// Keypairs that must co-sign a transaction, excluding the fee payer
pub type SignerSet = Vec<Arc<Keypair>>;

/// Instructions that belong in one transaction, with their co-signers
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    pub instructions: Vec<Instruction>,
    pub signers: SignerSet,
}

impl InstructionSet {
    pub fn new(instructions: Vec<Instruction>, signers: SignerSet) -> Self {
        Self {
            instructions,
            signers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn signer_pubkeys(&self) -> Vec<Pubkey> {
        self.signers.iter().map(|signer| signer.pubkey()).collect()
    }
}

/// Pair parallel instruction and signer lists into a matrix
pub fn instruction_matrix(
    instructions: Vec<Vec<Instruction>>,
    signers: Vec<SignerSet>,
) -> TxPipelineResult<Vec<InstructionSet>> {
    if instructions.len() != signers.len() {
        return Err(TxPipelineError::Config(format!(
            "{} instruction sets but {} signer sets",
            instructions.len(),
            signers.len()
        )));
    }
    Ok(instructions
        .into_iter()
        .zip(signers)
        .map(|(instructions, signers)| InstructionSet::new(instructions, signers))
        .collect())
}

/// Drop sets without instructions, keeping the relative order of the rest
pub fn non_empty_sets(sets: &[InstructionSet]) -> Vec<InstructionSet> {
    sets.iter().filter(|set| !set.is_empty()).cloned().collect()
}

/// Required signers of a transaction, fee payer first
pub fn required_signers(transaction: &Transaction) -> &[Pubkey] {
    let count = transaction.message.header.num_required_signatures as usize;
    &transaction.message.account_keys[..count]
}

/// Compile `instructions` and promote every key in `signers` to a required signer
pub(crate) fn compile_message(
    instructions: &[Instruction],
    signers: &[Pubkey],
    fee_payer: &Pubkey,
    blockhash: &Hash,
) -> Message {
    let mut message = Message::new_with_blockhash(instructions, Some(fee_payer), blockhash);
    for signer in signers {
        promote_to_signer(&mut message, signer);
    }
    message
}

/// Move `key` into the signer section, keeping its writability and every
/// compiled instruction's account indices consistent
fn promote_to_signer(message: &mut Message, key: &Pubkey) {
    let num_signers = message.header.num_required_signatures as usize;
    let existing = message.account_keys.iter().position(|k| k == key);
    if matches!(existing, Some(index) if index < num_signers) {
        return;
    }

    let old_keys = message.account_keys.clone();
    let writable = match existing {
        Some(index) => {
            let readonly_start =
                old_keys.len() - message.header.num_readonly_unsigned_accounts as usize;
            let writable = index < readonly_start;
            if !writable {
                message.header.num_readonly_unsigned_accounts -= 1;
            }
            message.account_keys.remove(index);
            writable
        }
        None => false,
    };

    let position = if writable {
        num_signers - message.header.num_readonly_signed_accounts as usize
    } else {
        message.header.num_readonly_signed_accounts += 1;
        num_signers
    };
    message.account_keys.insert(position, *key);
    message.header.num_required_signatures += 1;

    let new_keys = &message.account_keys;
    let remap = |index: u8| -> u8 {
        let key = &old_keys[index as usize];
        new_keys
            .iter()
            .position(|k| k == key)
            .map(|new_index| new_index as u8)
            .unwrap_or(index)
    };
    for instruction in message.instructions.iter_mut() {
        instruction.program_id_index = remap(instruction.program_id_index);
        for account in instruction.accounts.iter_mut() {
            *account = remap(*account);
        }
    }
}

/// Build a transaction for `set`, partially signed by its local keypairs.
///
/// With `includes_fee_payer` the first key of the signer set pays the fee and
/// the result is fully signed; otherwise `fee_payer` (the wallet) still has to
/// sign.
pub fn build_transaction(
    set: &InstructionSet,
    blockhash: &Hash,
    fee_payer: &Pubkey,
    includes_fee_payer: bool,
) -> TxPipelineResult<Transaction> {
    if set.is_empty() {
        return Err(TxPipelineError::NoInstructions);
    }

    let payer = if includes_fee_payer {
        set.signers
            .first()
            .map(|signer| signer.pubkey())
            .ok_or(TxPipelineError::NoFeePayer)?
    } else {
        *fee_payer
    };

    let message = compile_message(&set.instructions, &set.signer_pubkeys(), &payer, blockhash);
    let mut transaction = Transaction::new_unsigned(message);
    if !set.signers.is_empty() {
        let keypairs: Vec<&Keypair> = set.signers.iter().map(|signer| signer.as_ref()).collect();
        transaction.try_partial_sign(&keypairs, *blockhash)?;
    }
    Ok(transaction)
}

/// Build one transaction per non-empty set against the same blockhash
pub fn build_transactions(
    sets: &[InstructionSet],
    blockhash: &Hash,
    fee_payer: &Pubkey,
) -> TxPipelineResult<Vec<Transaction>> {
    sets.iter()
        .filter(|set| !set.is_empty())
        .map(|set| build_transaction(set, blockhash, fee_payer, false))
        .collect()
}
