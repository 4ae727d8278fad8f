/*!
# Batch Sender

Builds one transaction per non-empty [`InstructionSet`] against a single
blockhash snapshot, asks the wallet to approve all of them at once, then
dispatches them according to a [`SequencePolicy`].
*/

use crate::{
    blockhash::fetch_blockhash_snapshot,
    build_transactions, non_empty_sets,
    sender::{send_signed_transaction, Confirmed, SubmissionResult},
    wallet::{connected_public_key, sign_all},
    BlockhashSnapshot, Connection, InstructionSet, SendError, SendOptions, TxPipelineError,
    TxPipelineResult, WalletSigner,
};
use futures::stream::{FuturesUnordered, StreamExt};
use solana_sdk::{signature::Signature, transaction::Transaction};
use tracing::{debug, info, warn};

/// How the transactions of a batch are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencePolicy {
    /// Everything at once, no early stop
    #[default]
    Parallel,
    /// One at a time, in order, regardless of failures
    Sequential,
    /// One at a time, in order, stopping at the first failure
    StopOnFailure,
}

impl SequencePolicy {
    /// Whether transactions go out one at a time in matrix order
    pub fn is_sequential(&self) -> bool {
        !matches!(self, SequencePolicy::Parallel)
    }
}

/// Outcome of one transaction in a batch
#[derive(Debug)]
pub struct TransactionReport {
    /// Position among the non-empty instruction sets
    pub index: usize,
    pub result: SubmissionResult,
}

/// Per-transaction results of a batch, ordered by index
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub reports: Vec<TransactionReport>,
    /// Index of the failure that stopped a sequential batch
    pub stopped_at: Option<usize>,
    /// Number of transactions built
    pub built: usize,
}

impl BatchOutcome {
    /// Where a follow-up attempt should resume: the stop index, or the number
    /// of transactions built when nothing stopped the batch
    pub fn resume_index(&self) -> usize {
        self.stopped_at.unwrap_or(self.built)
    }

    pub fn landed(&self) -> impl Iterator<Item = &Confirmed> {
        self.reports
            .iter()
            .filter_map(|report| report.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &SendError)> {
        self.reports
            .iter()
            .filter_map(|report| report.result.as_ref().err().map(|err| (report.index, err)))
    }

    pub fn signatures(&self) -> Vec<Signature> {
        self.landed().map(|confirmed| confirmed.signature).collect()
    }

    pub fn is_success(&self) -> bool {
        self.stopped_at.is_none() && self.reports.iter().all(|report| report.result.is_ok())
    }
}

/// Build, sign and dispatch one transaction per non-empty instruction set.
///
/// `on_success` and `on_failure` receive the index among the non-empty sets.
/// A `true` from `on_failure` stops a sequential batch the same way
/// [`SequencePolicy::StopOnFailure`] does; it is ignored for parallel batches.
#[allow(clippy::too_many_arguments)]
pub async fn send_transactions<C, W, S, F>(
    connection: &C,
    wallet: &W,
    sets: &[InstructionSet],
    policy: SequencePolicy,
    options: &SendOptions,
    block: Option<BlockhashSnapshot>,
    mut on_success: S,
    mut on_failure: F,
) -> TxPipelineResult<BatchOutcome>
where
    C: Connection + ?Sized,
    W: WalletSigner + ?Sized,
    S: FnMut(&Signature, usize),
    F: FnMut(&Transaction, &SendError, usize) -> bool,
{
    let fee_payer = connected_public_key(wallet)?;
    let sets = non_empty_sets(sets);
    if sets.is_empty() {
        debug!("No non-empty instruction sets to send");
        return Ok(BatchOutcome::default());
    }

    let block = match block {
        Some(block) => block,
        None => fetch_blockhash_snapshot(connection, options.commitment).await?,
    };
    let unsigned = build_transactions(&sets, &block.blockhash, &fee_payer)?;
    let transactions = sign_all(wallet, unsigned).await?;

    info!(
        "Sending {} transactions ({:?}) with blockhash {}",
        transactions.len(),
        policy,
        block.blockhash
    );

    let mut outcome = BatchOutcome {
        built: transactions.len(),
        ..Default::default()
    };

    if policy.is_sequential() {
        for (index, transaction) in transactions.iter().enumerate() {
            let result = send_signed_transaction(connection, transaction, options).await;
            let stop = report(transaction, index, &result, &mut on_success, &mut on_failure);
            let failed = result.is_err();
            outcome.reports.push(TransactionReport { index, result });

            if failed && (stop || policy == SequencePolicy::StopOnFailure) {
                warn!("Stopping batch at transaction {}", index);
                outcome.stopped_at = Some(index);
                break;
            }
        }
    } else {
        let mut in_flight: FuturesUnordered<_> = transactions
            .iter()
            .enumerate()
            .map(|(index, transaction)| async move {
                (
                    index,
                    send_signed_transaction(connection, transaction, options).await,
                )
            })
            .collect();

        while let Some((index, result)) = in_flight.next().await {
            report(&transactions[index], index, &result, &mut on_success, &mut on_failure);
            outcome.reports.push(TransactionReport { index, result });
        }
        outcome.reports.sort_by_key(|report| report.index);
    }

    info!(
        "Batch finished: {} landed, {} failed",
        outcome.landed().count(),
        outcome.failures().count()
    );
    Ok(outcome)
}

/// Invoke the matching callback; returns whether the caller asked to stop
fn report<S, F>(
    transaction: &Transaction,
    index: usize,
    result: &SubmissionResult,
    on_success: &mut S,
    on_failure: &mut F,
) -> bool
where
    S: FnMut(&Signature, usize),
    F: FnMut(&Transaction, &SendError, usize) -> bool,
{
    match result {
        Ok(confirmed) => {
            on_success(&confirmed.signature, index);
            false
        }
        Err(err) => {
            warn!("Transaction {} failed: {}", index, err);
            on_failure(transaction, err, index)
        }
    }
}

/// [`send_transactions`] over consecutive chunks of `chunk_size` sets, each
/// with its own blockhash snapshot and wallet approval.
///
/// Report indices, callback indices and the stop index are global positions
/// among the non-empty sets.
#[allow(clippy::too_many_arguments)]
pub async fn send_transactions_in_chunks<C, W, S, F>(
    connection: &C,
    wallet: &W,
    sets: &[InstructionSet],
    policy: SequencePolicy,
    options: &SendOptions,
    chunk_size: usize,
    mut on_success: S,
    mut on_failure: F,
) -> TxPipelineResult<BatchOutcome>
where
    C: Connection + ?Sized,
    W: WalletSigner + ?Sized,
    S: FnMut(&Signature, usize),
    F: FnMut(&Transaction, &SendError, usize) -> bool,
{
    if chunk_size == 0 {
        return Err(TxPipelineError::Config(
            "chunk size must be at least 1".to_string(),
        ));
    }
    connected_public_key(wallet)?;

    let sets = non_empty_sets(sets);
    let chunk_count = sets.len().div_ceil(chunk_size);
    let mut outcome = BatchOutcome::default();

    for (chunk_index, chunk) in sets.chunks(chunk_size).enumerate() {
        let offset = chunk_index * chunk_size;
        info!(
            "Sending chunk {} of {} ({} transactions)",
            chunk_index + 1,
            chunk_count,
            chunk.len()
        );

        let chunk_outcome = send_transactions(
            connection,
            wallet,
            chunk,
            policy,
            options,
            None,
            |signature: &Signature, index: usize| on_success(signature, offset + index),
            |transaction: &Transaction, err: &SendError, index: usize| {
                on_failure(transaction, err, offset + index)
            },
        )
        .await?;

        outcome.built += chunk_outcome.built;
        outcome
            .reports
            .extend(chunk_outcome.reports.into_iter().map(|report| TransactionReport {
                index: offset + report.index,
                result: report.result,
            }));
        if let Some(stop) = chunk_outcome.stopped_at {
            outcome.stopped_at = Some(offset + stop);
            break;
        }
    }

    Ok(outcome)
}

/// Result of [`send_transactions_with_manual_retry`]
#[derive(Debug, Default)]
pub struct ManualRetryOutcome {
    /// Transactions that landed, in submission order
    pub landed: Vec<Confirmed>,
    /// Instruction sets that never landed
    pub remaining: Vec<InstructionSet>,
    pub attempts: usize,
}

impl ManualRetryOutcome {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Resubmit with [`SequencePolicy::StopOnFailure`], slicing off the landed
/// prefix after every attempt.
///
/// Gives up once `max_stalled_attempts` consecutive attempts land nothing; a
/// failed attempt (for example a blockhash fetch error) counts as no progress.
pub async fn send_transactions_with_manual_retry<C, W>(
    connection: &C,
    wallet: &W,
    sets: &[InstructionSet],
    options: &SendOptions,
    max_stalled_attempts: usize,
) -> TxPipelineResult<ManualRetryOutcome>
where
    C: Connection + ?Sized,
    W: WalletSigner + ?Sized,
{
    connected_public_key(wallet)?;

    let mut outcome = ManualRetryOutcome {
        remaining: non_empty_sets(sets),
        ..Default::default()
    };
    let mut stalled = 0;

    while !outcome.remaining.is_empty() {
        outcome.attempts += 1;
        let before = outcome.remaining.len();

        match send_transactions(
            connection,
            wallet,
            &outcome.remaining,
            SequencePolicy::StopOnFailure,
            options,
            None,
            |_: &Signature, _: usize| {},
            |_: &Transaction, _: &SendError, _: usize| false,
        )
        .await
        {
            Ok(attempt) => {
                let resume = attempt.resume_index();
                outcome.landed.extend(attempt.landed().copied());
                outcome.remaining.drain(..resume);
            }
            Err(err) => warn!("Attempt {} failed: {}", outcome.attempts, err),
        }

        if outcome.remaining.len() < before {
            stalled = 0;
        } else {
            stalled += 1;
            debug!(
                "No progress on attempt {} ({} stalled)",
                outcome.attempts, stalled
            );
            if stalled >= max_stalled_attempts {
                warn!(
                    "Giving up with {} transactions remaining after {} attempts",
                    outcome.remaining.len(),
                    outcome.attempts
                );
                break;
            }
        }
    }

    Ok(outcome)
}
