/*!
# Smart Instruction Sender

Sends a long sequence of instruction sets one transaction at a time and keeps
the sequence alive across blockhash expiry.

All transactions are built and signed up front against one snapshot. Whenever
the chain is observed at or past the end of that snapshot's validity window
(after a landing, or before retrying a transient failure) a fresh snapshot is
fetched and every transaction not yet landed is rebuilt and re-signed in a
single wallet approval. A retry after `BlockhashNotFound` is always rebuilt,
whatever the slot.

Progress is reported as a stream of [`SmartSendEvent`]s. The work runs on a
spawned task; dropping the stream stops it at its next event.
*/

use crate::{
    blockhash::fetch_blockhash_snapshot,
    build_transactions, non_empty_sets,
    sender::send_signed_transaction,
    wallet::{connected_public_key, sign_all},
    BlockhashSnapshot, Connection, InstructionSet, SendError, SmartSendOptions, TxPipelineError,
    TxPipelineResult, WalletSigner,
};
use backoff::backoff::Backoff;
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    Stream, StreamExt,
};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::Transaction};
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::{debug, info, warn};

/// Everything one smart send needs; consumed by [`send_smart`]
pub struct SmartSendConfig<C: ?Sized, W: ?Sized> {
    pub connection: Arc<C>,
    pub wallet: Arc<W>,
    pub instruction_sets: Vec<InstructionSet>,
    pub options: SmartSendOptions,
}

#[derive(Debug)]
pub enum SmartSendEvent {
    /// Transaction `index` landed
    Progress {
        index: usize,
        signature: Signature,
        slot: u64,
    },
    /// Transactions from `index` on were rebuilt against a fresh blockhash;
    /// `attempt` is 0 when triggered by a landing
    ReSign { attempt: usize, index: usize },
    /// Transaction `index` was given up on
    Failure {
        error: SendError,
        successful: usize,
        index: usize,
        instruction_set: InstructionSet,
    },
    Finished { successful: usize, attempted: usize },
    /// The sequence could not continue past `index`
    Aborted {
        error: TxPipelineError,
        index: usize,
    },
}

/// Stream of [`SmartSendEvent`]s produced by [`send_smart`]
pub struct SmartSendEvents {
    receiver: UnboundedReceiver<SmartSendEvent>,
}

impl Stream for SmartSendEvents {
    type Item = SmartSendEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

/// Start a smart send on the current Tokio runtime.
///
/// Fails before any network call when the wallet is not connected, every
/// instruction set is empty, or the attempt limit is zero.
pub fn send_smart<C, W>(config: SmartSendConfig<C, W>) -> TxPipelineResult<SmartSendEvents>
where
    C: Connection + ?Sized + 'static,
    W: WalletSigner + ?Sized + 'static,
{
    let fee_payer = connected_public_key(config.wallet.as_ref())?;
    let sets = non_empty_sets(&config.instruction_sets);
    if sets.is_empty() {
        return Err(TxPipelineError::NoInstructions);
    }
    if config.options.max_signing_attempts == 0 {
        return Err(TxPipelineError::Config(
            "max_signing_attempts must be at least 1".to_string(),
        ));
    }

    let (events, receiver) = unbounded();
    let mut sender = SmartSender {
        connection: config.connection,
        wallet: config.wallet,
        sets,
        fee_payer,
        options: config.options,
        events,
    };
    tokio::spawn(async move { sender.run().await });

    Ok(SmartSendEvents { receiver })
}

/// Why the sequence stopped early
enum Halt {
    Disconnected,
    Fatal { error: TxPipelineError, index: usize },
}

struct SmartSender<C: ?Sized, W: ?Sized> {
    connection: Arc<C>,
    wallet: Arc<W>,
    sets: Vec<InstructionSet>,
    fee_payer: Pubkey,
    options: SmartSendOptions,
    events: UnboundedSender<SmartSendEvent>,
}

impl<C, W> SmartSender<C, W>
where
    C: Connection + ?Sized,
    W: WalletSigner + ?Sized,
{
    async fn run(&mut self) {
        match self.drive().await {
            Ok(()) => {}
            Err(Halt::Disconnected) => debug!("Event stream dropped, stopping smart send"),
            Err(Halt::Fatal { error, index }) => {
                warn!("Smart send aborted at transaction {}: {}", index, error);
                let _ = self.events.unbounded_send(SmartSendEvent::Aborted { error, index });
            }
        }
    }

    async fn drive(&mut self) -> Result<(), Halt> {
        let total = self.sets.len();
        let commitment = self.options.send.commitment;

        let mut block = self.fresh_snapshot(0).await?;
        let mut transactions = self.sign_from(0, &block).await?;
        let mut successful = 0;
        let mut attempted = 0;

        info!("Smart sending {} transactions", total);

        for index in 0..total {
            attempted += 1;
            let mut backoff = self.options.retry_backoff();
            let mut attempt = 0;

            loop {
                attempt += 1;
                let result = send_signed_transaction(
                    self.connection.as_ref(),
                    &transactions[index],
                    &self.options.send,
                )
                .await;

                match result {
                    Ok(confirmed) => {
                        successful += 1;
                        self.emit(SmartSendEvent::Progress {
                            index,
                            signature: confirmed.signature,
                            slot: confirmed.slot,
                        })?;

                        let next = index + 1;
                        if next < total && block.is_stale_at(confirmed.slot) {
                            info!(
                                "Landed at slot {} past blockhash window of slot {}, re-signing",
                                confirmed.slot, block.slot
                            );
                            block = self.fresh_snapshot(next).await?;
                            self.emit(SmartSendEvent::ReSign {
                                attempt: 0,
                                index: next,
                            })?;
                            transactions.truncate(next);
                            transactions.extend(self.sign_from(next, &block).await?);
                        }
                        break;
                    }
                    Err(error) if error.is_transient() && attempt < self.options.max_signing_attempts => {
                        let delay = backoff
                            .next_backoff()
                            .unwrap_or(self.options.retry_max_interval);
                        warn!(
                            "Transaction {} attempt {} failed, retrying in {:?}: {}",
                            index, attempt, delay, error
                        );
                        tokio::time::sleep(delay).await;

                        let slot = self
                            .connection
                            .get_slot(commitment)
                            .await
                            .map_err(|err| Halt::fatal(err, index))?;
                        if error.is_expired_blockhash() || block.is_stale_at(slot) {
                            block = self.fresh_snapshot(index).await?;
                            self.emit(SmartSendEvent::ReSign { attempt, index })?;
                            transactions.truncate(index);
                            transactions.extend(self.sign_from(index, &block).await?);
                        }
                    }
                    Err(error) => {
                        warn!("Giving up on transaction {}: {}", index, error);
                        self.emit(SmartSendEvent::Failure {
                            error,
                            successful,
                            index,
                            instruction_set: self.sets[index].clone(),
                        })?;
                        if self.options.abort_on_failure {
                            return self.emit(SmartSendEvent::Finished {
                                successful,
                                attempted,
                            });
                        }
                        break;
                    }
                }
            }
        }

        info!("Smart send finished: {}/{} landed", successful, attempted);
        self.emit(SmartSendEvent::Finished {
            successful,
            attempted,
        })
    }

    async fn fresh_snapshot(&self, index: usize) -> Result<BlockhashSnapshot, Halt> {
        fetch_blockhash_snapshot(self.connection.as_ref(), self.options.send.commitment)
            .await
            .map_err(|err| Halt::fatal(err, index))
    }

    /// Build and sign the transactions for sets `start..`
    async fn sign_from(
        &self,
        start: usize,
        block: &BlockhashSnapshot,
    ) -> Result<Vec<Transaction>, Halt> {
        let unsigned = build_transactions(&self.sets[start..], &block.blockhash, &self.fee_payer)
            .map_err(|err| Halt::fatal(err, start))?;
        sign_all(self.wallet.as_ref(), unsigned)
            .await
            .map_err(|err| Halt::fatal(err, start))
    }

    fn emit(&self, event: SmartSendEvent) -> Result<(), Halt> {
        self.events
            .unbounded_send(event)
            .map_err(|_| Halt::Disconnected)
    }
}

impl Halt {
    fn fatal(error: impl Into<TxPipelineError>, index: usize) -> Self {
        Halt::Fatal {
            error: error.into(),
            index,
        }
    }
}
