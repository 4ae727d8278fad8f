/*!
# Single-Transaction Sender

Submits one signed transaction and follows it to a terminal outcome.

The transaction is sent once without preflight and then re-broadcast, byte for
byte, on a fixed interval while confirmation is pending. Confirmation races a
signature subscription against periodic status polling; whichever resolves
first decides the outcome and the other is dropped. The whole race is bounded
by the configured timeout.
*/

use crate::{
    blockhash::fetch_blockhash_snapshot,
    build_transaction,
    logs::{get_error_for_transaction, last_program_log},
    wallet::connected_public_key,
    BlockhashSnapshot, Connection, InstructionSet, SendError, SendOptions,
    SignatureConfirmation, TxPipelineError, TxPipelineResult, WalletSigner,
};
use solana_sdk::{signature::Signature, transaction::Transaction};
use std::{future::pending, time::Duration};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, warn};

/// A transaction that landed, with the slot it was confirmed in (0 if unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmed {
    pub signature: Signature,
    pub slot: u64,
}

/// Terminal outcome of one submission
pub type SubmissionResult = Result<Confirmed, SendError>;

/// Hook run right before a transaction is broadcast
pub type BeforeSend = Box<dyn FnOnce() + Send>;

/// Submit a fully signed transaction, re-broadcasting it until it confirms,
/// fails on chain, or `options.timeout` elapses.
pub async fn send_signed_transaction<C: Connection + ?Sized>(
    connection: &C,
    transaction: &Transaction,
    options: &SendOptions,
) -> SubmissionResult {
    let signature = connection.send_transaction(transaction).await?;
    let deadline = Instant::now() + options.timeout;
    debug!("Started awaiting confirmation for {}", signature);

    let confirmation = tokio::select! {
        confirmation = confirm_signature(connection, &signature, options) => confirmation,
        () = rebroadcast_until(connection, transaction, &signature, options.resubmit_interval, deadline) => {
            warn!("Timed out awaiting confirmation on transaction {}", signature);
            return Err(SendError::Timeout { signature });
        }
    };

    if let Some(err) = confirmation.err {
        let message = match connection
            .simulate_transaction(transaction, options.commitment)
            .await
        {
            Ok(simulation) => last_program_log(&simulation.logs).map(str::to_string),
            Err(sim_err) => {
                debug!("Simulation of failed transaction {} errored: {}", signature, sim_err);
                None
            }
        };
        warn!("Transaction {} failed on chain: {:?}", signature, err);
        return Err(SendError::OnChain {
            signature,
            error: Some(err),
            message,
        });
    }

    debug!("Transaction {} landed at slot {}", signature, confirmation.slot);
    Ok(Confirmed {
        signature,
        slot: confirmation.slot,
    })
}

/// Re-broadcast `transaction` every `interval`, resolving at `deadline`
async fn rebroadcast_until<C: Connection + ?Sized>(
    connection: &C,
    transaction: &Transaction,
    signature: &Signature,
    interval: Duration,
    deadline: Instant,
) {
    loop {
        let next = Instant::now() + interval;
        if next >= deadline {
            sleep_until(deadline).await;
            return;
        }
        sleep_until(next).await;
        if let Err(err) = connection.send_transaction(transaction).await {
            debug!("Re-broadcast of {} failed: {}", signature, err);
        }
    }
}

/// First of the subscription notification and a conclusive status poll
pub(crate) async fn confirm_signature<C: Connection + ?Sized>(
    connection: &C,
    signature: &Signature,
    options: &SendOptions,
) -> SignatureConfirmation {
    let subscription = async {
        match connection
            .wait_for_signature(signature, options.commitment)
            .await
        {
            Ok(confirmation) => confirmation,
            Err(err) => {
                debug!("Signature subscription for {} failed: {}", signature, err);
                pending().await
            }
        }
    };

    let polling = async {
        loop {
            sleep(options.status_poll_interval).await;
            match connection
                .get_signature_statuses(std::slice::from_ref(signature))
                .await
            {
                Ok(statuses) => {
                    if let Some(Some(status)) = statuses.into_iter().next() {
                        if status.err.is_some() || status.is_confirmed() {
                            return SignatureConfirmation {
                                slot: status.slot,
                                err: status.err,
                            };
                        }
                        debug!("Transaction {} not yet confirmed", signature);
                    }
                }
                Err(err) => debug!("Status poll for {} failed: {}", signature, err),
            }
        }
    };

    tokio::select! {
        confirmation = subscription => confirmation,
        confirmation = polling => confirmation,
    }
}

/// Build and sign one logical action, submit it once and optionally wait for
/// its confirmation.
///
/// On-chain failures carry every `Error: ...` reason the program logged.
pub async fn send_transaction<C, W>(
    connection: &C,
    wallet: &W,
    set: &InstructionSet,
    options: &SendOptions,
    await_confirmation: bool,
    includes_fee_payer: bool,
    block: Option<BlockhashSnapshot>,
) -> TxPipelineResult<Confirmed>
where
    C: Connection + ?Sized,
    W: WalletSigner + ?Sized,
{
    let transaction =
        prepare_transaction(connection, wallet, set, options, includes_fee_payer, block).await?;

    let signature = connection
        .send_transaction(&transaction)
        .await
        .map_err(SendError::from)?;
    if !await_confirmation {
        return Ok(Confirmed { signature, slot: 0 });
    }

    let confirmation = timeout(
        options.timeout,
        confirm_signature(connection, &signature, options),
    )
    .await
    .map_err(|_| SendError::Timeout { signature })?;

    if let Some(err) = confirmation.err {
        let reasons = get_error_for_transaction(connection, &signature, options.commitment)
            .await
            .unwrap_or_else(|log_err| {
                debug!("Could not fetch logs for {}: {}", signature, log_err);
                Vec::new()
            });
        let message = (!reasons.is_empty()).then(|| reasons.join(", "));
        return Err(SendError::OnChain {
            signature,
            error: Some(err),
            message,
        }
        .into());
    }

    Ok(Confirmed {
        signature,
        slot: confirmation.slot,
    })
}

/// Build and sign one logical action, run `before_send`, then hand it to
/// [`send_signed_transaction`].
pub async fn send_transaction_with_retry<C, W>(
    connection: &C,
    wallet: &W,
    set: &InstructionSet,
    options: &SendOptions,
    includes_fee_payer: bool,
    block: Option<BlockhashSnapshot>,
    before_send: Option<BeforeSend>,
) -> TxPipelineResult<Confirmed>
where
    C: Connection + ?Sized,
    W: WalletSigner + ?Sized,
{
    let transaction =
        prepare_transaction(connection, wallet, set, options, includes_fee_payer, block).await?;
    if let Some(hook) = before_send {
        hook();
    }
    Ok(send_signed_transaction(connection, &transaction, options).await?)
}

async fn prepare_transaction<C, W>(
    connection: &C,
    wallet: &W,
    set: &InstructionSet,
    options: &SendOptions,
    includes_fee_payer: bool,
    block: Option<BlockhashSnapshot>,
) -> TxPipelineResult<Transaction>
where
    C: Connection + ?Sized,
    W: WalletSigner + ?Sized,
{
    let fee_payer = connected_public_key(wallet)?;
    if set.is_empty() {
        return Err(TxPipelineError::NoInstructions);
    }

    let block = match block {
        Some(block) => block,
        None => fetch_blockhash_snapshot(connection, options.commitment).await?,
    };
    let transaction = build_transaction(set, &block.blockhash, &fee_payer, includes_fee_payer)?;
    if includes_fee_payer {
        return Ok(transaction);
    }
    Ok(wallet.sign_transaction(transaction).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::MockConnection, wallet::MockWalletSigner, ConnectionError, FailureKind,
        KeypairWallet, SignatureStatus, SimulationOutcome,
    };
    use solana_sdk::{
        hash::Hash,
        instruction::{Instruction, InstructionError},
        message::Message,
        pubkey::Pubkey,
        signature::Keypair,
        signer::Signer,
        transaction::TransactionError,
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn signed_transaction() -> Transaction {
        let payer = Keypair::new();
        let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![]);
        let message = Message::new_with_blockhash(&[ix], Some(&payer.pubkey()), &Hash::new_unique());
        let mut tx = Transaction::new_unsigned(message);
        tx.sign(&[&payer], tx.message.recent_blockhash);
        tx
    }

    fn never_notified(connection: &mut MockConnection) {
        connection
            .expect_wait_for_signature()
            .returning(|_, _| Box::pin(pending::<Result<SignatureConfirmation, ConnectionError>>()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lands_through_status_polling() {
        let tx = signed_transaction();
        let signature = tx.signatures[0];
        let mut connection = MockConnection::new();
        connection
            .expect_send_transaction()
            .returning(move |_| Box::pin(async move { Ok(signature) }));
        never_notified(&mut connection);
        connection.expect_get_signature_statuses().returning(|_| {
            Box::pin(async {
                Ok(vec![Some(SignatureStatus {
                    slot: 77,
                    confirmations: Some(1),
                    err: None,
                })])
            })
        });

        let confirmed = send_signed_transaction(&connection, &tx, &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(confirmed, Confirmed { signature, slot: 77 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_chain_failure_surfaces_last_program_log() {
        let tx = signed_transaction();
        let signature = tx.signatures[0];
        let mut connection = MockConnection::new();
        connection
            .expect_send_transaction()
            .returning(move |_| Box::pin(async move { Ok(signature) }));
        connection.expect_wait_for_signature().returning(|_, _| {
            Box::pin(async {
                Ok(SignatureConfirmation {
                    slot: 12,
                    err: Some(TransactionError::InstructionError(
                        0,
                        InstructionError::Custom(1),
                    )),
                })
            })
        });
        connection
            .expect_get_signature_statuses()
            .returning(|_| Box::pin(async { Ok(vec![None]) }));
        connection.expect_simulate_transaction().times(1).returning(|_, _| {
            Box::pin(async {
                Ok(SimulationOutcome {
                    err: None,
                    logs: vec![
                        "Program log: Instruction: Redeem".to_string(),
                        "Program log: Vault is not active".to_string(),
                        "Program failed".to_string(),
                    ],
                })
            })
        });

        let err = send_signed_transaction(&connection, &tx, &SendOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::OnChain);
        match err {
            SendError::OnChain { message, .. } => {
                assert_eq!(message.as_deref(), Some("Vault is not active"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_and_keeps_rebroadcasting() {
        let tx = signed_transaction();
        let signature = tx.signatures[0];
        let sends = Arc::new(AtomicUsize::new(0));
        let counter = sends.clone();

        let mut connection = MockConnection::new();
        connection.expect_send_transaction().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(signature) })
        });
        never_notified(&mut connection);
        connection
            .expect_get_signature_statuses()
            .returning(|_| Box::pin(async { Ok(vec![None]) }));

        let err = send_signed_transaction(&connection, &tx, &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Timeout { signature: s } if s == signature));
        assert!(sends.load(Ordering::SeqCst) > 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebroadcast_errors_are_swallowed() {
        let tx = signed_transaction();
        let signature = tx.signatures[0];
        let sends = Arc::new(AtomicUsize::new(0));
        let counter = sends.clone();

        let mut connection = MockConnection::new();
        connection.expect_send_transaction().returning(move |_| {
            let result = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(signature)
            } else {
                Err(ConnectionError::UnexpectedResponse("node busy".to_string()))
            };
            Box::pin(async move { result })
        });
        never_notified(&mut connection);
        let polls = Arc::new(AtomicUsize::new(0));
        let poll_counter = polls.clone();
        connection.expect_get_signature_statuses().returning(move |_| {
            let landed = poll_counter.fetch_add(1, Ordering::SeqCst) >= 2;
            Box::pin(async move {
                Ok(vec![landed.then_some(SignatureStatus {
                    slot: 5,
                    confirmations: None,
                    err: None,
                })])
            })
        });

        let confirmed = send_signed_transaction(&connection, &tx, &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(confirmed.slot, 5);
        assert!(sends.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_initial_send_failure_is_transport() {
        let tx = signed_transaction();
        let mut connection = MockConnection::new();
        connection.expect_send_transaction().returning(|_| {
            Box::pin(async { Err(ConnectionError::UnexpectedResponse("refused".to_string())) })
        });

        let err = send_signed_transaction(&connection, &tx, &SendOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(err.signature().is_none());
    }

    #[tokio::test]
    async fn test_send_transaction_requires_connected_wallet() {
        let connection = MockConnection::new();
        let wallet = KeypairWallet::disconnected();
        let set = InstructionSet::new(
            vec![Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![])],
            vec![],
        );

        let result = send_transaction(
            &connection,
            &wallet,
            &set,
            &SendOptions::default(),
            true,
            false,
            None,
        )
        .await;
        assert!(matches!(result, Err(TxPipelineError::WalletNotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_transaction_decodes_program_errors() {
        let payer = Keypair::new();
        let payer_key = payer.pubkey();
        let wallet = KeypairWallet::new(payer);
        let set = InstructionSet::new(
            vec![Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![])],
            vec![],
        );
        let block = BlockhashSnapshot::new(Hash::new_unique(), 100);

        let mut connection = MockConnection::new();
        connection
            .expect_send_transaction()
            .times(1)
            .returning(move |tx| {
                assert_eq!(tx.message.account_keys[0], payer_key);
                assert!(tx.is_signed());
                let signature = tx.signatures[0];
                Box::pin(async move { Ok(signature) })
            });
        connection.expect_wait_for_signature().returning(|_, _| {
            Box::pin(async {
                Ok(SignatureConfirmation {
                    slot: 101,
                    err: Some(TransactionError::InstructionError(
                        0,
                        InstructionError::Custom(6001),
                    )),
                })
            })
        });
        connection
            .expect_get_signature_statuses()
            .returning(|_| Box::pin(async { Ok(vec![None]) }));
        connection.expect_get_transaction_logs().returning(|_, _| {
            Box::pin(async {
                Ok(Some(vec![
                    "Program log: Error: Reserve not met".to_string(),
                    "Program log: Error: Auction still running".to_string(),
                ]))
            })
        });

        let result = send_transaction(
            &connection,
            &wallet,
            &set,
            &SendOptions::default(),
            true,
            false,
            Some(block),
        )
        .await;
        match result {
            Err(TxPipelineError::Send(SendError::OnChain { message, .. })) => assert_eq!(
                message.as_deref(),
                Some("Reserve not met, Auction still running")
            ),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_transaction_without_awaiting_returns_slot_zero() {
        let set = InstructionSet::new(
            vec![Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![])],
            vec![],
        );
        let mut wallet = MockWalletSigner::new();
        wallet
            .expect_public_key()
            .returning(|| Some(Pubkey::new_unique()));
        wallet
            .expect_sign_transaction()
            .times(1)
            .returning(|tx| Box::pin(async move { Ok(tx) }));

        let signature = Signature::new_unique();
        let mut connection = MockConnection::new();
        connection
            .expect_send_transaction()
            .times(1)
            .returning(move |_| Box::pin(async move { Ok(signature) }));

        let confirmed = send_transaction(
            &connection,
            &wallet,
            &set,
            &SendOptions::default(),
            false,
            false,
            Some(BlockhashSnapshot::new(Hash::new_unique(), 1)),
        )
        .await
        .unwrap();
        assert_eq!(confirmed, Confirmed { signature, slot: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_before_send_runs_once_before_broadcast() {
        let payer = Keypair::new();
        let wallet = KeypairWallet::new(payer);
        let set = InstructionSet::new(
            vec![Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![])],
            vec![],
        );
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let hook_counter = hook_calls.clone();
        let observed = hook_calls.clone();

        let mut connection = MockConnection::new();
        connection.expect_send_transaction().returning(move |tx| {
            assert_eq!(observed.load(Ordering::SeqCst), 1);
            let signature = tx.signatures[0];
            Box::pin(async move { Ok(signature) })
        });
        connection.expect_wait_for_signature().returning(|_, _| {
            Box::pin(async { Ok(SignatureConfirmation { slot: 9, err: None }) })
        });
        connection
            .expect_get_signature_statuses()
            .returning(|_| Box::pin(async { Ok(vec![None]) }));

        let confirmed = send_transaction_with_retry(
            &connection,
            &wallet,
            &set,
            &SendOptions::default(),
            false,
            Some(BlockhashSnapshot::new(Hash::new_unique(), 1)),
            Some(Box::new(move || {
                hook_counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();
        assert_eq!(confirmed.slot, 9);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }
}
