use futures::StreamExt;
use metaplex_tx_batch::{SendError, SmartSendEvent, TxPipelineConfig};
use metaplex_tx_testing::{program_error_logs, tagged, ScriptedOutcome, TestFixture};
use solana_sdk::{instruction::InstructionError, transaction::TransactionError};

fn rejected() -> ScriptedOutcome {
    ScriptedOutcome::OnChain {
        error: TransactionError::InstructionError(0, InstructionError::Custom(3)),
        logs: program_error_logs("Bid below reserve"),
    }
}

/// Test a permanent failure is reported and the sequence moves on
///
/// **What this tests:**
/// - An on-chain instruction error is not retried
/// - `Failure` carries the error, the success count so far and the failed set
/// - Later transactions still go out and `Finished` counts both outcomes
#[tokio::test(start_paused = true)]
async fn test_permanent_failure_continues() {
    let test = TestFixture::default();
    test.chain.script(101, rejected());
    let failed_set = tagged(101);

    let events: Vec<_> = test
        .client
        .send_smart(vec![tagged(100), failed_set.clone(), tagged(102)])
        .expect("smart send should start")
        .collect()
        .await;

    assert_eq!(events.len(), 4, "unexpected events: {events:?}");
    match &events[1] {
        SmartSendEvent::Failure {
            error,
            successful,
            index,
            instruction_set,
        } => {
            assert!(matches!(error, SendError::OnChain { .. }));
            assert!(!error.is_transient());
            assert_eq!(*successful, 1);
            assert_eq!(*index, 1);
            assert_eq!(instruction_set.instructions, failed_set.instructions);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(events[2], SmartSendEvent::Progress { index: 2, .. }));
    assert!(matches!(
        events[3],
        SmartSendEvent::Finished {
            successful: 2,
            attempted: 3
        }
    ));
    assert_eq!(test.chain.submitted_tags(), vec![100, 101, 102]);
}

/// Test abort_on_failure ends the sequence at the first failure
#[tokio::test(start_paused = true)]
async fn test_abort_on_failure_stops_sequence() {
    let test = TestFixture::with_config(TxPipelineConfig {
        abort_on_failure: true,
        ..Default::default()
    });
    test.chain.script(111, rejected());

    let events: Vec<_> = test
        .client
        .send_smart(vec![tagged(110), tagged(111), tagged(112)])
        .expect("smart send should start")
        .collect()
        .await;

    assert_eq!(events.len(), 3, "unexpected events: {events:?}");
    assert!(matches!(events[1], SmartSendEvent::Failure { index: 1, .. }));
    assert!(matches!(
        events[2],
        SmartSendEvent::Finished {
            successful: 1,
            attempted: 2
        }
    ));
    assert_eq!(test.chain.submitted_tags(), vec![110, 111]);
}

/// Test a transient failure is retried with the same signature while the
/// blockhash is still valid
#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let test = TestFixture::default();
    test.chain.script(
        121,
        ScriptedOutcome::FailTimes {
            times: 2,
            error: TransactionError::AccountInUse,
        },
    );

    let events: Vec<_> = test
        .client
        .send_smart(vec![tagged(120), tagged(121)])
        .expect("smart send should start")
        .collect()
        .await;

    assert_eq!(events.len(), 3, "unexpected events: {events:?}");
    assert!(matches!(events[1], SmartSendEvent::Progress { index: 1, .. }));
    assert_eq!(test.wallet.batch_sizes(), vec![2]);
    // three attempts of one signed transaction
    assert_eq!(test.chain.distinct_submissions().len(), 2);
    let retried = test.chain.distinct_submissions()[1].signature;
    assert!(test.chain.submission_count(&retried) >= 3);
}

/// Test transient failures give up after the configured number of attempts
#[tokio::test(start_paused = true)]
async fn test_transient_failure_exhausts_attempts() {
    let test = TestFixture::default();
    test.chain.script(131, ScriptedOutcome::Drop);

    let events: Vec<_> = test
        .client
        .send_smart(vec![tagged(130), tagged(131), tagged(132)])
        .expect("smart send should start")
        .collect()
        .await;

    assert_eq!(events.len(), 4, "unexpected events: {events:?}");
    match &events[1] {
        SmartSendEvent::Failure { error, index, .. } => {
            assert!(matches!(error, SendError::Timeout { .. }));
            assert_eq!(*index, 1);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(events[2], SmartSendEvent::Progress { index: 2, .. }));
}

/// Test an expired blockhash detected before a retry re-signs from the
/// failing transaction
///
/// **What this tests:**
/// - First attempt of transaction 1 fails with BlockhashNotFound while the
///   chain moves past the snapshot's window
/// - The slot check before retrying triggers `ReSign { attempt: 1, index: 1 }`
/// - The retry goes out with the fresh blockhash and lands
#[tokio::test(start_paused = true)]
async fn test_expired_blockhash_resigns_before_retry() {
    let test = TestFixture::default();
    test.chain.script(141, ScriptedOutcome::ExpireAt(1_200));

    let events: Vec<_> = test
        .client
        .send_smart(vec![tagged(140), tagged(141), tagged(142)])
        .expect("smart send should start")
        .collect()
        .await;

    assert_eq!(events.len(), 5, "unexpected events: {events:?}");
    assert!(matches!(events[0], SmartSendEvent::Progress { index: 0, .. }));
    assert!(matches!(
        events[1],
        SmartSendEvent::ReSign {
            attempt: 1,
            index: 1
        }
    ));
    assert!(matches!(events[2], SmartSendEvent::Progress { index: 1, .. }));
    assert!(matches!(events[3], SmartSendEvent::Progress { index: 2, .. }));
    assert_eq!(test.wallet.batch_sizes(), vec![3, 2]);

    let blockhashes = test.chain.blockhash_fetches();
    let tx_141: Vec<_> = test
        .chain
        .distinct_submissions()
        .into_iter()
        .filter(|s| s.tag == 141)
        .collect();
    assert_eq!(tx_141.len(), 2);
    assert_eq!(tx_141[0].blockhash, blockhashes[0]);
    assert_eq!(tx_141[1].blockhash, blockhashes[1]);
}

/// Test a blockhash the cluster has dropped is replaced even inside the window
///
/// **What this tests:**
/// - Transaction 1 fails once with BlockhashNotFound while the chain stays
///   at the snapshot's slot
/// - The retry fetches a fresh blockhash and emits `ReSign { attempt: 1, index: 1 }`
/// - The retried transaction is a new signature built on the new blockhash
#[tokio::test(start_paused = true)]
async fn test_blockhash_not_found_resigns_inside_window() {
    let test = TestFixture::default();
    test.chain.script(
        171,
        ScriptedOutcome::FailTimes {
            times: 1,
            error: TransactionError::BlockhashNotFound,
        },
    );

    let events: Vec<_> = test
        .client
        .send_smart(vec![tagged(170), tagged(171), tagged(172)])
        .expect("smart send should start")
        .collect()
        .await;

    assert_eq!(events.len(), 5, "unexpected events: {events:?}");
    assert!(matches!(
        events[1],
        SmartSendEvent::ReSign {
            attempt: 1,
            index: 1
        }
    ));
    assert!(matches!(events[2], SmartSendEvent::Progress { index: 1, .. }));
    assert!(matches!(
        events[4],
        SmartSendEvent::Finished {
            successful: 3,
            attempted: 3
        }
    ));
    assert_eq!(test.chain.current_slot(), 1_000);
    assert_eq!(test.wallet.batch_sizes(), vec![3, 2]);

    let blockhashes = test.chain.blockhash_fetches();
    assert_eq!(blockhashes.len(), 2);
    let tx_171: Vec<_> = test
        .chain
        .distinct_submissions()
        .into_iter()
        .filter(|s| s.tag == 171)
        .collect();
    assert_eq!(tx_171.len(), 2);
    assert_ne!(tx_171[0].signature, tx_171[1].signature);
    assert_eq!(tx_171[1].blockhash, blockhashes[1]);

    println!("✅ Dropped blockhash replaced before retrying");
}

/// Test dropping the event stream stops the background task
///
/// **What this tests:**
/// - Transaction 1 never confirms, so the task is still working on it when
///   the stream is dropped
/// - The task halts at its next event instead of moving on to transaction 2
#[tokio::test(start_paused = true)]
async fn test_dropping_stream_stops_sending() {
    let test = TestFixture::default();
    test.chain.script(151, ScriptedOutcome::Drop);
    let mut events = test
        .client
        .send_smart((150..155).map(tagged).collect())
        .expect("smart send should start");

    let first = events.next().await;
    assert!(matches!(first, Some(SmartSendEvent::Progress { index: 0, .. })));
    drop(events);

    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    assert_eq!(test.chain.submitted_tags(), vec![150, 151]);

    println!("✅ Dropped stream stopped the sequence");
}
