use {
    async_trait::async_trait,
    metaplex_tx_batch::{
        Connection, ConnectionError, SignatureConfirmation, SignatureStatus, SimulationOutcome,
    },
    solana_sdk::{
        commitment_config::CommitmentConfig,
        hash::Hash,
        signature::Signature,
        transaction::{Transaction, TransactionError},
    },
    std::{
        collections::HashMap,
        sync::{Mutex, MutexGuard},
        time::Duration,
    },
    tracing::debug,
};

/// How often `wait_for_signature` re-checks the scripted state
const NOTIFICATION_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// What the scripted chain does with a transaction, selected by its tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Confirm at the current chain slot
    Land,
    /// Confirm at `slot`, advancing the chain to it
    LandAt(u64),
    /// Confirm with an execution error and these program logs
    OnChain {
        error: TransactionError,
        logs: Vec<String>,
    },
    /// Never confirm
    Drop,
    /// Confirm once the same signature has been submitted this many times
    LandAfterSubmissions(usize),
    /// Fail the first `times` attempts with `error`, then land
    FailTimes {
        times: usize,
        error: TransactionError,
    },
    /// First attempt finds the chain moved on to `slot` and the blockhash
    /// gone; later attempts land
    ExpireAt(u64),
}

/// One call to `send_transaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub signature: Signature,
    pub tag: u8,
    pub blockhash: Hash,
}

#[derive(Debug, Clone)]
enum Resolution {
    Pending,
    Confirmed {
        slot: u64,
        err: Option<TransactionError>,
        logs: Vec<String>,
    },
}

#[derive(Default)]
struct ChainState {
    slot: u64,
    outcomes: HashMap<u8, ScriptedOutcome>,
    submissions: Vec<Submission>,
    resolutions: HashMap<Signature, Resolution>,
    attempts_by_tag: HashMap<u8, usize>,
    blockhash_fetches: Vec<Hash>,
    failing_blockhash_fetches: usize,
}

/// Tag of a transaction: the first data byte of its first instruction
pub fn transaction_tag(transaction: &Transaction) -> u8 {
    transaction
        .message
        .instructions
        .first()
        .and_then(|ix| ix.data.first())
        .copied()
        .unwrap_or_default()
}

/// In-memory chain whose behavior per transaction is scripted up front.
///
/// Transactions are told apart by [`transaction_tag`]; untagged outcomes
/// default to [`ScriptedOutcome::Land`].
pub struct ScriptedConnection {
    state: Mutex<ChainState>,
}

impl Default for ScriptedConnection {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl ScriptedConnection {
    pub fn new(slot: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                slot,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().expect("scripted chain state poisoned")
    }

    pub fn script(&self, tag: u8, outcome: ScriptedOutcome) -> &Self {
        self.state().outcomes.insert(tag, outcome);
        self
    }

    pub fn current_slot(&self) -> u64 {
        self.state().slot
    }

    pub fn warp_to_slot(&self, slot: u64) {
        self.state().slot = slot;
    }

    pub fn advance_slot_by(&self, slots: u64) {
        self.state().slot += slots;
    }

    /// Make the next `count` blockhash fetches fail
    pub fn fail_blockhash_fetches(&self, count: usize) {
        self.state().failing_blockhash_fetches = count;
    }

    /// Every `send_transaction` call, re-broadcasts included
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// First submission of every distinct signature, in order
    pub fn distinct_submissions(&self) -> Vec<Submission> {
        let mut seen = Vec::new();
        self.state()
            .submissions
            .iter()
            .filter(|submission| {
                if seen.contains(&submission.signature) {
                    return false;
                }
                seen.push(submission.signature);
                true
            })
            .cloned()
            .collect()
    }

    /// Tags in first-submission order
    pub fn submitted_tags(&self) -> Vec<u8> {
        self.distinct_submissions()
            .into_iter()
            .map(|submission| submission.tag)
            .collect()
    }

    pub fn submission_count(&self, signature: &Signature) -> usize {
        self.state()
            .submissions
            .iter()
            .filter(|submission| submission.signature == *signature)
            .count()
    }

    pub fn blockhash_fetches(&self) -> Vec<Hash> {
        self.state().blockhash_fetches.clone()
    }

    fn resolve(state: &mut ChainState, tag: u8, signature: &Signature) -> Resolution {
        let attempt = {
            let attempts = state.attempts_by_tag.entry(tag).or_default();
            *attempts += 1;
            *attempts
        };
        let outcome = state
            .outcomes
            .get(&tag)
            .cloned()
            .unwrap_or(ScriptedOutcome::Land);

        let resolution = match outcome {
            ScriptedOutcome::Land => Resolution::Confirmed {
                slot: state.slot,
                err: None,
                logs: Vec::new(),
            },
            ScriptedOutcome::LandAt(slot) => {
                state.slot = state.slot.max(slot);
                Resolution::Confirmed {
                    slot,
                    err: None,
                    logs: Vec::new(),
                }
            }
            ScriptedOutcome::OnChain { error, logs } => Resolution::Confirmed {
                slot: state.slot,
                err: Some(error),
                logs,
            },
            ScriptedOutcome::Drop | ScriptedOutcome::LandAfterSubmissions(_) => {
                Resolution::Pending
            }
            ScriptedOutcome::FailTimes { times, error } => Resolution::Confirmed {
                slot: state.slot,
                err: (attempt <= times).then_some(error),
                logs: Vec::new(),
            },
            ScriptedOutcome::ExpireAt(slot) => {
                state.slot = state.slot.max(slot);
                Resolution::Confirmed {
                    slot: state.slot,
                    err: (attempt == 1).then_some(TransactionError::BlockhashNotFound),
                    logs: Vec::new(),
                }
            }
        };
        debug!(
            "Scripted chain resolved {} (tag {}, attempt {}) as {:?}",
            signature, tag, attempt, resolution
        );
        resolution
    }

    fn confirmation(&self, signature: &Signature) -> Option<SignatureConfirmation> {
        match self.state().resolutions.get(signature) {
            Some(Resolution::Confirmed { slot, err, .. }) => Some(SignatureConfirmation {
                slot: *slot,
                err: err.clone(),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, ConnectionError> {
        if !transaction.is_signed() || transaction.verify().is_err() {
            return Err(ConnectionError::UnexpectedResponse(
                "transaction signature verification failed".to_string(),
            ));
        }
        let signature = transaction.signatures[0];
        let tag = transaction_tag(transaction);
        let mut state = self.state();
        state.submissions.push(Submission {
            signature,
            tag,
            blockhash: transaction.message.recent_blockhash,
        });

        let needs_resolution = match state.resolutions.get(&signature) {
            None => true,
            // a failed signature submitted again is a fresh attempt
            Some(Resolution::Confirmed { err, .. }) => err.is_some(),
            Some(Resolution::Pending) => false,
        };
        if needs_resolution {
            let resolution = Self::resolve(&mut state, tag, &signature);
            state.resolutions.insert(signature, resolution);
        }

        if let Some(ScriptedOutcome::LandAfterSubmissions(required)) =
            state.outcomes.get(&tag).cloned()
        {
            let submitted = state
                .submissions
                .iter()
                .filter(|submission| submission.signature == signature)
                .count();
            if submitted >= required {
                let slot = state.slot;
                state.resolutions.insert(
                    signature,
                    Resolution::Confirmed {
                        slot,
                        err: None,
                        logs: Vec::new(),
                    },
                );
            }
        }

        Ok(signature)
    }

    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureStatus>>, ConnectionError> {
        Ok(signatures
            .iter()
            .map(|signature| {
                self.confirmation(signature)
                    .map(|confirmation| SignatureStatus {
                        slot: confirmation.slot,
                        confirmations: Some(1),
                        err: confirmation.err,
                    })
            })
            .collect())
    }

    async fn get_latest_blockhash(
        &self,
        _commitment: CommitmentConfig,
    ) -> Result<Hash, ConnectionError> {
        let mut state = self.state();
        if state.failing_blockhash_fetches > 0 {
            state.failing_blockhash_fetches -= 1;
            return Err(ConnectionError::UnexpectedResponse(
                "scripted blockhash failure".to_string(),
            ));
        }
        let blockhash = Hash::new_unique();
        state.blockhash_fetches.push(blockhash);
        Ok(blockhash)
    }

    async fn get_slot(&self, _commitment: CommitmentConfig) -> Result<u64, ConnectionError> {
        Ok(self.current_slot())
    }

    async fn wait_for_signature(
        &self,
        signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> Result<SignatureConfirmation, ConnectionError> {
        loop {
            if let Some(confirmation) = self.confirmation(signature) {
                return Ok(confirmation);
            }
            tokio::time::sleep(NOTIFICATION_CHECK_INTERVAL).await;
        }
    }

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
        _commitment: CommitmentConfig,
    ) -> Result<SimulationOutcome, ConnectionError> {
        let outcome = self.state().outcomes.get(&transaction_tag(transaction)).cloned();
        Ok(match outcome {
            Some(ScriptedOutcome::OnChain { error, logs }) => SimulationOutcome {
                err: Some(error),
                logs,
            },
            _ => SimulationOutcome::default(),
        })
    }

    async fn get_transaction_logs(
        &self,
        signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> Result<Option<Vec<String>>, ConnectionError> {
        Ok(match self.state().resolutions.get(signature) {
            Some(Resolution::Confirmed { logs, .. }) => Some(logs.clone()),
            _ => None,
        })
    }
}
