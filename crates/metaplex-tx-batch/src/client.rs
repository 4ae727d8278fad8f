use crate::{
    batch::{
        send_transactions, send_transactions_in_chunks, send_transactions_with_manual_retry,
        BatchOutcome, ManualRetryOutcome, SequencePolicy,
    },
    blockhash::fetch_blockhash_snapshot,
    logs::get_error_for_transaction,
    sender::{
        send_signed_transaction, send_transaction, send_transaction_with_retry, BeforeSend,
        Confirmed, SubmissionResult,
    },
    sizing::split_instruction_set,
    smart::{send_smart, SmartSendConfig, SmartSendEvents},
    wallet::connected_public_key,
    BlockhashSnapshot, Connection, InstructionSet, SendError, TxPipelineConfig, TxPipelineError,
    TxPipelineResult, WalletSigner,
};
use solana_sdk::{signature::Signature, transaction::Transaction};
use std::sync::Arc;
use tracing::debug;

/// Entry point bundling a connection, a wallet and the pipeline configuration
pub struct TxPipelineClient<C: ?Sized, W: ?Sized> {
    connection: Arc<C>,
    wallet: Arc<W>,
    config: TxPipelineConfig,
}

impl<C, W> TxPipelineClient<C, W>
where
    C: Connection + ?Sized + 'static,
    W: WalletSigner + ?Sized + 'static,
{
    /// Create a new client with default configuration
    pub fn new(connection: Arc<C>, wallet: Arc<W>) -> Self {
        Self {
            connection,
            wallet,
            config: TxPipelineConfig::default(),
        }
    }

    /// Create a new client with custom configuration
    pub fn with_config(
        connection: Arc<C>,
        wallet: Arc<W>,
        config: TxPipelineConfig,
    ) -> TxPipelineResult<Self> {
        config.validate().map_err(TxPipelineError::Config)?;
        Ok(Self {
            connection,
            wallet,
            config,
        })
    }

    pub fn config(&self) -> &TxPipelineConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    pub fn wallet(&self) -> &Arc<W> {
        &self.wallet
    }

    pub async fn blockhash_snapshot(&self) -> TxPipelineResult<BlockhashSnapshot> {
        Ok(fetch_blockhash_snapshot(self.connection.as_ref(), self.config.commitment_config()).await?)
    }

    /// Split every set that exceeds the configured transaction size, keeping order
    pub fn fit_instruction_sets(
        &self,
        sets: &[InstructionSet],
    ) -> TxPipelineResult<Vec<InstructionSet>> {
        let fee_payer = connected_public_key(self.wallet.as_ref())?;
        let mut fitted = Vec::with_capacity(sets.len());
        for set in sets.iter().filter(|set| !set.is_empty()) {
            fitted.extend(split_instruction_set(
                set,
                &fee_payer,
                self.config.max_transaction_size_bytes,
            )?);
        }
        if fitted.len() != sets.len() {
            debug!("Fitted {} instruction sets into {}", sets.len(), fitted.len());
        }
        Ok(fitted)
    }

    pub async fn send_signed_transaction(&self, transaction: &Transaction) -> SubmissionResult {
        send_signed_transaction(
            self.connection.as_ref(),
            transaction,
            &self.config.send_options(),
        )
        .await
    }

    pub async fn send_transaction(
        &self,
        set: &InstructionSet,
        await_confirmation: bool,
        includes_fee_payer: bool,
        block: Option<BlockhashSnapshot>,
    ) -> TxPipelineResult<Confirmed> {
        send_transaction(
            self.connection.as_ref(),
            self.wallet.as_ref(),
            set,
            &self.config.send_options(),
            await_confirmation,
            includes_fee_payer,
            block,
        )
        .await
    }

    pub async fn send_transaction_with_retry(
        &self,
        set: &InstructionSet,
        includes_fee_payer: bool,
        block: Option<BlockhashSnapshot>,
        before_send: Option<BeforeSend>,
    ) -> TxPipelineResult<Confirmed> {
        send_transaction_with_retry(
            self.connection.as_ref(),
            self.wallet.as_ref(),
            set,
            &self.config.send_options(),
            includes_fee_payer,
            block,
            before_send,
        )
        .await
    }

    pub async fn send_transactions<S, F>(
        &self,
        sets: &[InstructionSet],
        policy: SequencePolicy,
        block: Option<BlockhashSnapshot>,
        on_success: S,
        on_failure: F,
    ) -> TxPipelineResult<BatchOutcome>
    where
        S: FnMut(&Signature, usize),
        F: FnMut(&Transaction, &SendError, usize) -> bool,
    {
        send_transactions(
            self.connection.as_ref(),
            self.wallet.as_ref(),
            sets,
            policy,
            &self.config.send_options(),
            block,
            on_success,
            on_failure,
        )
        .await
    }

    /// Batch send in chunks of the configured chunk size
    pub async fn send_transactions_in_chunks<S, F>(
        &self,
        sets: &[InstructionSet],
        policy: SequencePolicy,
        on_success: S,
        on_failure: F,
    ) -> TxPipelineResult<BatchOutcome>
    where
        S: FnMut(&Signature, usize),
        F: FnMut(&Transaction, &SendError, usize) -> bool,
    {
        send_transactions_in_chunks(
            self.connection.as_ref(),
            self.wallet.as_ref(),
            sets,
            policy,
            &self.config.send_options(),
            self.config.chunk_size,
            on_success,
            on_failure,
        )
        .await
    }

    pub async fn send_transactions_with_manual_retry(
        &self,
        sets: &[InstructionSet],
    ) -> TxPipelineResult<ManualRetryOutcome> {
        send_transactions_with_manual_retry(
            self.connection.as_ref(),
            self.wallet.as_ref(),
            sets,
            &self.config.send_options(),
            self.config.max_stalled_attempts,
        )
        .await
    }

    /// Start a smart send of `sets` with this client's connection and wallet
    pub fn send_smart(&self, sets: Vec<InstructionSet>) -> TxPipelineResult<SmartSendEvents> {
        send_smart(SmartSendConfig {
            connection: self.connection.clone(),
            wallet: self.wallet.clone(),
            instruction_sets: sets,
            options: self.config.smart_send_options(),
        })
    }

    pub async fn get_error_for_transaction(
        &self,
        signature: &Signature,
    ) -> TxPipelineResult<Vec<String>> {
        Ok(get_error_for_transaction(
            self.connection.as_ref(),
            signature,
            self.config.commitment_config(),
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection::MockConnection, KeypairWallet};
    use solana_sdk::{
        instruction::Instruction, pubkey::Pubkey, signature::Keypair, signer::Signer,
    };

    fn client(wallet: KeypairWallet) -> TxPipelineClient<MockConnection, KeypairWallet> {
        TxPipelineClient::new(Arc::new(MockConnection::new()), Arc::new(wallet))
    }

    #[test]
    fn test_with_config_rejects_invalid_config() {
        let config = TxPipelineConfig {
            chunk_size: 0,
            ..Default::default()
        };
        let result = TxPipelineClient::with_config(
            Arc::new(MockConnection::new()),
            Arc::new(KeypairWallet::new(Keypair::new())),
            config,
        );
        assert!(matches!(result, Err(TxPipelineError::Config(_))));
    }

    #[test]
    fn test_fit_instruction_sets_splits_and_drops_empty() {
        let client = client(KeypairWallet::new(Keypair::new()));
        let big = InstructionSet::new(
            (0..6)
                .map(|_| Instruction::new_with_bytes(Pubkey::new_unique(), &[7u8; 300], vec![]))
                .collect(),
            vec![],
        );
        let small = InstructionSet::new(
            vec![Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![])],
            vec![],
        );

        let fitted = client
            .fit_instruction_sets(&[big, InstructionSet::default(), small.clone()])
            .unwrap();
        assert!(fitted.len() >= 3);
        assert_eq!(
            fitted.iter().map(|s| s.instructions.len()).sum::<usize>(),
            7
        );
        assert_eq!(fitted.last().unwrap().instructions, small.instructions);
    }

    #[test]
    fn test_smart_send_requires_wallet() {
        let client = client(KeypairWallet::disconnected());
        let set = InstructionSet::new(
            vec![Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![])],
            vec![],
        );
        assert!(matches!(
            client.send_smart(vec![set]),
            Err(TxPipelineError::WalletNotConnected)
        ));
    }

    #[test]
    fn test_accessors() {
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        let client = client(KeypairWallet::new(keypair));
        assert_eq!(client.wallet().public_key(), Some(pubkey));
        assert_eq!(client.config().chunk_size, 40);
    }
}
