use {
    async_trait::async_trait,
    metaplex_tx_batch::{KeypairWallet, WalletError, WalletSigner},
    solana_sdk::{pubkey::Pubkey, signature::Keypair, transaction::Transaction},
    std::sync::Mutex,
};

/// Keypair wallet that remembers every approval it was asked for
pub struct RecordingWallet {
    inner: KeypairWallet,
    batch_sizes: Mutex<Vec<usize>>,
    single_signs: Mutex<usize>,
}

impl RecordingWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self::wrap(KeypairWallet::new(keypair))
    }

    pub fn disconnected() -> Self {
        Self::wrap(KeypairWallet::disconnected())
    }

    fn wrap(inner: KeypairWallet) -> Self {
        Self {
            inner,
            batch_sizes: Mutex::new(Vec::new()),
            single_signs: Mutex::new(0),
        }
    }

    /// Number of transactions in each `sign_all_transactions` call, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .expect("wallet record poisoned")
            .clone()
    }

    pub fn single_signs(&self) -> usize {
        *self.single_signs.lock().expect("wallet record poisoned")
    }
}

impl Default for RecordingWallet {
    fn default() -> Self {
        Self::new(Keypair::new())
    }
}

#[async_trait]
impl WalletSigner for RecordingWallet {
    fn public_key(&self) -> Option<Pubkey> {
        self.inner.public_key()
    }

    async fn sign_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<Transaction, WalletError> {
        *self.single_signs.lock().expect("wallet record poisoned") += 1;
        self.inner.sign_transaction(transaction).await
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        self.batch_sizes
            .lock()
            .expect("wallet record poisoned")
            .push(transactions.len());
        self.inner.sign_all_transactions(transactions).await
    }
}
