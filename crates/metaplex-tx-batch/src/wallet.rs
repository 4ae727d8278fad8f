use crate::{TxPipelineError, WalletError};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::Transaction,
};
use tracing::debug;

/// The signing capability of a user wallet
#[async_trait]
#[cfg_attr(test, automock)]
pub trait WalletSigner: Send + Sync {
    /// Public key of the connected account, `None` when disconnected
    fn public_key(&self) -> Option<Pubkey>;

    async fn sign_transaction(&self, transaction: Transaction)
        -> Result<Transaction, WalletError>;

    /// Sign every transaction in one approval; output order matches input order
    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError>;
}

/// Public key of `wallet`, failing fast when nothing is connected
pub fn connected_public_key<W: WalletSigner + ?Sized>(
    wallet: &W,
) -> Result<Pubkey, TxPipelineError> {
    wallet
        .public_key()
        .ok_or(TxPipelineError::WalletNotConnected)
}

/// Ask the wallet to sign a batch and check it handed back the same number
pub(crate) async fn sign_all<W: WalletSigner + ?Sized>(
    wallet: &W,
    transactions: Vec<Transaction>,
) -> Result<Vec<Transaction>, TxPipelineError> {
    let requested = transactions.len();
    if requested == 0 {
        return Ok(transactions);
    }
    let signed = wallet.sign_all_transactions(transactions).await?;
    if signed.len() != requested {
        return Err(TxPipelineError::SignedCountMismatch {
            requested,
            returned: signed.len(),
        });
    }
    debug!("Wallet signed {} transactions", requested);
    Ok(signed)
}

/// Wallet backed by a local keypair
pub struct KeypairWallet {
    keypair: Option<Keypair>,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Some(keypair),
        }
    }

    /// A wallet with no account connected; every signing request is rejected
    pub fn disconnected() -> Self {
        Self { keypair: None }
    }

    fn sign(&self, mut transaction: Transaction) -> Result<Transaction, WalletError> {
        let keypair = self.keypair.as_ref().ok_or(WalletError::NotConnected)?;
        let blockhash = transaction.message.recent_blockhash;
        transaction.try_partial_sign(&[keypair], blockhash)?;
        Ok(transaction)
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn public_key(&self) -> Option<Pubkey> {
        self.keypair.as_ref().map(|keypair| keypair.pubkey())
    }

    async fn sign_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<Transaction, WalletError> {
        self.sign(transaction)
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        transactions
            .into_iter()
            .map(|transaction| self.sign(transaction))
            .collect()
    }
}
