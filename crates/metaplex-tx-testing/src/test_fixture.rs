use {
    crate::{RecordingWallet, ScriptedConnection},
    metaplex_tx_batch::{SendOptions, TxPipelineClient, TxPipelineConfig},
    solana_sdk::pubkey::Pubkey,
    std::sync::Arc,
};

/// A scripted chain, a recording wallet and a client wired to both
pub struct TestFixture {
    pub chain: Arc<ScriptedConnection>,
    pub wallet: Arc<RecordingWallet>,
    pub client: TxPipelineClient<ScriptedConnection, RecordingWallet>,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::with_config(TxPipelineConfig::default())
    }
}

impl TestFixture {
    pub fn with_config(config: TxPipelineConfig) -> Self {
        Self::with_parts(ScriptedConnection::default(), RecordingWallet::default(), config)
    }

    pub fn with_parts(
        chain: ScriptedConnection,
        wallet: RecordingWallet,
        config: TxPipelineConfig,
    ) -> Self {
        let chain = Arc::new(chain);
        let wallet = Arc::new(wallet);
        let client = TxPipelineClient::with_config(chain.clone(), wallet.clone(), config)
            .unwrap_or_else(|e| panic!("Invalid test config: {e}"));
        Self {
            chain,
            wallet,
            client,
        }
    }

    pub fn fee_payer(&self) -> Pubkey {
        use metaplex_tx_batch::WalletSigner as _;
        self.wallet
            .public_key()
            .expect("test wallet should be connected")
    }

    pub fn send_options(&self) -> SendOptions {
        self.client.config().send_options()
    }
}
