use std::{str::FromStr, time::Duration};

use alloy_network::{ReceiptResponse, TransactionBuilder};
use alloy_primitives::{hex, Address, TxHash, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use crate::{
    error::{ChainError, Result},
    token::IMintableToken,
    NewAccount, TokenInfo, TokenLedger,
};

const NATIVE_TRANSFER_GAS: u64 = 21_000;

fn parse_signer(private_key: &str) -> Result<PrivateKeySigner> {
    PrivateKeySigner::from_str(private_key.trim()).map_err(|e| ChainError::InvalidKey(e.to_string()))
}

fn rpc_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}

/// Talks to one token contract. Writes layer a wallet over the shared
/// provider per call so each one is signed by the key it belongs to.
pub struct EvmTokenClient<P = RootProvider> {
    provider: P,
    contract: Address,
    owner: Option<PrivateKeySigner>,
    // Owner-signed transactions share one nonce sequence.
    owner_lock: Mutex<()>,
    receipt_timeout: Duration,
}

impl EvmTokenClient {
    pub fn new(
        rpc_url: &str,
        contract: Address,
        owner_private_key: Option<&str>,
        receipt_timeout: Duration,
    ) -> Result<Self> {
        let url = Url::parse(rpc_url)
            .map_err(|e| ChainError::Connection(format!("invalid RPC url {}: {}", rpc_url, e)))?;
        Self::with_provider(
            RootProvider::new_http(url),
            contract,
            owner_private_key,
            receipt_timeout,
        )
    }

    /// Builds the client and makes sure the node answers.
    pub async fn connect(
        rpc_url: &str,
        contract: Address,
        owner_private_key: Option<&str>,
        receipt_timeout: Duration,
    ) -> Result<Self> {
        let client = Self::new(rpc_url, contract, owner_private_key, receipt_timeout)?;
        let chain_id = client
            .provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Connection(format!("{}: {}", rpc_url, e)))?;

        info!(
            chain_id,
            contract = %client.contract,
            owner = ?client.owner.as_ref().map(|s| s.address()),
            "Connected to RPC node"
        );
        Ok(client)
    }
}

impl<P: Provider + Clone> EvmTokenClient<P> {
    pub fn with_provider(
        provider: P,
        contract: Address,
        owner_private_key: Option<&str>,
        receipt_timeout: Duration,
    ) -> Result<Self> {
        let owner = owner_private_key.map(parse_signer).transpose()?;

        Ok(Self {
            provider,
            contract,
            owner,
            owner_lock: Mutex::new(()),
            receipt_timeout,
        })
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    fn signing(&self, signer: PrivateKeySigner) -> impl Provider {
        ProviderBuilder::new()
            .wallet(signer)
            .on_provider(self.provider.clone())
    }

    fn owner(&self) -> Result<PrivateKeySigner> {
        self.owner.clone().ok_or(ChainError::MissingOwnerKey)
    }

    async fn read<C: SolCall>(&self, call: C) -> Result<C::Return> {
        let tx = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(call.abi_encode());

        let output = self.provider.call(tx).await.map_err(rpc_error)?;
        C::abi_decode_returns(&output, true).map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn send_contract_call<C: SolCall>(
        &self,
        signer: PrivateKeySigner,
        call: C,
    ) -> Result<TxHash> {
        let from = signer.address();
        let provider = self.signing(signer);

        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(self.contract)
            .with_input(call.abi_encode());

        // Leave 20% headroom over the estimate; unused gas is refunded.
        let estimate = provider.estimate_gas(tx.clone()).await.map_err(rpc_error)?;
        let tx = tx.with_gas_limit(estimate + estimate / 5);

        self.submit(&provider, tx).await
    }

    async fn submit<S: Provider>(&self, provider: &S, tx: TransactionRequest) -> Result<TxHash> {
        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::TransactionFailed(e.to_string()))?;
        let tx_hash = *pending.tx_hash();

        // From here on the transaction is out; failing to watch it says
        // nothing about whether it lands.
        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| {
                warn!(%tx_hash, "No receipt: {}", e);
                ChainError::Unconfirmed {
                    tx_hash,
                    reason: e.to_string(),
                }
            })?;

        if !receipt.status() {
            return Err(ChainError::Reverted(tx_hash));
        }

        Ok(tx_hash)
    }
}

impl<P: Provider + Clone> TokenLedger for EvmTokenClient<P> {
    fn create_account(&self) -> NewAccount {
        let signer = PrivateKeySigner::random();
        NewAccount {
            address: signer.address(),
            private_key: hex::encode_prefixed(signer.to_bytes()),
        }
    }

    fn has_owner_key(&self) -> bool {
        self.owner.is_some()
    }

    async fn token_balance(&self, address: Address) -> Result<U256> {
        let balance = self
            .read(IMintableToken::balanceOfCall { owner: address })
            .await?
            .balance;
        Ok(balance)
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        self.provider.get_balance(address).await.map_err(rpc_error)
    }

    async fn token_info(&self) -> Result<TokenInfo> {
        let name = self.read(IMintableToken::nameCall {}).await?._0;
        let symbol = self.read(IMintableToken::symbolCall {}).await?._0;
        let decimals = self.read(IMintableToken::decimalsCall {}).await?._0;
        let total_supply = self.read(IMintableToken::totalSupplyCall {}).await?._0;

        Ok(TokenInfo {
            name,
            symbol,
            decimals,
            total_supply,
        })
    }

    async fn transfer_token(
        &self,
        from_private_key: &str,
        to: Address,
        amount: U256,
    ) -> Result<TxHash> {
        let signer = parse_signer(from_private_key)?;

        // Checking first avoids paying gas for a transfer that would revert.
        let balance = self.token_balance(signer.address()).await?;
        if balance < amount {
            return Err(ChainError::InsufficientFunds {
                balance,
                required: amount,
            });
        }

        let tx_hash = self
            .send_contract_call(signer, IMintableToken::transferCall { to, value: amount })
            .await?;
        info!(%to, %amount, %tx_hash, "Token transfer confirmed");
        Ok(tx_hash)
    }

    async fn mint_token(&self, to: Address, amount: U256) -> Result<TxHash> {
        let owner = self.owner()?;
        let _guard = self.owner_lock.lock().await;

        let tx_hash = self
            .send_contract_call(owner, IMintableToken::mintCall { to, amount })
            .await?;
        info!(%to, %amount, %tx_hash, "Mint confirmed");
        Ok(tx_hash)
    }

    async fn fund_gas(&self, to: Address, amount_wei: U256) -> Result<TxHash> {
        let owner = self.owner()?;
        let from = owner.address();
        let _guard = self.owner_lock.lock().await;

        let provider = self.signing(owner);
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(amount_wei)
            .with_gas_limit(NATIVE_TRANSFER_GAS);

        let tx_hash = self.submit(&provider, tx).await?;
        info!(%to, %amount_wei, %tx_hash, "Gas funding confirmed");
        Ok(tx_hash)
    }
}
