mod client;
mod error;
mod token;

pub use alloy_primitives::{utils::parse_ether, Address, TxHash, U256};
pub use client::EvmTokenClient;
pub use error::{ChainError, Result};
pub use token::{format_ether, parse_address};

/// A freshly generated custodial key pair.
pub struct NewAccount {
    pub address: Address,
    pub private_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

/// Everything the bot needs from the chain. Token amounts are in the token's
/// smallest unit, native amounts in wei.
pub trait TokenLedger {
    /// Offline; never touches the network.
    fn create_account(&self) -> NewAccount;

    fn has_owner_key(&self) -> bool;

    async fn token_balance(&self, address: Address) -> Result<U256>;

    async fn native_balance(&self, address: Address) -> Result<U256>;

    async fn token_info(&self) -> Result<TokenInfo>;

    /// Signed by the sender's own key. Fails with
    /// [`ChainError::InsufficientFunds`] before sending anything when the
    /// balance is short.
    async fn transfer_token(&self, from_private_key: &str, to: Address, amount: U256)
        -> Result<TxHash>;

    /// Signed by the owner key.
    async fn mint_token(&self, to: Address, amount: U256) -> Result<TxHash>;

    /// Sends native currency from the owner key so a new wallet can pay gas.
    async fn fund_gas(&self, to: Address, amount_wei: U256) -> Result<TxHash>;
}
