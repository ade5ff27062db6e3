use alloy_primitives::{TxHash, U256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Cannot reach RPC node: {0}")]
    Connection(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient token balance: have {balance}, need {required}")]
    InsufficientFunds { balance: U256, required: U256 },

    #[error("Owner private key is not configured")]
    MissingOwnerKey,

    /// Rejected before it reached the mempool; nothing was applied.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Broadcast, but no receipt arrived in time. It may still be mined.
    #[error("Transaction {tx_hash} unconfirmed: {reason}")]
    Unconfirmed { tx_hash: TxHash, reason: String },

    #[error("Transaction reverted on chain: {0}")]
    Reverted(TxHash),

    #[error("Failed to decode contract response: {0}")]
    Decode(String),
}

impl ChainError {
    /// True when the chain may already carry the effect of the call.
    pub fn may_have_applied(&self) -> bool {
        matches!(self, ChainError::Unconfirmed { .. })
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
