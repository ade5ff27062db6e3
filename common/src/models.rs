use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One custodial wallet per chat user. Only `last_check_in` ever changes.
#[derive(Clone, Serialize)]
pub struct WalletRecord {
    pub qq_id: i64,
    pub eth_address: String,
    #[serde(skip_serializing)]
    pub eth_private_key: String,
    pub created_at: DateTime<Utc>,
    pub last_check_in: Option<DateTime<Utc>>,
}

impl fmt::Debug for WalletRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRecord")
            .field("qq_id", &self.qq_id)
            .field("eth_address", &self.eth_address)
            .field("eth_private_key", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("last_check_in", &self.last_check_in)
            .finish()
    }
}

pub struct NewWallet {
    pub qq_id: i64,
    pub eth_address: String,
    pub eth_private_key: String,
}

/// Outcome of trying to stamp today's check-in on a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInClaim {
    NotRegistered,
    AlreadyCheckedIn,
    /// The stamp was written; `previous` is what it replaced.
    Claimed {
        previous: Option<DateTime<Utc>>,
    },
}
