//! Persistent entry point state.

use serde::{Deserialize, Serialize};

use crate::{ledger::DepositLedger, nonce::NonceManager};

/// Everything the entry point keeps between batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointState {
    /// Deposits and stakes.
    pub deposits: DepositLedger,
    /// Consumed nonces.
    pub nonces: NonceManager,
}

impl EntryPointState {
    /// Serializes the state to a JSON snapshot.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restores state from a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
