//! Two-dimensional account nonces.
//!
//! A nonce is `key(192) | sequence(64)`. Each `(sender, key)` pair has its own
//! sequence, which must be used in order.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Splits a nonce into its key and sequence.
pub fn split_nonce(nonce: U256) -> (U256, u64) {
    let key = nonce >> 64usize;
    let sequence = (nonce & U256::from(u64::MAX)).to::<u64>();
    (key, sequence)
}

/// Joins a key and sequence into a nonce.
pub fn join_nonce(key: U256, sequence: u64) -> U256 {
    (key << 64usize) | U256::from(sequence)
}

/// Next expected sequence per sender and key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceManager {
    sequences: HashMap<Address, HashMap<U256, u64>>,
}

impl NonceManager {
    /// Returns the full next nonce for `(sender, key)`.
    pub fn get_nonce(&self, sender: Address, key: U256) -> U256 {
        join_nonce(key, self.sequence(sender, key))
    }

    /// Manually advances the sequence for `(sender, key)`.
    pub fn increment_nonce(&mut self, sender: Address, key: U256) {
        let sequence = self.sequences.entry(sender).or_default().entry(key).or_default();
        *sequence = sequence.saturating_add(1);
    }

    /// Returns true if `nonce` is the next one expected from `sender`.
    pub fn is_valid(&self, sender: Address, nonce: U256) -> bool {
        let (key, sequence) = split_nonce(nonce);
        sequence == self.sequence(sender, key) && sequence != u64::MAX
    }

    /// Consumes `nonce` if it is the next one expected. Returns false otherwise.
    pub fn validate_and_update(&mut self, sender: Address, nonce: U256) -> bool {
        if !self.is_valid(sender, nonce) {
            return false;
        }
        let (key, _) = split_nonce(nonce);
        self.increment_nonce(sender, key);
        true
    }

    fn sequence(&self, sender: Address, key: U256) -> u64 {
        self.sequences.get(&sender).and_then(|keys| keys.get(&key)).copied().unwrap_or_default()
    }
}
