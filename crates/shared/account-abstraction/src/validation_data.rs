//! Packed validation data returned by account and paymaster validation.

use alloy_primitives::{Address, U256, address};

/// Aggregator value signalling a signature failure.
pub const SIG_VALIDATION_FAILED: Address = address!("0000000000000000000000000000000000000001");

/// Largest timestamp representable in the 6-byte time fields.
pub const MAX_VALIDITY_TIMESTAMP: u64 = (1 << 48) - 1;

/// Decoded `validationData`: `aggregator(20) | validUntil(6) | validAfter(6)`,
/// aggregator in the low-order bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationData {
    /// Zero for a valid signature, [`SIG_VALIDATION_FAILED`] for a failed one.
    pub aggregator: Address,
    /// Operation is valid only after this timestamp.
    pub valid_after: u64,
    /// Operation is valid up to and including this timestamp; zero means no expiry.
    pub valid_until: u64,
}

impl ValidationData {
    /// Successful validation with no time bounds.
    pub const fn valid() -> Self {
        Self { aggregator: Address::ZERO, valid_after: 0, valid_until: 0 }
    }

    /// Signature failure with no time bounds.
    pub const fn signature_failed() -> Self {
        Self { aggregator: SIG_VALIDATION_FAILED, valid_after: 0, valid_until: 0 }
    }

    /// Successful validation restricted to `(valid_after, valid_until]`.
    pub const fn window(valid_after: u64, valid_until: u64) -> Self {
        Self { aggregator: Address::ZERO, valid_after, valid_until }
    }

    /// Parses the packed form. Time fields are masked to 6 bytes.
    pub fn parse(packed: U256) -> Self {
        let mask = U256::from(MAX_VALIDITY_TIMESTAMP);
        let word = packed.to_be_bytes::<32>();
        Self {
            aggregator: Address::from_slice(&word[12..]),
            valid_until: ((packed >> 160usize) & mask).to::<u64>(),
            valid_after: ((packed >> 208usize) & mask).to::<u64>(),
        }
    }

    /// Packs into the on-chain `uint256` form.
    pub fn pack(&self) -> U256 {
        let aggregator = U256::from_be_slice(self.aggregator.as_slice());
        let valid_until = U256::from(self.valid_until & MAX_VALIDITY_TIMESTAMP) << 160usize;
        let valid_after = U256::from(self.valid_after & MAX_VALIDITY_TIMESTAMP) << 208usize;
        aggregator | valid_until | valid_after
    }

    /// Returns true if the signature was rejected.
    pub fn is_signature_failure(&self) -> bool {
        self.aggregator == SIG_VALIDATION_FAILED
    }

    /// Returns the effective upper bound, treating zero as unbounded.
    pub const fn effective_valid_until(&self) -> u64 {
        if self.valid_until == 0 { MAX_VALIDITY_TIMESTAMP } else { self.valid_until }
    }

    /// Returns true if `now` falls within `(valid_after, valid_until]`.
    pub const fn is_within(&self, now: u64) -> bool {
        now > self.valid_after && now <= self.effective_valid_until()
    }

    /// Intersects two time windows. The aggregator of `self` is kept.
    pub const fn intersect(&self, other: &Self) -> Self {
        let valid_after =
            if self.valid_after > other.valid_after { self.valid_after } else { other.valid_after };
        let (a, b) = (self.effective_valid_until(), other.effective_valid_until());
        let valid_until = if a < b { a } else { b };
        Self { aggregator: self.aggregator, valid_after, valid_until }
    }
}

impl From<U256> for ValidationData {
    fn from(packed: U256) -> Self {
        Self::parse(packed)
    }
}
