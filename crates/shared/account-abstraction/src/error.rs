//! Errors raised while decoding or packing a user operation.

use alloy_primitives::U256;
use thiserror::Error;

/// Errors that make a user operation structurally invalid.
///
/// These are detected before any account, paymaster or ledger state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The encoding carried no bytes at all.
    #[error("empty operation encoding")]
    Empty,

    /// The leading version byte is not a known encoding version.
    #[error("unsupported operation encoding version {0:#04x}")]
    UnsupportedVersion(u8),

    /// The ABI body could not be decoded into a packed user operation.
    #[error("invalid ABI body: {0}")]
    Abi(String),

    /// A gas limit or fee does not fit the 16 bytes it is packed into.
    #[error("{field} value {value} does not fit in 16 bytes")]
    FieldOverflow {
        /// Name of the offending field.
        field: &'static str,
        /// The value that overflowed.
        value: U256,
    },

    /// `initCode` is neither empty nor long enough to hold a factory address.
    #[error("initCode must be empty or at least 20 bytes, got {0}")]
    InitCodeTooShort(usize),

    /// `paymasterAndData` is neither empty nor long enough for address and gas limits.
    #[error("paymasterAndData must be empty or at least 52 bytes, got {0}")]
    PaymasterDataTooShort(usize),

    /// A paymaster-only field is set while no paymaster is named.
    #[error("{0} is set without a paymaster")]
    OrphanPaymasterField(&'static str),

    /// `factoryData` is set while no factory is named.
    #[error("factoryData is set without a factory")]
    OrphanFactoryData,

    /// A gas limit exceeds the protocol-wide maximum.
    #[error("{field} {value} exceeds protocol maximum {max}")]
    GasLimitTooHigh {
        /// Name of the offending field.
        field: &'static str,
        /// The declared value.
        value: U256,
        /// The protocol maximum.
        max: u64,
    },

    /// The batch envelope itself is corrupt.
    #[error("invalid batch envelope: {0}")]
    Envelope(String),
}

impl DecodeError {
    /// Wraps an ABI decoding error.
    pub fn abi(err: alloy_sol_types::Error) -> Self {
        Self::Abi(err.to_string())
    }
}
