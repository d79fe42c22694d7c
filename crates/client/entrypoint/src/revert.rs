//! Revert payload encoding and decoding.
//!
//! Capabilities fail with raw revert bytes. These are decoded only for logging
//! and error messages; results and events always carry the raw payload.

use std::fmt;

use alloy_primitives::{Bytes, U256, hex};
use alloy_sol_types::{SolError, sol};

sol! {
    /// Standard Solidity Error(string)
    #[derive(Debug)]
    error Error(string message);

    /// Standard Solidity Panic(uint256)
    #[derive(Debug)]
    error Panic(uint256 code);
}

/// Encodes `Error(message)` revert data.
pub fn revert_message(message: &str) -> Bytes {
    Error { message: message.to_string() }.abi_encode().into()
}

/// Truncates a revert payload to `max` bytes.
pub fn truncate_revert(data: &Bytes, max: usize) -> Bytes {
    if data.len() <= max { data.clone() } else { data.slice(..max) }
}

/// Decoded revert payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// Revert without data, typically out of gas.
    Empty,
    /// Standard Solidity revert with message
    Message(String),
    /// Solidity panic (assert failure, division by zero, etc.)
    Panic(PanicCode),
    /// Unknown revert that couldn't be decoded
    Unknown(Bytes),
}

impl RevertReason {
    /// Decodes raw revert data.
    pub fn decode(data: &Bytes) -> Self {
        if data.is_empty() {
            return Self::Empty;
        }
        if let Ok(err) = Error::abi_decode(data) {
            return Self::Message(err.message);
        }
        if let Ok(panic) = Panic::abi_decode(data) {
            return Self::Panic(PanicCode::from_code(panic.code));
        }
        Self::Unknown(data.clone())
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty revert"),
            Self::Message(msg) => write!(f, "Revert: {msg}"),
            Self::Panic(code) => write!(f, "Panic: {code}"),
            Self::Unknown(data) => write!(f, "Unknown revert: 0x{}", hex::encode(data)),
        }
    }
}

/// Solidity panic codes
///
/// See: https://docs.soliditylang.org/en/latest/control-structures.html#panic-via-assert-and-error-via-require
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicCode {
    /// Generic compiler inserted panic
    Generic,
    /// Assert failed
    AssertFailed,
    /// Arithmetic overflow/underflow
    ArithmeticOverflow,
    /// Division by zero
    DivisionByZero,
    /// Array index out of bounds
    ArrayOutOfBounds,
    /// Out of memory
    OutOfMemory,
    /// Unknown panic code
    Unknown(U256),
}

impl PanicCode {
    /// Create from a uint256 panic code
    pub fn from_code(code: U256) -> Self {
        match code.saturating_to::<u64>() {
            0x00 => Self::Generic,
            0x01 => Self::AssertFailed,
            0x11 => Self::ArithmeticOverflow,
            0x12 => Self::DivisionByZero,
            0x32 => Self::ArrayOutOfBounds,
            0x41 => Self::OutOfMemory,
            _ => Self::Unknown(code),
        }
    }
}

impl fmt::Display for PanicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => write!(f, "generic panic"),
            Self::AssertFailed => write!(f, "assert failed"),
            Self::ArithmeticOverflow => write!(f, "arithmetic overflow/underflow"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::ArrayOutOfBounds => write!(f, "array index out of bounds"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Unknown(code) => write!(f, "unknown panic code: {code}"),
        }
    }
}
