//! Versioned wire encoding of user operations and the batch envelope.
//!
//! An encoded operation is a single version byte followed by the ABI encoding of a
//! [`PackedUserOperation`]. A batch is `abi.encode(bytes[])` with one element per
//! encoded operation.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolValue;

use crate::{
    error::DecodeError,
    packed::{PackedUserOperation, unpack_u128_pair},
    types::{GasFees, UserOperation},
};

/// Version byte of the v0.7 packed ABI encoding.
pub const OPERATION_ENCODING_V1: u8 = 0x01;

/// ABI word size.
const WORD: usize = 32;

/// Fields readable from the fixed-size head of a v1 body even when the tail is corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationHeader {
    /// The operation sender.
    pub sender: Address,
    /// Declared pre-verification gas.
    pub pre_verification_gas: U256,
    /// Declared fee caps.
    pub fees: GasFees,
}

/// Encodes an operation with the current encoding version.
pub fn encode_operation(op: &UserOperation) -> Result<Bytes, DecodeError> {
    let body = op.pack()?.abi_encode();
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(OPERATION_ENCODING_V1);
    out.extend_from_slice(&body);
    Ok(out.into())
}

/// Decodes a versioned operation encoding.
pub fn decode_operation(data: &[u8]) -> Result<UserOperation, DecodeError> {
    let (&version, body) = data.split_first().ok_or(DecodeError::Empty)?;
    if version != OPERATION_ENCODING_V1 {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let packed = <PackedUserOperation as SolValue>::abi_decode(body).map_err(DecodeError::abi)?;
    UserOperation::try_from(packed)
}

/// Reads the operation header straight from the head words of a v1 body.
///
/// Returns `None` unless the version is known, the head is complete and the
/// leading offset word points at the struct. Nothing in the dynamic tail is read.
pub fn salvage_header(data: &[u8]) -> Option<OperationHeader> {
    let (&version, body) = data.split_first()?;
    if version != OPERATION_ENCODING_V1 || body.len() < 8 * WORD {
        return None;
    }
    if U256::from_be_slice(&body[..WORD]) != U256::from(WORD) {
        return None;
    }
    let word = |index: usize| &body[index * WORD..(index + 1) * WORD];

    let sender_word = word(1);
    if sender_word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let (max_priority_fee_per_gas, max_fee_per_gas) =
        unpack_u128_pair(B256::from_slice(word(7)));

    Some(OperationHeader {
        sender: Address::from_slice(&sender_word[12..]),
        pre_verification_gas: U256::from_be_slice(word(6)),
        fees: GasFees { max_priority_fee_per_gas, max_fee_per_gas },
    })
}

/// Encodes a batch envelope from already-encoded operations.
pub fn encode_batch(operations: &[Bytes]) -> Bytes {
    operations.to_vec().abi_encode().into()
}

/// Decodes a batch envelope into its encoded operations.
///
/// Individual elements are not decoded; a corrupt element only fails that operation.
pub fn decode_batch(data: &[u8]) -> Result<Vec<Bytes>, DecodeError> {
    <Vec<Bytes> as SolValue>::abi_decode(data).map_err(|err| DecodeError::Envelope(err.to_string()))
}
