/*
 * ERC-4337 v0.7 PackedUserOperation and hash calculation
 *
 * 1. Hash variable-length fields: initCode, callData, paymasterAndData
 * 2. Pack all fields into struct (hashes from step 1, accountGasLimits and gasFees as bytes32)
 * 3. encodedHash = keccak256(abi.encode(packed struct))
 * 4. final hash = keccak256(abi.encode(encodedHash, entryPoint, chainId))
 *
 * Field order and widths are part of the signed payload. Changing either changes every
 * operation hash, so any change must ship as a new encoding version.
 */
use alloy_primitives::{Address, B256, ChainId, U256, keccak256};
use alloy_sol_types::{SolValue, sol};

sol! {
    /// On-chain `PackedUserOperation` for EntryPoint v0.7.
    ///
    /// Gas limits and fees are packed two per `bytes32`:
    /// `accountGasLimits = verificationGasLimit(16) | callGasLimit(16)`,
    /// `gasFees = maxPriorityFeePerGas(16) | maxFeePerGas(16)`.
    #[derive(Default, Debug, PartialEq, Eq)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    #[allow(missing_docs)]
    #[derive(Default, Debug, PartialEq, Eq)]
    struct UserOperationPackedForHash {
        address sender;
        uint256 nonce;
        bytes32 hashInitCode;
        bytes32 hashCallData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 hashPaymasterAndData;
    }

    #[allow(missing_docs)]
    #[derive(Default, Debug, PartialEq, Eq)]
    struct UserOperationHashEncoded {
        bytes32 encodedHash;
        address entryPoint;
        uint256 chainId;
    }
}

impl From<&PackedUserOperation> for UserOperationPackedForHash {
    fn from(op: &PackedUserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            hashInitCode: keccak256(&op.initCode),
            hashCallData: keccak256(&op.callData),
            accountGasLimits: op.accountGasLimits,
            preVerificationGas: op.preVerificationGas,
            gasFees: op.gasFees,
            hashPaymasterAndData: keccak256(&op.paymasterAndData),
        }
    }
}

impl PackedUserOperation {
    /// Computes the operation hash for the given entry point and chain.
    ///
    /// The signature is not part of the hash.
    pub fn hash(&self, entry_point: Address, chain_id: ChainId) -> B256 {
        let packed = UserOperationPackedForHash::from(self);
        let encoded = UserOperationHashEncoded {
            encodedHash: keccak256(packed.abi_encode()),
            entryPoint: entry_point,
            chainId: U256::from(chain_id),
        };
        keccak256(encoded.abi_encode())
    }
}

/// Packs two 16-byte quantities into one word, `high` first.
pub fn pack_u128_pair(high: u128, low: u128) -> B256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    B256::from(word)
}

/// Splits a word into its high and low 16-byte halves.
pub fn unpack_u128_pair(word: B256) -> (u128, u128) {
    (read_u128(&word[..16]), read_u128(&word[16..]))
}

/// Reads a big-endian `u128` from a 16-byte slice.
pub(crate) fn read_u128(bytes: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&bytes[..16]);
    u128::from_be_bytes(buf)
}
