//! Builder for user operations with sensible test defaults.

use alloy_primitives::{Address, Bytes, ChainId, U256};
use alloy_signer::SignerSync;
use base_account_abstraction::UserOperation;
use base_entrypoint::nonce::join_nonce;

/// One gwei in wei.
pub const GWEI: u128 = 1_000_000_000;

/// Default `callGasLimit`.
pub const DEFAULT_CALL_GAS: u64 = 200_000;
/// Default `verificationGasLimit`.
pub const DEFAULT_VERIFICATION_GAS: u64 = 150_000;
/// Default `preVerificationGas`.
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 21_000;
/// Default paymaster verification and post-op limits.
pub const DEFAULT_PAYMASTER_GAS: u64 = 60_000;

/// Builds [`UserOperation`]s field by field.
#[derive(Debug, Clone)]
pub struct UserOperationBuilder {
    op: UserOperation,
}

impl UserOperationBuilder {
    /// Starts an operation from `sender` with default limits and a 1 gwei fee.
    pub fn new(sender: Address) -> Self {
        Self {
            op: UserOperation {
                sender,
                call_gas_limit: U256::from(DEFAULT_CALL_GAS),
                verification_gas_limit: U256::from(DEFAULT_VERIFICATION_GAS),
                pre_verification_gas: U256::from(DEFAULT_PRE_VERIFICATION_GAS),
                max_fee_per_gas: U256::from(GWEI),
                max_priority_fee_per_gas: U256::from(GWEI),
                ..Default::default()
            },
        }
    }

    /// Sets the full nonce.
    pub fn nonce(mut self, nonce: U256) -> Self {
        self.op.nonce = nonce;
        self
    }

    /// Sets the nonce from a key and sequence.
    pub fn keyed_nonce(mut self, key: U256, sequence: u64) -> Self {
        self.op.nonce = join_nonce(key, sequence);
        self
    }

    /// Sets the account call data.
    pub fn call_data(mut self, call_data: Bytes) -> Self {
        self.op.call_data = call_data;
        self
    }

    /// Deploys the sender through `factory`.
    pub fn factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.op.factory = Some(factory);
        self.op.factory_data = factory_data;
        self
    }

    /// Names a paymaster with the default gas limits.
    pub fn paymaster(mut self, paymaster: Address) -> Self {
        self.op.paymaster = Some(paymaster);
        self.op.paymaster_verification_gas_limit = U256::from(DEFAULT_PAYMASTER_GAS);
        self.op.paymaster_post_op_gas_limit = U256::from(DEFAULT_PAYMASTER_GAS);
        self
    }

    /// Sets the paymaster-specific data.
    pub fn paymaster_data(mut self, data: Bytes) -> Self {
        self.op.paymaster_data = data;
        self
    }

    /// Sets the paymaster verification and post-op limits.
    pub fn paymaster_gas(mut self, verification: u64, post_op: u64) -> Self {
        self.op.paymaster_verification_gas_limit = U256::from(verification);
        self.op.paymaster_post_op_gas_limit = U256::from(post_op);
        self
    }

    /// Sets `callGasLimit`.
    pub fn call_gas(mut self, gas: u64) -> Self {
        self.op.call_gas_limit = U256::from(gas);
        self
    }

    /// Sets `verificationGasLimit`.
    pub fn verification_gas(mut self, gas: u64) -> Self {
        self.op.verification_gas_limit = U256::from(gas);
        self
    }

    /// Sets `preVerificationGas`.
    pub fn pre_verification_gas(mut self, gas: u64) -> Self {
        self.op.pre_verification_gas = U256::from(gas);
        self
    }

    /// Sets both fee caps.
    pub fn fees(mut self, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        self.op.max_fee_per_gas = U256::from(max_fee_per_gas);
        self.op.max_priority_fee_per_gas = U256::from(max_priority_fee_per_gas);
        self
    }

    /// Sets a raw signature.
    pub fn signature(mut self, signature: Bytes) -> Self {
        self.op.signature = signature;
        self
    }

    /// Returns the operation as built, without signing it.
    pub fn build(self) -> UserOperation {
        self.op
    }

    /// Signs the operation hash with an EIP-191 personal signature.
    pub fn sign(
        self,
        signer: &impl SignerSync,
        entry_point: Address,
        chain_id: ChainId,
    ) -> UserOperation {
        let mut op = self.op;
        let hash = op.hash(entry_point, chain_id).expect("operation fields fit their packing");
        let signature = signer.sign_message_sync(hash.as_slice()).expect("signing should succeed");
        op.signature = Bytes::copy_from_slice(&signature.as_bytes());
        op
    }
}
