//! Core types for ERC-4337 user operations.

use alloy_primitives::{Address, B256, Bytes, ChainId, U256};
use serde::{Deserialize, Serialize};

use crate::{
    error::DecodeError,
    packed::{PackedUserOperation, pack_u128_pair, read_u128, unpack_u128_pair},
};

/// Length of an address prefix in `initCode` and `paymasterAndData`.
const ADDRESS_LEN: usize = 20;

/// Offset of the paymaster verification gas limit in `paymasterAndData`.
const PAYMASTER_VALIDATION_GAS_OFFSET: usize = 20;

/// Offset of the paymaster post-op gas limit in `paymasterAndData`.
const PAYMASTER_POSTOP_GAS_OFFSET: usize = 36;

/// Offset of the paymaster-specific data in `paymasterAndData`.
pub const PAYMASTER_DATA_OFFSET: usize = 52;

/// A 32-byte hash identifying a user operation.
pub type UserOpHash = B256;

/// A user operation in its unpacked (RPC) form.
///
/// `factory`/`factoryData` are the two halves of the packed `initCode`, and the
/// `paymaster*` fields are the parts of the packed `paymasterAndData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The account making the operation.
    pub sender: Address,
    /// Anti-replay key (upper 192 bits) and sequence (lower 64 bits).
    pub nonce: U256,
    /// Factory deploying `sender`, if it does not exist yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// Data passed to the factory.
    #[serde(default)]
    pub factory_data: Bytes,
    /// Data passed to the account's `execute`.
    pub call_data: Bytes,
    /// Gas available to the execution phase.
    pub call_gas_limit: U256,
    /// Gas available to deployment and account validation.
    pub verification_gas_limit: U256,
    /// Fixed overhead charged before any capability runs.
    pub pre_verification_gas: U256,
    /// Maximum fee per gas the signer agrees to pay.
    pub max_fee_per_gas: U256,
    /// Maximum priority fee per gas.
    pub max_priority_fee_per_gas: U256,
    /// Paymaster sponsoring the operation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Gas available to the paymaster's validation.
    #[serde(default)]
    pub paymaster_verification_gas_limit: U256,
    /// Gas available to the paymaster's settlement call.
    #[serde(default)]
    pub paymaster_post_op_gas_limit: U256,
    /// Paymaster-specific data.
    #[serde(default)]
    pub paymaster_data: Bytes,
    /// Account-defined signature.
    pub signature: Bytes,
}

/// Verification and execution gas limits granted to the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountGasLimits {
    /// Gas for deployment and `validateOperation`.
    pub verification_gas_limit: u128,
    /// Gas for `execute`.
    pub call_gas_limit: u128,
}

/// Fee caps agreed by the signer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasFees {
    /// Maximum priority fee per gas.
    pub max_priority_fee_per_gas: u128,
    /// Maximum fee per gas.
    pub max_fee_per_gas: u128,
}

impl GasFees {
    /// Price actually paid per unit of gas at the given base fee.
    ///
    /// Legacy-style operations (`maxFee == maxPriorityFee`) always pay `maxFee`.
    pub const fn effective_gas_price(&self, base_fee: u128) -> u128 {
        if self.max_fee_per_gas == self.max_priority_fee_per_gas {
            return self.max_fee_per_gas;
        }
        let price = base_fee.saturating_add(self.max_priority_fee_per_gas);
        if price < self.max_fee_per_gas { price } else { self.max_fee_per_gas }
    }
}

impl UserOperation {
    /// Returns the packed `initCode` (`factory || factoryData`), empty without a factory.
    pub fn init_code(&self) -> Bytes {
        match self.factory {
            Some(factory) => {
                let mut code = factory.to_vec();
                code.extend_from_slice(&self.factory_data);
                code.into()
            }
            None => Bytes::new(),
        }
    }

    /// Returns the packed `paymasterAndData`, empty without a paymaster.
    pub fn paymaster_and_data(&self) -> Result<Bytes, DecodeError> {
        let Some(paymaster) = self.paymaster else {
            return Ok(Bytes::new());
        };
        let verification =
            fit_u128("paymasterVerificationGasLimit", self.paymaster_verification_gas_limit)?;
        let post_op = fit_u128("paymasterPostOpGasLimit", self.paymaster_post_op_gas_limit)?;

        let mut data = Vec::with_capacity(PAYMASTER_DATA_OFFSET + self.paymaster_data.len());
        data.extend_from_slice(paymaster.as_slice());
        data.extend_from_slice(&verification.to_be_bytes());
        data.extend_from_slice(&post_op.to_be_bytes());
        data.extend_from_slice(&self.paymaster_data);
        Ok(data.into())
    }

    /// Returns the account gas limits, checking they fit their packed width.
    pub fn account_gas_limits(&self) -> Result<AccountGasLimits, DecodeError> {
        Ok(AccountGasLimits {
            verification_gas_limit: fit_u128(
                "verificationGasLimit",
                self.verification_gas_limit,
            )?,
            call_gas_limit: fit_u128("callGasLimit", self.call_gas_limit)?,
        })
    }

    /// Returns the fee caps, checking they fit their packed width.
    pub fn gas_fees(&self) -> Result<GasFees, DecodeError> {
        Ok(GasFees {
            max_priority_fee_per_gas: fit_u128(
                "maxPriorityFeePerGas",
                self.max_priority_fee_per_gas,
            )?,
            max_fee_per_gas: fit_u128("maxFeePerGas", self.max_fee_per_gas)?,
        })
    }

    /// Packs the operation into its on-chain layout.
    ///
    /// Fails if a field does not fit its packed width, or if factory/paymaster
    /// sub-fields are set without their owning address (they would be lost).
    pub fn pack(&self) -> Result<PackedUserOperation, DecodeError> {
        if self.factory.is_none() && !self.factory_data.is_empty() {
            return Err(DecodeError::OrphanFactoryData);
        }
        if self.paymaster.is_none() {
            if !self.paymaster_verification_gas_limit.is_zero() {
                return Err(DecodeError::OrphanPaymasterField("paymasterVerificationGasLimit"));
            }
            if !self.paymaster_post_op_gas_limit.is_zero() {
                return Err(DecodeError::OrphanPaymasterField("paymasterPostOpGasLimit"));
            }
            if !self.paymaster_data.is_empty() {
                return Err(DecodeError::OrphanPaymasterField("paymasterData"));
            }
        }

        let limits = self.account_gas_limits()?;
        let fees = self.gas_fees()?;

        Ok(PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code(),
            callData: self.call_data.clone(),
            accountGasLimits: pack_u128_pair(limits.verification_gas_limit, limits.call_gas_limit),
            preVerificationGas: self.pre_verification_gas,
            gasFees: pack_u128_pair(fees.max_priority_fee_per_gas, fees.max_fee_per_gas),
            paymasterAndData: self.paymaster_and_data()?,
            signature: self.signature.clone(),
        })
    }

    /// Computes the operation hash that accounts sign.
    pub fn hash(&self, entry_point: Address, chain_id: ChainId) -> Result<UserOpHash, DecodeError> {
        Ok(self.pack()?.hash(entry_point, chain_id))
    }

    /// Returns the participant paying for gas: the paymaster if named, else the sender.
    pub fn payer(&self) -> Address {
        self.paymaster.unwrap_or(self.sender)
    }
}

impl TryFrom<PackedUserOperation> for UserOperation {
    type Error = DecodeError;

    fn try_from(packed: PackedUserOperation) -> Result<Self, Self::Error> {
        let (factory, factory_data) = match packed.initCode.len() {
            0 => (None, Bytes::new()),
            len if len < ADDRESS_LEN => return Err(DecodeError::InitCodeTooShort(len)),
            _ => (
                Some(Address::from_slice(&packed.initCode[..ADDRESS_LEN])),
                Bytes::copy_from_slice(&packed.initCode[ADDRESS_LEN..]),
            ),
        };

        let pm = &packed.paymasterAndData;
        let (paymaster, pm_verification, pm_post_op, paymaster_data) = match pm.len() {
            0 => (None, 0, 0, Bytes::new()),
            len if len < PAYMASTER_DATA_OFFSET => {
                return Err(DecodeError::PaymasterDataTooShort(len));
            }
            _ => (
                Some(Address::from_slice(&pm[..ADDRESS_LEN])),
                read_u128(&pm[PAYMASTER_VALIDATION_GAS_OFFSET..PAYMASTER_POSTOP_GAS_OFFSET]),
                read_u128(&pm[PAYMASTER_POSTOP_GAS_OFFSET..PAYMASTER_DATA_OFFSET]),
                Bytes::copy_from_slice(&pm[PAYMASTER_DATA_OFFSET..]),
            ),
        };

        let (verification_gas_limit, call_gas_limit) = unpack_u128_pair(packed.accountGasLimits);
        let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_u128_pair(packed.gasFees);

        Ok(Self {
            sender: packed.sender,
            nonce: packed.nonce,
            factory,
            factory_data,
            call_data: packed.callData,
            call_gas_limit: U256::from(call_gas_limit),
            verification_gas_limit: U256::from(verification_gas_limit),
            pre_verification_gas: packed.preVerificationGas,
            max_fee_per_gas: U256::from(max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(max_priority_fee_per_gas),
            paymaster,
            paymaster_verification_gas_limit: U256::from(pm_verification),
            paymaster_post_op_gas_limit: U256::from(pm_post_op),
            paymaster_data,
            signature: packed.signature,
        })
    }
}

/// Narrows a packed quantity to 16 bytes.
fn fit_u128(field: &'static str, value: U256) -> Result<u128, DecodeError> {
    if value > U256::from(u128::MAX) {
        return Err(DecodeError::FieldOverflow { field, value });
    }
    Ok(value.to::<u128>())
}
