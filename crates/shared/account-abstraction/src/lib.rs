#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/base/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod encoding;
pub use encoding::{
    OPERATION_ENCODING_V1, OperationHeader, decode_batch, decode_operation, encode_batch,
    encode_operation, salvage_header,
};

pub mod error;
pub use error::DecodeError;

pub mod events;
pub use events::EntryPointEvent;

pub mod packed;
pub use packed::PackedUserOperation;

pub mod types;
pub use types::{AccountGasLimits, GasFees, PAYMASTER_DATA_OFFSET, UserOpHash, UserOperation};

pub mod validation_data;
pub use validation_data::{MAX_VALIDITY_TIMESTAMP, SIG_VALIDATION_FAILED, ValidationData};
