#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/base/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod capability;
pub use capability::{
    Account, CallContext, CallError, CallFrame, CallResult, Contract, Deployment, EcdsaVerifier,
    Factory, Paymaster, SignatureVerifier, Sponsorship,
};

mod config;
pub use config::{ConfigError, ENTRYPOINT_V07_ADDRESS, EntryPointConfig};

mod dispatcher;
pub use dispatcher::{
    BatchResult, EntryPoint, OperationOutcome, OperationState, ValidationResult,
};

mod error;
pub use error::{BatchError, Entity, HostError, LedgerError, OperationError};

pub mod gas;
pub use gas::{GasLimits, GasMeter};

pub mod host;
pub use host::{BlockEnv, Checkpoint, Host, InMemoryHost};

mod ledger;
pub use ledger::{DepositLedger, StakeInfo};

mod metrics;
pub use metrics::Metrics;

pub mod nonce;
pub use nonce::NonceManager;

pub mod revert;
pub use revert::{PanicCode, RevertReason};

mod service;
pub use service::EntryPointService;

mod state;
pub use state::EntryPointState;
