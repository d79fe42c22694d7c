#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/base/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

/// Convenience types and helpers for working with deterministic test accounts.
pub mod accounts;
pub use accounts::{ALICE, BOB, CHARLIE, DEPLOYER, TestAccount, TestAccounts};

/// Builder for signed user operations.
pub mod builder;
pub use builder::{GWEI, UserOperationBuilder};

/// Reference accounts, paymasters, factories and contracts.
pub mod contracts;
pub use contracts::{
    Behavior, Call, Counter, MisbehavingAccount, MisbehavingPaymaster, PolicyPaymaster,
    SimpleAccount, SimpleAccountFactory,
};

/// High-level facade over an entry point, its state and host.
pub mod harness;
pub use harness::{COLLECTOR, COUNTER, ETHER, FACTORY, GENESIS_BLOCK, PAYMASTER, TestHarness};

/// Lightweight tracing initialization helpers for tests.
pub mod tracing;
pub use tracing::init_test_tracing;
