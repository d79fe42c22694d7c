//! Host execution environment.
//!
//! The host owns contract storage, native balances and the capability registry.
//! All writes are journaled so the entry point can unwind a failed phase with
//! [`Host::revert_to`]. Checkpoints nest: reverting to or committing an outer
//! checkpoint closes every checkpoint taken after it.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, U256};

use crate::{
    capability::{Account, Contract, Factory, Paymaster},
    error::HostError,
};

/// Block-level values visible during a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockEnv {
    /// Block number.
    pub number: u64,
    /// Block timestamp in seconds, checked against validation windows.
    pub timestamp: u64,
    /// Base fee per gas.
    pub base_fee: u128,
}

/// Handle to a journal position returned by [`Host::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    journal_len: usize,
    depth: usize,
}

/// The environment the entry point runs in.
pub trait Host: Send {
    /// Current block environment.
    fn block(&self) -> BlockEnv;

    /// Account capability deployed at `address`.
    fn account(&self, address: Address) -> Option<Arc<dyn Account>>;

    /// Paymaster capability deployed at `address`.
    fn paymaster(&self, address: Address) -> Option<Arc<dyn Paymaster>>;

    /// Factory capability deployed at `address`.
    fn factory(&self, address: Address) -> Option<Arc<dyn Factory>>;

    /// Plain contract deployed at `address`.
    fn contract(&self, address: Address) -> Option<Arc<dyn Contract>>;

    /// Installs an account produced by a factory.
    fn install_account(&mut self, address: Address, account: Arc<dyn Account>)
    -> Result<(), HostError>;

    /// Reads a storage slot.
    fn storage(&self, address: Address, slot: U256) -> U256;

    /// Writes a storage slot.
    fn set_storage(&mut self, address: Address, slot: U256, value: U256);

    /// Native balance of `address`.
    fn balance(&self, address: Address) -> U256;

    /// Moves native value between addresses.
    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), HostError>;

    /// Opens a checkpoint.
    fn checkpoint(&mut self) -> Checkpoint;

    /// Undoes every write since `checkpoint` and closes it.
    fn revert_to(&mut self, checkpoint: Checkpoint);

    /// Keeps every write since `checkpoint` and closes it.
    fn commit(&mut self, checkpoint: Checkpoint);
}

#[derive(Debug)]
enum JournalEntry {
    Storage { address: Address, slot: U256, previous: U256 },
    Balance { address: Address, previous: U256 },
    AccountInstalled { address: Address },
}

/// Reference in-memory host.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    block: BlockEnv,
    accounts: HashMap<Address, Arc<dyn Account>>,
    paymasters: HashMap<Address, Arc<dyn Paymaster>>,
    factories: HashMap<Address, Arc<dyn Factory>>,
    contracts: HashMap<Address, Arc<dyn Contract>>,
    storage: HashMap<(Address, U256), U256>,
    balances: HashMap<Address, U256>,
    journal: Vec<JournalEntry>,
    depth: usize,
}

impl InMemoryHost {
    /// Creates an empty host at the given block.
    pub fn new(block: BlockEnv) -> Self {
        Self { block, ..Default::default() }
    }

    /// Registers an account.
    pub fn with_account(mut self, address: Address, account: Arc<dyn Account>) -> Self {
        self.accounts.insert(address, account);
        self
    }

    /// Registers a paymaster.
    pub fn with_paymaster(mut self, address: Address, paymaster: Arc<dyn Paymaster>) -> Self {
        self.paymasters.insert(address, paymaster);
        self
    }

    /// Registers a factory.
    pub fn with_factory(mut self, address: Address, factory: Arc<dyn Factory>) -> Self {
        self.factories.insert(address, factory);
        self
    }

    /// Registers a plain contract.
    pub fn with_contract(mut self, address: Address, contract: Arc<dyn Contract>) -> Self {
        self.contracts.insert(address, contract);
        self
    }

    /// Sets a native balance outside of any checkpoint.
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.balances.insert(address, balance);
    }

    /// Replaces the block environment.
    pub const fn set_block(&mut self, block: BlockEnv) {
        self.block = block;
    }

    /// Number of open checkpoints.
    pub const fn depth(&self) -> usize {
        self.depth
    }

    fn write_balance(&mut self, address: Address, value: U256) {
        let previous = self.balance(address);
        if self.depth > 0 {
            self.journal.push(JournalEntry::Balance { address, previous });
        }
        self.balances.insert(address, value);
    }
}

impl Host for InMemoryHost {
    fn block(&self) -> BlockEnv {
        self.block
    }

    fn account(&self, address: Address) -> Option<Arc<dyn Account>> {
        self.accounts.get(&address).cloned()
    }

    fn paymaster(&self, address: Address) -> Option<Arc<dyn Paymaster>> {
        self.paymasters.get(&address).cloned()
    }

    fn factory(&self, address: Address) -> Option<Arc<dyn Factory>> {
        self.factories.get(&address).cloned()
    }

    fn contract(&self, address: Address) -> Option<Arc<dyn Contract>> {
        self.contracts.get(&address).cloned()
    }

    fn install_account(
        &mut self,
        address: Address,
        account: Arc<dyn Account>,
    ) -> Result<(), HostError> {
        if self.accounts.contains_key(&address) {
            return Err(HostError::AccountExists(address));
        }
        if self.depth > 0 {
            self.journal.push(JournalEntry::AccountInstalled { address });
        }
        self.accounts.insert(address, account);
        Ok(())
    }

    fn storage(&self, address: Address, slot: U256) -> U256 {
        self.storage.get(&(address, slot)).copied().unwrap_or_default()
    }

    fn set_storage(&mut self, address: Address, slot: U256, value: U256) {
        let previous = self.storage(address, slot);
        if self.depth > 0 {
            self.journal.push(JournalEntry::Storage { address, slot, previous });
        }
        self.storage.insert((address, slot), value);
    }

    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), HostError> {
        let available = self.balance(from);
        if available < value {
            return Err(HostError::InsufficientFunds { address: from, required: value, available });
        }
        if value.is_zero() || from == to {
            return Ok(());
        }
        self.write_balance(from, available - value);
        let credited = self.balance(to) + value;
        self.write_balance(to, credited);
        Ok(())
    }

    fn checkpoint(&mut self) -> Checkpoint {
        let checkpoint = Checkpoint { journal_len: self.journal.len(), depth: self.depth };
        self.depth += 1;
        checkpoint
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.journal_len {
            let Some(entry) = self.journal.pop() else { break };
            match entry {
                JournalEntry::Storage { address, slot, previous } => {
                    self.storage.insert((address, slot), previous);
                }
                JournalEntry::Balance { address, previous } => {
                    self.balances.insert(address, previous);
                }
                JournalEntry::AccountInstalled { address } => {
                    self.accounts.remove(&address);
                }
            }
        }
        self.depth = checkpoint.depth;
    }

    fn commit(&mut self, checkpoint: Checkpoint) {
        self.depth = checkpoint.depth;
        if self.depth == 0 {
            self.journal.clear();
        }
    }
}
