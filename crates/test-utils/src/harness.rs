//! Test harness bundling an entry point, its state and an in-memory host.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256, address};
use base_account_abstraction::UserOperation;
use base_entrypoint::{
    Account, BatchResult, BlockEnv, EntryPoint, EntryPointConfig, EntryPointService,
    EntryPointState, Host, InMemoryHost, Paymaster,
};

use crate::{
    accounts::{DEPLOYER, TestAccount, TestAccounts},
    builder::UserOperationBuilder,
    contracts::{Counter, SimpleAccount, SimpleAccountFactory},
};

/// Address of the [`Counter`] contract.
pub const COUNTER: Address = address!("00000000000000000000000000000000000c0de1");
/// Address of the [`SimpleAccountFactory`].
pub const FACTORY: Address = address!("00000000000000000000000000000000000fac70");
/// Default paymaster address.
pub const PAYMASTER: Address = address!("00000000000000000000000000000000000000aa");
/// Default beneficiary of collected gas.
pub const COLLECTOR: Address = address!("00000000000000000000000000000000000000c0");

/// One ether in wei.
pub const ETHER: u128 = 1_000_000_000_000_000_000;

/// Block every harness starts at.
pub const GENESIS_BLOCK: BlockEnv =
    BlockEnv { number: 1, timestamp: 1_700_000_000, base_fee: 0 };

/// An entry point with a counter and a factory already deployed.
///
/// The deployer account holds enough native balance to fund every deposit and
/// stake a test makes.
#[derive(Debug)]
pub struct TestHarness {
    /// The entry point under test.
    pub entry_point: EntryPoint,
    /// Deposits, stakes and nonces.
    pub state: EntryPointState,
    /// The host the entry point runs in.
    pub host: InMemoryHost,
    accounts: TestAccounts,
}

impl TestHarness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EntryPointConfig::default())
    }

    /// Creates a harness with `config`.
    pub fn with_config(config: EntryPointConfig) -> Self {
        let entry_point = EntryPoint::new(config).expect("test config should be valid");
        let mut host = InMemoryHost::new(GENESIS_BLOCK)
            .with_contract(COUNTER, Arc::new(Counter))
            .with_factory(FACTORY, Arc::new(SimpleAccountFactory::new(FACTORY)));
        host.set_balance(DEPLOYER.address, U256::from(1_000_000 * ETHER));
        Self { entry_point, state: EntryPointState::default(), host, accounts: TestAccounts::new() }
    }

    /// The fixed test accounts.
    pub const fn accounts(&self) -> &TestAccounts {
        &self.accounts
    }

    /// Address of the entry point.
    pub const fn entry_point_address(&self) -> Address {
        self.entry_point.address()
    }

    /// Address the factory deploys for `owner` with salt zero.
    pub fn counterfactual_address(&self, owner: &TestAccount) -> Address {
        SimpleAccountFactory::new(FACTORY).get_address(owner.address, U256::ZERO)
    }

    /// Deploys a [`SimpleAccount`] owned by `owner` and returns its address.
    pub fn deploy_account(&mut self, owner: &TestAccount) -> Address {
        let address = self.counterfactual_address(owner);
        self.install_account(address, Arc::new(SimpleAccount::new(owner.address)));
        address
    }

    /// Registers an arbitrary account.
    pub fn install_account(&mut self, address: Address, account: Arc<dyn Account>) {
        self.host = std::mem::take(&mut self.host).with_account(address, account);
    }

    /// Registers a paymaster without staking or funding it.
    pub fn install_paymaster(&mut self, address: Address, paymaster: Arc<dyn Paymaster>) {
        self.host = std::mem::take(&mut self.host).with_paymaster(address, paymaster);
    }

    /// Registers a paymaster, stakes it with the configured minimum and funds its deposit.
    pub fn register_paymaster(
        &mut self,
        address: Address,
        paymaster: Arc<dyn Paymaster>,
        deposit: U256,
    ) {
        self.install_paymaster(address, paymaster);
        let config = self.entry_point.config();
        let (stake, delay) = (config.min_stake, config.min_unstake_delay_sec);
        self.fund(address, stake);
        self.entry_point
            .add_stake(&mut self.state, &mut self.host, address, stake, delay)
            .expect("paymaster should be stakeable");
        self.deposit(address, deposit);
    }

    /// Sets a native balance.
    pub fn fund(&mut self, address: Address, amount: U256) {
        self.host.set_balance(address, amount);
    }

    /// Deposits `amount` for `account`, paid by the deployer.
    pub fn deposit(&mut self, account: Address, amount: U256) {
        self.entry_point
            .deposit_to(&mut self.state, &mut self.host, DEPLOYER.address, account, amount)
            .expect("deployer should cover deposits");
    }

    /// Deposit of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.state.deposits.balance_of(account)
    }

    /// Moves the block forward to `timestamp`.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        let mut block = self.host.block();
        block.timestamp = timestamp;
        block.number += 1;
        self.host.set_block(block);
    }

    /// Starts an operation from `sender`.
    pub fn op(&self, sender: Address) -> UserOperationBuilder {
        UserOperationBuilder::new(sender)
    }

    /// Signs `builder` with `owner` for this entry point.
    pub fn sign(&self, builder: UserOperationBuilder, owner: &TestAccount) -> UserOperation {
        let config = self.entry_point.config();
        builder.sign(&owner.signer(), config.entry_point, config.chain_id)
    }

    /// A signed operation incrementing the counter.
    pub fn increment_op(&self, sender: Address, owner: &TestAccount, nonce: u64) -> UserOperation {
        let call = SimpleAccount::execute_call(COUNTER, U256::ZERO, Counter::increment_call());
        self.sign(self.op(sender).nonce(U256::from(nonce)).call_data(call), owner)
    }

    /// Processes `ops` with [`COLLECTOR`] as beneficiary.
    pub fn process(&mut self, ops: &[UserOperation]) -> BatchResult {
        self.entry_point
            .process_batch(&mut self.state, &mut self.host, ops, COLLECTOR)
            .expect("batch with a valid collector should be processed")
    }

    /// Processes an encoded envelope with [`COLLECTOR`] as beneficiary.
    pub fn process_encoded(&mut self, envelope: &Bytes) -> BatchResult {
        self.entry_point
            .process_encoded_batch(&mut self.state, &mut self.host, envelope, COLLECTOR)
            .expect("envelope should decode")
    }

    /// Current counter value.
    pub fn counter(&self) -> U256 {
        Counter::count(&self.host, COUNTER)
    }

    /// Native balance of `address`.
    pub fn native_balance(&self, address: Address) -> U256 {
        self.host.balance(address)
    }

    /// Native balance held by the entry point minus everything it owes.
    ///
    /// Panics if the entry point owes more than it holds.
    pub fn surplus(&self) -> U256 {
        let held = self.host.balance(self.entry_point_address());
        let owed = self.state.deposits.total_held();
        assert!(held >= owed, "entry point insolvent: holds {held}, owes {owed}");
        held - owed
    }

    /// Moves everything into a shared [`EntryPointService`].
    pub fn into_service(self) -> EntryPointService<InMemoryHost> {
        EntryPointService::new(self.entry_point, self.state, self.host)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
