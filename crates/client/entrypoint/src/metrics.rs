//! Metrics emitted by the entry point.

use alloy_primitives::U256;

/// Metrics container with constants for Prometheus metric collection.
///
/// # Usage
///
/// ```rust,ignore
/// use metrics::counter;
/// use base_entrypoint::Metrics;
///
/// counter!(Metrics::OPERATIONS, "outcome" => Metrics::SUCCESS_LABEL).increment(1);
/// ```
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Identifier for the counter of processed batches.
    pub const BATCHES: &str = "base_entrypoint_batches";
    /// Identifier for the counter of rejected batches.
    pub const BATCHES_REJECTED: &str = "base_entrypoint_batches_rejected";

    /// Identifier for the counter of processed operations, labelled by outcome.
    pub const OPERATIONS: &str = "base_entrypoint_operations";
    /// Successful operation label.
    pub const SUCCESS_LABEL: &str = "success";

    /// Identifier for the histogram of gas charged per operation.
    pub const OPERATION_GAS_USED: &str = "base_entrypoint_operation_gas_used";

    /// Identifier for the counter of gwei paid to collectors.
    pub const GAS_COLLECTED: &str = "base_entrypoint_gas_collected_gwei";

    /// Identifier for the counter of settlements where the cost exceeded the prefund.
    pub const PAYMENT_FAILURES: &str = "base_entrypoint_payment_failures";

    /// Describes the metrics and initializes counters to zero.
    pub fn init() {
        Self::describe();
        Self::zero();
    }

    /// Describes metrics used in [`base_entrypoint`][crate].
    pub fn describe() {
        metrics::describe_counter!(Self::BATCHES, metrics::Unit::Count, "Batches processed");
        metrics::describe_counter!(
            Self::BATCHES_REJECTED,
            metrics::Unit::Count,
            "Batches rejected before processing"
        );
        metrics::describe_counter!(Self::OPERATIONS, metrics::Unit::Count, "Operations by outcome");
        metrics::describe_histogram!(Self::OPERATION_GAS_USED, "Gas charged per operation");
        metrics::describe_counter!(Self::GAS_COLLECTED, "Gas cost paid to collectors, in gwei");
        metrics::describe_counter!(
            Self::PAYMENT_FAILURES,
            metrics::Unit::Count,
            "Operations whose actual cost exceeded the prefund"
        );
    }

    /// Initializes counters to `0` so they can be queried immediately.
    pub fn zero() {
        metrics::counter!(Self::BATCHES).absolute(0);
        metrics::counter!(Self::BATCHES_REJECTED).absolute(0);
        metrics::counter!(Self::OPERATIONS, "outcome" => Self::SUCCESS_LABEL).absolute(0);
        metrics::counter!(Self::GAS_COLLECTED).absolute(0);
        metrics::counter!(Self::PAYMENT_FAILURES).absolute(0);
    }
}

/// Converts a wei amount to whole gwei for the collected-gas counter.
pub(crate) fn wei_to_gwei(wei: U256) -> u64 {
    (wei / U256::from(WEI_PER_GWEI)).saturating_to()
}

const WEI_PER_GWEI: u64 = 1_000_000_000;
