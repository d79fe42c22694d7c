use std::sync::Once;

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static INIT: Once = Once::new();

/// Initializes tracing for tests, honouring `RUST_LOG`.
///
/// Repeated calls are cheap and only the first one installs the subscriber.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
