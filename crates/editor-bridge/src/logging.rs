use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` or `info`.
///
/// Safe to call more than once; only the first call has an effect, and a
/// subscriber installed by the host takes precedence.
pub fn init() {
    init_with_default("info");
}

pub fn init_with_default(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = fmt().with_env_filter(filter).with_target(true).try_init();
    });
}
