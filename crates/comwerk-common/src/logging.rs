//! Logging setup

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::BridgeConfig;

/// Install a fmt subscriber. `RUST_LOG` takes precedence over `config.log_filter`.
///
/// Safe to call more than once; returns `false` if a global subscriber was already set.
pub fn init(config: &BridgeConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let directives = filter.to_string();

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .is_ok();
    if installed {
        debug!("Logging initialized with filter {}", directives);
    }
    installed
}
