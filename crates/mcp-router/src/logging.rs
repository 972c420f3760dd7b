//! Tracing subscriber setup.
//!
//! Hosts that already install their own subscriber can skip this module; the
//! router only emits `tracing` events.

use crate::config::RouterConfig;
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` when set and valid, otherwise the
/// configured default.
pub fn env_filter(config: &RouterConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a global formatting subscriber.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
///
/// # Examples
///
/// ```
/// use mcp_router::config::RouterConfig;
/// use mcp_router::logging;
///
/// let config = RouterConfig::builder().log_filter("mcp_router=debug").build();
/// logging::init(&config);
/// // A second call is harmless.
/// assert!(!logging::init(&config));
/// ```
pub fn init(config: &RouterConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(false)
        .try_init()
        .is_ok()
}
