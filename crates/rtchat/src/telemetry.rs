//! Tracing subscriber setup for applications built on rtchat.
//!
//! The library crates only emit `tracing` events; installing a subscriber
//! is the application's call. These helpers install a `fmt` subscriber
//! filtered by `RUST_LOG`, falling back to the given default directive.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber.
///
/// # Panics
/// Panics if a global subscriber is already installed.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(fmt::layer().with_target(true))
        .init();
}

/// Installs the global subscriber unless one is already set.
///
/// Safe to call more than once; later calls return
/// [`TracingError::AlreadyInitialized`].
pub fn try_init_tracing(default_filter: &str) -> Result<(), TracingError> {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}
