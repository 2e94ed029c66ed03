//! Logging setup.
//!
//! Logs go to **stderr**: stdout belongs to the host tool's plugin protocol.
//! Every poll round of a check workflow is logged at `info` with the
//! workflow id, so `RUST_LOG=info` is enough to follow a long check.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (e.g., `info`, `debug`, `apollo_studio_provider=debug`)
//!
//! # Examples
//!
//! ```bash
//! # Follow check workflows
//! RUST_LOG=info ./terraform-provider-apollostudio
//!
//! # Log every GraphQL request this crate sends
//! RUST_LOG=apollo_studio_provider::client=debug ./terraform-provider-apollostudio
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the global subscriber, filtered by `RUST_LOG` (default `info`).
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Like [`init_logging`], with a custom level used when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to install the global subscriber. Returns `false` if one was already
/// set, which makes it safe to call from tests.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter(DEFAULT_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}
