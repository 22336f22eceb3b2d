//! Tracing subscriber set-up for the binary.
//!
//! Output goes to stderr so that command output on stdout stays clean.
//! The filter comes from `JOT_LOG` (standard `EnvFilter` directives) and
//! defaults to `warn`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV_VAR: &str = "JOT_LOG";

/// Filter used when [`LOG_ENV_VAR`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "warn";

/// Builds the filter from [`LOG_ENV_VAR`], falling back to
/// [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber.
///
/// Calling this more than once keeps the first subscriber.
pub fn init() {
    // A second call fails to install and leaves the first one in place.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}
