//! Process-wide tracing setup for binaries and test harnesses embedding the
//! cache.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the host. `RUST_LOG` takes precedence over the
//! default directive.

use phealth_error::{HealthError, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "phealth=info,phealth_cache=info,warn";

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Build the filter: `RUST_LOG` if set, otherwise `default_directive`.
pub fn env_filter(default_directive: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directive)
        .map_err(|err| HealthError::config(format!("invalid log directive {default_directive:?}: {err}")))
}

/// Install the global subscriber.
///
/// Fails with [`HealthError::Config`] when the directive does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(default_directive: &str, format: LogFormat) -> Result<()> {
    let filter = env_filter(default_directive)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    installed.map_err(|err| HealthError::config(format!("cannot install tracing subscriber: {err}")))
}
