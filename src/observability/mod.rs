//! Observability subsystem
//!
//! - Structured logging through `tracing`, tagged with a typed [`Event`]
//! - Per-operation [`Diagnostics`] carried on responses and faults
//!
//! Observability is read-only: no control flow depends on it.

mod diagnostics;
mod events;

pub use diagnostics::{AttemptRecord, Diagnostics, MetadataKind, MetadataLookup};
pub use events::Event;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter for the binary
pub const LOG_FILTER_ENV: &str = "AEROLINK_LOG";

/// Install a stderr fmt subscriber.
///
/// The filter comes from `AEROLINK_LOG` when set, else `default_filter`.
/// Calling this twice is harmless; the second install is ignored.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
