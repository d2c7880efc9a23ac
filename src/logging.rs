//! Logging setup for applications built on this crate.
//!
//! The client itself only emits `tracing` events; installing a subscriber is
//! left to the application. These helpers cover the common case.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "COUCHDB_LOG";

/// Install a formatting subscriber filtered by `COUCHDB_LOG`.
///
/// ```ignore
/// couchdb_http::logging::init_logging();
/// ```
///
/// `COUCHDB_LOG` accepts any `EnvFilter` directive:
/// - `COUCHDB_LOG=warn` - Retries and failures only
/// - `COUCHDB_LOG=info` - Database creation/deletion (default)
/// - `COUCHDB_LOG=debug` - Every request, feed and page
/// - `COUCHDB_LOG=couchdb_http=trace,reqwest=debug` - Per-crate levels
///
/// Panics if a global subscriber is already installed.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter);
}

/// Install a formatting subscriber with a fixed filter.
pub fn init_logging_with_level(level: &str) {
    install(EnvFilter::new(level));
}

fn install(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
