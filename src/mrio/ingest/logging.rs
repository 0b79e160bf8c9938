//! Tracing subscriber setup for binaries and tests that embed the parsers.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::mrio::ingest::error::{IngestError, Result};

/// Installs a global fmt subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| IngestError::Logging(err.to_string()))
}

/// Test variant writing through the libtest capture; repeated calls are no-ops.
pub fn init_test_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mrio_ingest=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
