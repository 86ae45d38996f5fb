//! Log output for the worker host.
//!
//! Events are filtered through `RUST_LOG` (default `info`) and printed by a
//! human-readable `fmt` layer. Worker threads log through the same subscriber:
//! the pool captures the dispatcher that is active when it is created, so
//! [`init_telemetry`] must run before the pool is built.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;

    Ok(())
}
