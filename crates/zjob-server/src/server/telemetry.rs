//! Console logging for the broker.
//!
//! Logs go through a `tracing_subscriber` registry: an [`EnvFilter`] read from
//! `RUST_LOG` (default `info`) and a human-readable `fmt` layer stamped with
//! thread ids, so per-worker activity is easy to tell apart.
//!
//! ```bash
//! RUST_LOG=zjob=debug cargo run --bin zjob-server
//! ```
//!
//! `--log-format compact` trades the multi-line pretty output for one line per
//! event.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::server::config::LogFormat;

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_file(true);

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Compact => registry.with(layer.compact()).try_init()?,
    }

    Ok(())
}
