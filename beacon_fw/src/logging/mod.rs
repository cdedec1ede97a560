// src/logging/mod.rs
//! Process-wide tracing setup plus the on-device point log.
pub mod store;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::errors::BeaconError;

const DEFAULT_FILTER: &str = "beacon_fw=info,cinet_protocol=info,tokio=warn";

/// Console output always; a daily-rolled `beacon.log` too when `log_dir` is
/// given. Keep the guard alive for as long as the file should be written.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, BeaconError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer().compact().with_target(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "beacon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| BeaconError::Logging(e.to_string()))?;
    Ok(guard)
}
