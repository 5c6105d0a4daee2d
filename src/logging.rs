//! Tracing setup: env-filtered, written to a daily rolling file.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
  filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Environment variable holding the filter directives, e.g. `flick=debug`.
pub const LOG_ENV: &str = "FLICK_LOG";

/// Install the global subscriber. Logs go to `<log_dir>/flick.log.<date>`
/// so they never interleave with command output.
///
/// Keep the returned guard alive for the lifetime of the process; dropping
/// it flushes and stops the background writer.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "flick.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .with_env_var(LOG_ENV)
    .from_env_lossy();

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
