use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::application::config::configuration::Configuration;

static LOGGER_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Install the tracing pipeline: stderr fmt layer plus a daily rolling
/// file under `<base>/logs`. Returns false when a subscriber is already
/// installed.
pub fn tracing_subscribe(config: &Configuration) -> bool {
    let env_filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("codesearch=info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let file_appender = tracing_appender::rolling::daily(config.log_dir(), "codesearch.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    _ = LOGGER_GUARD.set(guard);
    let log_writer_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter_layer)
        .with(log_writer_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok()
}
