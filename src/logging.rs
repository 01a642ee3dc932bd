use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fmt;
use std::fs;
use std::sync::Arc;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup logging with a daily rotating file appender and optional console output.
///
/// # Arguments
/// * `log_dir` - Directory for log files (e.g., `~/.wow_sync/logs`)
/// * `log_prefix` - Prefix for log files (e.g., "wowsync")
/// * `debug_mode` - If true, use debug level; otherwise use info level
/// * `console_output` - If true, also log to the console
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging_with_console(
    log_dir: &Utf8Path,
    log_prefix: &str,
    debug_mode: bool,
    console_output: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }

    let file_appender = rolling::daily(log_dir, log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the debug flag when set
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if console_output {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        log_dir,
        log_prefix,
        debug_mode,
        console_output
    );

    Ok(guard)
}

type LogFn = dyn Fn(&str) + Send + Sync;

/// Injected sink for the human readable progress lines of a sync.
///
/// Every line is also forwarded to `tracing` at info level, so a sink that
/// only drives a front end still leaves a record in the log file.
#[derive(Clone)]
pub struct SyncLog {
    sink: Option<Arc<LogFn>>,
}

impl SyncLog {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            sink: Some(Arc::new(sink)),
        }
    }

    /// Only forwards to `tracing`.
    pub fn tracing_only() -> Self {
        Self { sink: None }
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "wowsync::sync", "{}", message);
        if let Some(sink) = &self.sink {
            sink(message);
        }
    }
}

impl Default for SyncLog {
    fn default() -> Self {
        Self::tracing_only()
    }
}

impl fmt::Debug for SyncLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncLog")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
