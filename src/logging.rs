//! Tracing/logging configuration for sigproxy
//!
//! Supports:
//! - Multiple verbosity levels: default (INFO), debug, quiet (ERROR), silent (off)
//! - Pretty (colored), compact, or JSON output formats
//! - File logging at DEBUG level while terminal shows configured level

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer, Registry,
};

/// Log output format
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Colored human-readable output
    #[default]
    Pretty,
    /// Structured JSON output (one JSON object per line)
    Json,
    /// Compact single-line format
    Compact,
}

/// Logging CLI flags, flattened into every subcommand
#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// Enable debug-level logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log errors
    #[arg(long, global = true, conflicts_with = "debug")]
    pub quiet: bool,

    /// Disable terminal logging entirely
    #[arg(long, global = true, conflicts_with_all = ["debug", "quiet"])]
    pub silent: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write DEBUG-level logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl LogArgs {
    pub fn to_config(&self) -> TracingConfig {
        TracingConfig {
            debug: self.debug,
            quiet: self.quiet,
            silent: self.silent,
            format: self.log_format.clone(),
            log_file: self.log_file.clone(),
        }
    }
}

/// Tracing configuration built from CLI args
pub struct TracingConfig {
    /// Debug mode (DEBUG level)
    pub debug: bool,
    /// Quiet mode (ERROR only)
    pub quiet: bool,
    /// Silent mode (no terminal output)
    pub silent: bool,
    /// Output format
    pub format: LogFormat,
    /// Optional log file path (writes DEBUG+ regardless of terminal level)
    pub log_file: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            quiet: false,
            silent: false,
            format: LogFormat::Pretty,
            log_file: None,
        }
    }
}

/// Global flag to track if tracing has been initialized
static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Boxed layer type alias for Registry
type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Create a boxed terminal layer with the given format and filter
fn make_terminal_layer(format: &LogFormat, filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn make_filter(level: Level, cli_specified: bool) -> EnvFilter {
    let default = || EnvFilter::new(format!("sigproxy={},warn", level.as_str().to_lowercase()));
    if cli_specified {
        // CLI args were explicitly set - use them, ignore RUST_LOG
        default()
    } else {
        // No CLI args - fall back to RUST_LOG if set, otherwise use default level
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default())
    }
}

/// Initialize tracing with the given configuration.
///
/// This should be called early in main() after CLI args are parsed.
/// If called multiple times, subsequent calls are ignored.
pub fn init_tracing(config: TracingConfig) {
    // Only initialize once
    if TRACING_INITIALIZED.get().is_some() {
        return;
    }

    let terminal_level = if config.silent {
        None
    } else if config.quiet {
        Some(Level::ERROR)
    } else if config.debug {
        Some(Level::DEBUG)
    } else {
        Some(Level::INFO)
    };

    // Check if any CLI logging flag was explicitly set
    let cli_log_level_specified = config.debug || config.quiet || config.silent;

    // Collect layers into a Vec so we can add them all at once
    let mut layers: Vec<BoxedLayer> = Vec::new();

    // Handle file logging if configured
    if let Some(log_path) = &config.log_file {
        match std::fs::File::create(log_path) {
            Ok(file) => {
                // File layer - DEBUG level, no ANSI colors
                let file_layer: BoxedLayer = fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(file)
                    .with_filter(EnvFilter::new("sigproxy=debug,warn"))
                    .boxed();
                layers.push(file_layer);
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log file {:?}: {}", log_path, e);
                // Fall through to terminal-only logging
            }
        }
    }

    // Add terminal layer if not silent
    if let Some(level) = terminal_level {
        let terminal_filter = make_filter(level, cli_log_level_specified);
        layers.push(make_terminal_layer(&config.format, terminal_filter));
    }

    // Initialize with all layers
    if layers.is_empty() {
        // Silent mode with no file - install a no-op subscriber
        let subscriber = tracing_subscriber::registry();
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        tracing_subscriber::registry()
            .with(layers)
            .init();
    }

    let _ = TRACING_INITIALIZED.set(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_default() {
        let format = LogFormat::default();
        assert!(matches!(format, LogFormat::Pretty));
    }

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(!config.debug);
        assert!(!config.quiet);
        assert!(!config.silent);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_log_args_to_config() {
        let args = LogArgs {
            debug: true,
            quiet: false,
            silent: false,
            log_format: LogFormat::Json,
            log_file: None,
        };
        let config = args.to_config();
        assert!(config.debug);
        assert!(matches!(config.format, LogFormat::Json));
    }
}
