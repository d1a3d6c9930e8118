//! Tracing setup for the `prd` binary.
//!
//! Environment variables:
//!   PRD_LOG_FORMAT - "json" or "text" (default: "text")
//!   PRD_LOG_FILE   - path to a log file (optional, rotated daily)
//!   RUST_LOG       - standard env filter (default: "prd=info")

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Matches every `prd_*` crate by target prefix.
const DEFAULT_FILTER: &str = "prd=info";
const VERBOSE_FILTER: &str = "prd=debug";

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(verbose: bool) -> Option<WorkerGuard> {
    let log_format = std::env::var("PRD_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("PRD_LOG_FILE").ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }));
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(path) = log_file.as_deref() {
        let path = Path::new(path);
        let dir = path.parent().unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("prd.log");
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
        }
        return Some(guard);
    }

    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    None
}
