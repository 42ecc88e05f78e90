//! Tracing subscriber setup.
//!
//! Logs go to stderr; command summaries are printed to stdout.
//!
//! # Filter priority (highest to lowest)
//!
//! 1. `ARTICLE_SYNC_LOG` (per-target directives, e.g. `article_sync=debug,warn`)
//! 2. `RUST_LOG`
//! 3. `[logging].level` from the config file
//! 4. `info`

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. Call once, after the config is loaded.
///
/// A second call is a no-op.
pub fn init(config: &LoggingConfig) {
    let filter = build_filter(
        std::env::var("ARTICLE_SYNC_LOG").ok(),
        std::env::var("RUST_LOG").ok(),
        &config.level,
    );

    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json().flatten_event(true))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr())))
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// First parseable directive set wins; unparseable ones fall through.
fn build_filter(project: Option<String>, rust_log: Option<String>, level: &str) -> EnvFilter {
    [project, rust_log, Some(level.to_string())]
        .into_iter()
        .flatten()
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_variable_wins() {
        let filter = build_filter(Some("debug".into()), Some("error".into()), "warn");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_rust_log_before_config_level() {
        let filter = build_filter(None, Some("error".into()), "warn");
        assert_eq!(filter.to_string(), "error");
    }

    #[test]
    fn test_config_level_is_the_fallback() {
        let filter = build_filter(None, None, "warn");
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_garbage_falls_through() {
        let filter = build_filter(Some("article_sync=loud".into()), None, "sync=very");
        assert_eq!(filter.to_string(), "info");
    }
}
