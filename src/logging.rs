//! Tracing subscriber setup.

use crate::config::{LogFormat, LoggingConfig};
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: the configured level for this crate,
/// warnings for everything else.
fn default_directive(config: &LoggingConfig) -> String {
    let level = config.level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("uart_mcp={},warn", level)
    }
}

/// Build the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(config)))
}

/// Install the global subscriber, writing to stderr.
///
/// Stdout stays free for command output. Fails if a global subscriber is
/// already set.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let layer = fmt::layer().with_writer(io::stderr).with_target(true);

    match config.format {
        LogFormat::Json => registry
            .with(layer.json().with_current_span(false))
            .try_init()?,
        LogFormat::Compact => registry.with(layer.compact()).try_init()?,
        LogFormat::Pretty => registry
            .with(layer.pretty().with_thread_names(true))
            .try_init()?,
    }

    tracing::debug!("Logging initialised ({:?})", config.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let mut config = LoggingConfig::default();
        assert_eq!(default_directive(&config), "uart_mcp=info,warn");

        config.level = "uart_mcp::service=trace,info".to_string();
        assert_eq!(default_directive(&config), "uart_mcp::service=trace,info");
    }

    #[test]
    fn test_init_only_once() {
        let config = LoggingConfig {
            format: LogFormat::Compact,
            ..LoggingConfig::default()
        };
        // Another test may have installed a subscriber first; a second call
        // must fail rather than panic.
        let _ = init(&config);
        assert!(init(&config).is_err());
    }
}
