//! Errors raised while loading, checking or saving `uart-mcp.toml`.

use crate::error::SerialError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax error or a value of the wrong type.
    #[error("invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `[serial]` line defaults that `open_port` would reject.
    #[error("[serial] {0}")]
    Line(SerialError),

    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },

    /// A `UART_MCP_*` override that does not parse.
    #[error("{var}={value:?}: expected {expected}")]
    Env {
        var: String,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }

    pub fn env(var: impl Into<String>, value: impl Into<String>, expected: &'static str) -> Self {
        Self::Env {
            var: var.into(),
            value: value.into(),
            expected,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
