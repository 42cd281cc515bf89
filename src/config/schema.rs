//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::service::ManagerOptions;
use crate::state::{
    ConfigOverrides, SerialConfig, DEFAULT_BAUDRATE, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_WRITE_TIMEOUT_MS,
};
use crate::terminal::{LineEnding, TerminalConfig, TerminalOptions, DEFAULT_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port defaults and manager options
    pub serial: SerialSettings,
    /// Terminal session defaults
    pub terminal: TerminalSettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// `[serial]` section.
///
/// Line settings are kept as raw values and validated when turned into a
/// [`SerialConfig`], so a bad file reports the field the same way a bad
/// `open_port` call does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub baudrate: u32,
    pub byte_size: u8,
    /// Parity letter: N, E, O, M or S
    pub parity: String,
    pub stop_bits: f64,
    /// none, hardware or software
    pub flow_control: String,
    pub read_timeout_ms: i64,
    pub write_timeout_ms: i64,
    /// Enable the reconnect supervisor
    pub auto_reconnect: bool,
    pub reconnect_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Blacklist entries; entries with regex metacharacters are patterns
    pub blacklist: Vec<String>,
    /// Extra blacklist file, one entry per line. Defaults to
    /// `blacklist.conf` next to the config file location.
    pub blacklist_file: Option<PathBuf>,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            byte_size: 8,
            parity: "N".to_string(),
            stop_bits: 1.0,
            flow_control: "none".to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS as i64,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS as i64,
            auto_reconnect: true,
            reconnect_interval_ms: 2000,
            shutdown_timeout_ms: 5000,
            blacklist: Vec::new(),
            blacklist_file: None,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialSettings {
    /// Line settings as a full set of overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides::new()
            .baudrate(self.baudrate)
            .byte_size(self.byte_size)
            .parity(self.parity.clone())
            .stop_bits(self.stop_bits)
            .flow_control(self.flow_control.clone())
            .read_timeout_ms(self.read_timeout_ms)
            .write_timeout_ms(self.write_timeout_ms)
    }

    /// Validated default line configuration.
    pub fn line_config(&self) -> ConfigResult<SerialConfig> {
        self.overrides()
            .apply(&SerialConfig::default())
            .map_err(ConfigError::Line)
    }

    pub fn manager_options(&self) -> ConfigResult<ManagerOptions> {
        if self.reconnect_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "serial.reconnect_interval_ms",
                "must be greater than 0",
            ));
        }
        Ok(ManagerOptions {
            auto_reconnect: self.auto_reconnect,
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            defaults: self.line_config()?,
        })
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// `[terminal]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// CR, LF or CRLF
    pub line_ending: String,
    pub local_echo: bool,
    /// Output buffer capacity in bytes
    pub buffer_size: usize,
    pub read_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            line_ending: "CRLF".to_string(),
            local_echo: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            read_interval_ms: 50,
            read_timeout_ms: 50,
            stop_timeout_ms: 2000,
        }
    }
}

impl TerminalSettings {
    pub fn session_config(&self) -> ConfigResult<TerminalConfig> {
        let line_ending = self
            .line_ending
            .parse::<LineEnding>()
            .map_err(|e| ConfigError::invalid("terminal.line_ending", e.to_string()))?;
        if self.buffer_size == 0 {
            return Err(ConfigError::invalid(
                "terminal.buffer_size",
                "must be greater than 0",
            ));
        }
        Ok(TerminalConfig {
            line_ending,
            local_echo: self.local_echo,
            buffer_size: self.buffer_size,
        })
    }

    pub fn options(&self) -> TerminalOptions {
        TerminalOptions {
            read_interval: Duration::from_millis(self.read_interval_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
