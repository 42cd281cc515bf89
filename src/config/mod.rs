//! Configuration module for uart-mcp.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `UART_MCP_CONFIG` environment variable (explicit path)
//! 2. `./uart-mcp.toml` (current directory)
//! 3. `uart-mcp/config.toml` in the platform config directory
//!    (`~/.config` on Linux, `%APPDATA%` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Commonly tuned values can be overridden via environment variables.
//! The pattern is: `UART_MCP_<SECTION>_<KEY>`
//!
//! Examples:
//! - `UART_MCP_SERIAL_BAUDRATE=115200`
//! - `UART_MCP_TERMINAL_LINE_ENDING=LF`
//! - `UART_MCP_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use uart_mcp::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let options = loader.config().serial.manager_options()?;
//! println!("Reconnect interval: {:?}", options.reconnect_interval);
//! # Ok::<(), uart_mcp::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialSettings, TerminalSettings};
