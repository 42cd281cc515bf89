//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use crate::blacklist::PatternBlacklist;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "UART_MCP";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the current directory
const CWD_CONFIG_FILE_NAME: &str = "uart-mcp.toml";

const BLACKLIST_FILE_NAME: &str = "blacklist.conf";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "UART_MCP_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `UART_MCP_CONFIG` environment variable (explicit path)
    /// 2. `./uart-mcp.toml` (current directory)
    /// 3. `uart-mcp/config.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if let Err(e) = apply_env_overrides(&mut config) {
            warn!("Ignoring environment overrides: {}", e);
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Build the port blacklist from `[serial] blacklist` plus the blacklist file.
    ///
    /// An explicitly configured file that cannot be read is logged; the
    /// default file is optional.
    pub fn blacklist(&self) -> PatternBlacklist {
        let serial = &self.config.serial;
        let mut blacklist = PatternBlacklist::new(&serial.blacklist);

        let (path, explicit) = match &serial.blacklist_file {
            Some(path) => (Some(path.clone()), true),
            None => (get_default_config_dir().map(|d| d.join(BLACKLIST_FILE_NAME)), false),
        };
        if let Some(path) = path {
            if explicit || path.exists() {
                if let Err(e) = blacklist.extend_from_file(&path) {
                    warn!("Failed to read blacklist file {}: {}", path.display(), e);
                }
            } else {
                debug!("No blacklist file at {}", path.display());
            }
        }
        blacklist
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("{} points to missing file {}", CONFIG_PATH_ENV, path.display());
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CWD_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "uart-mcp").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> (String, Option<String>) {
    let var = format!("{}_{}", ENV_PREFIX, key);
    let value = std::env::var(&var).ok();
    (var, value)
}

fn env_parse<T: FromStr>(key: &str, expected: &'static str) -> ConfigResult<Option<T>> {
    match env_var(key) {
        (var, Some(val)) => {
            let parsed = val.trim().parse().ok();
            match parsed {
                Some(parsed) => Ok(Some(parsed)),
                None => Err(ConfigError::env(var, val, expected)),
            }
        }
        (_, None) => Ok(None),
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_var(key)
        .1
        .map(|val| val.eq_ignore_ascii_case("true") || val == "1")
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `UART_MCP_<SECTION>_<KEY>`
/// For example:
/// - `UART_MCP_SERIAL_BAUDRATE=115200`
/// - `UART_MCP_SERIAL_BLACKLIST=/dev/ttyS0,/dev/ttyS1` (appended)
/// - `UART_MCP_LOGGING_FORMAT=json`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some(val) = env_parse("SERIAL_BAUDRATE", "a baud rate")? {
        config.serial.baudrate = val;
    }
    if let Some(val) = env_var("SERIAL_PARITY").1 {
        config.serial.parity = val;
    }
    if let Some(val) = env_parse("SERIAL_READ_TIMEOUT_MS", "milliseconds")? {
        config.serial.read_timeout_ms = val;
    }
    if let Some(val) = env_parse("SERIAL_WRITE_TIMEOUT_MS", "milliseconds")? {
        config.serial.write_timeout_ms = val;
    }
    if let Some(val) = env_bool("SERIAL_AUTO_RECONNECT") {
        config.serial.auto_reconnect = val;
    }
    if let Some(val) = env_parse("SERIAL_RECONNECT_INTERVAL_MS", "milliseconds")? {
        config.serial.reconnect_interval_ms = val;
    }
    if let Some(val) = env_var("SERIAL_BLACKLIST").1 {
        config.serial.blacklist.extend(
            val.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }

    // Terminal overrides
    if let Some(val) = env_var("TERMINAL_LINE_ENDING").1 {
        config.terminal.line_ending = val;
    }
    if let Some(val) = env_bool("TERMINAL_LOCAL_ECHO") {
        config.terminal.local_echo = val;
    }
    if let Some(val) = env_parse("TERMINAL_BUFFER_SIZE", "a byte count")? {
        config.terminal.buffer_size = val;
    }

    // Logging overrides
    if let Some(val) = env_var("LOGGING_LEVEL").1 {
        config.logging.level = val;
    }
    if let Some(val) = env_var("LOGGING_FORMAT").1 {
        config.logging.format = match val.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env(
                    format!("{}_LOGGING_FORMAT", ENV_PREFIX),
                    val,
                    "json, pretty or compact",
                ))
            }
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::Blacklist;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baudrate, 9600);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("UART_MCP_SERIAL_BAUDRATE", "115200");
        env::set_var("UART_MCP_SERIAL_AUTO_RECONNECT", "false");
        env::set_var("UART_MCP_LOGGING_FORMAT", "JSON");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baudrate, 115200);
        assert!(!loader.config().serial.auto_reconnect);
        assert_eq!(loader.config().logging.format, LogFormat::Json);

        // Clean up
        env::remove_var("UART_MCP_SERIAL_BAUDRATE");
        env::remove_var("UART_MCP_SERIAL_AUTO_RECONNECT");
        env::remove_var("UART_MCP_LOGGING_FORMAT");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uart-mcp.toml");
        std::fs::write(&path, "").unwrap();

        env::set_var("UART_MCP_TERMINAL_BUFFER_SIZE", "lots");
        let err = ConfigLoader::load_from(&path).unwrap_err();
        env::remove_var("UART_MCP_TERMINAL_BUFFER_SIZE");

        match err {
            ConfigError::Env { var, value, .. } => {
                assert_eq!(var, "UART_MCP_TERMINAL_BUFFER_SIZE");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_load_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uart-mcp.toml");
        std::fs::write(
            &path,
            "[serial]\nbaudrate = 57600\n\n[terminal]\nlocal_echo = true\n",
        )
        .unwrap();

        let loader = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(loader.config().serial.baudrate, 57600);
        assert!(loader.config().terminal.local_echo);

        let saved = dir.path().join("nested").join("copy.toml");
        loader.save_to(&saved).unwrap();
        let reloaded = ConfigLoader::load_from(&saved).unwrap();
        assert_eq!(reloaded.config().serial.baudrate, 57600);
    }

    #[test]
    #[serial]
    fn test_explicit_path_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        env::set_var("UART_MCP_CONFIG", &path);
        let loader = ConfigLoader::load().unwrap();
        env::remove_var("UART_MCP_CONFIG");

        assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(loader.config().logging.level, "debug");
    }

    #[test]
    #[serial]
    fn test_blacklist_from_config_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blacklist.conf");
        std::fs::write(&file, "COM1\n").unwrap();

        let mut loader = ConfigLoader::with_defaults();
        loader.config.serial.blacklist = vec![r"^/dev/ttyS\d+$".to_string()];
        loader.config.serial.blacklist_file = Some(file);

        let blacklist = loader.blacklist();
        assert!(blacklist.is_blacklisted("COM1"));
        assert!(blacklist.is_blacklisted("/dev/ttyS4"));
        assert!(!blacklist.is_blacklisted("/dev/ttyUSB0"));
    }
}
