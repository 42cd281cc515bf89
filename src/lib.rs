//! UART connection manager.
//!
//! This library manages concurrent access to serial (UART) devices: port
//! enumeration, open/close/reconfigure with automatic reconnection, byte
//! transfer, and buffered terminal sessions layered over open connections.
//!
//! # Modules
//!
//! - `state`: Port configuration values, partial overrides and status records
//! - `error`: Public error type with stable numeric codes
//! - `port`: Hardware seam over `serialport`, plus an in-memory mock
//! - `blacklist`: Port blacklist collaborator
//! - `worker`: Owned background threads with cooperative stop
//! - `service`: Connection registry and reconnect supervisor
//! - `terminal`: Terminal sessions with bounded output buffers
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use uart_mcp::port::MockPortOpener;
//! use uart_mcp::{ConfigOverrides, SerialManager, TerminalManager};
//!
//! let opener = MockPortOpener::new();
//! let device = opener.add_device("/dev/ttyUSB0");
//! device.set_echo(true);
//!
//! let serial = Arc::new(SerialManager::with_opener(Arc::new(opener)));
//! serial.open_port("/dev/ttyUSB0", &ConfigOverrides::new().baudrate(115200), true)?;
//! assert_eq!(serial.send_data("/dev/ttyUSB0", b"AT\r\n")?, 4);
//! assert_eq!(serial.read_data("/dev/ttyUSB0", None, None)?, b"AT\r\n");
//!
//! let terminals = TerminalManager::new(Arc::clone(&serial));
//! terminals.create_session("/dev/ttyUSB0", "CRLF", false, 4096)?;
//! terminals.send_command("/dev/ttyUSB0", "PING", true)?;
//! # terminals.shutdown();
//! # serial.shutdown();
//! # Ok::<(), uart_mcp::SerialError>(())
//! ```

pub mod blacklist;
pub mod config;
pub mod error;
pub mod logging;
pub mod port;
pub mod service;
pub mod state;
pub mod terminal;
pub mod worker;

// Re-export commonly used types for convenience
pub use blacklist::{Blacklist, NoBlacklist, PatternBlacklist};
pub use error::{classify_open_failure, ErrorCode, SerialError, SerialResult};
pub use port::{PortError, PortOpener, SerialPortAdapter, SystemPortOpener};
pub use service::{ManagedPort, ManagerOptions, SerialManager};
pub use state::{
    ConfigOverrides, DataBits, FlowControl, Parity, PortInfo, PortStatus, SerialConfig, StopBits,
};
pub use terminal::{
    LineEnding, OutputBuffer, OutputText, SessionInfo, TerminalConfig, TerminalManager,
    TerminalOptions, TerminalSession,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
