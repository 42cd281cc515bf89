//! Connection configuration and status value types.
//!
//! `SerialConfig` is immutable once built: every change goes through
//! [`ConfigOverrides::apply`], which merges raw fields onto a base
//! configuration and validates the result before anything is mutated.

use crate::error::SerialError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Baud rates accepted by [`ConfigOverrides::apply`].
pub const SUPPORTED_BAUDRATES: [u32; 14] = [
    300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Data bit counts accepted by [`ConfigOverrides::apply`].
pub const SUPPORTED_BYTESIZES: [u8; 4] = [5, 6, 7, 8];

/// Upper bound for read and write timeouts, in milliseconds.
pub const MAX_TIMEOUT_MS: i64 = 60_000;

// Default configuration constants
pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(SerialError::invalid_param(
                "byte_size",
                other,
                format!("supported values: {:?}", SUPPORTED_BYTESIZES),
            )),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        bits.as_u8()
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N")]
    None,
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
    #[serde(rename = "M")]
    Mark,
    #[serde(rename = "S")]
    Space,
}

impl Parity {
    pub const ALL: [Parity; 5] = [Self::None, Self::Even, Self::Odd, Self::Mark, Self::Space];

    /// Single-letter wire name (`N`, `E`, `O`, `M`, `S`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "N",
            Self::Even => "E",
            Self::Odd => "O",
            Self::Mark => "M",
            Self::Space => "S",
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parity {
    type Err = SerialError;

    /// Accepts the wire letter or the full name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NONE" => Ok(Self::None),
            "E" | "EVEN" => Ok(Self::Even),
            "O" | "ODD" => Ok(Self::Odd),
            "M" | "MARK" => Ok(Self::Mark),
            "S" | "SPACE" => Ok(Self::Space),
            _ => Err(SerialError::invalid_param(
                "parity",
                s,
                "supported values: [\"N\", \"E\", \"O\", \"M\", \"S\"]",
            )),
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    pub const ALL: [StopBits; 3] = [Self::One, Self::OnePointFive, Self::Two];

    pub fn as_f64(self) -> f64 {
        match self {
            Self::One => 1.0,
            Self::OnePointFive => 1.5,
            Self::Two => 2.0,
        }
    }
}

impl TryFrom<f64> for StopBits {
    type Error = SerialError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == 1.0 {
            Ok(Self::One)
        } else if value == 1.5 {
            Ok(Self::OnePointFive)
        } else if value == 2.0 {
            Ok(Self::Two)
        } else {
            Err(SerialError::invalid_param(
                "stop_bits",
                value,
                "supported values: [1, 1.5, 2]",
            ))
        }
    }
}

impl From<StopBits> for f64 {
    fn from(bits: StopBits) -> Self {
        bits.as_f64()
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    /// RTS/CTS
    Hardware,
    /// XON/XOFF
    Software,
}

impl FlowControl {
    pub const ALL: [FlowControl; 3] = [Self::None, Self::Hardware, Self::Software];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hardware => "hardware",
            Self::Software => "software",
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowControl {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hardware" => Ok(Self::Hardware),
            "software" => Ok(Self::Software),
            _ => Err(SerialError::invalid_param(
                "flow_control",
                s,
                "supported values: [\"none\", \"hardware\", \"software\"]",
            )),
        }
    }
}

/// Validated configuration of one serial connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub byte_size: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            byte_size: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Raw, partially specified configuration fields.
///
/// Fields keep their unvalidated wire types so that out-of-range input can be
/// reported with the offending value instead of being rejected by the type system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub baudrate: Option<u32>,
    pub byte_size: Option<u8>,
    pub parity: Option<String>,
    pub stop_bits: Option<f64>,
    pub flow_control: Option<String>,
    pub read_timeout_ms: Option<i64>,
    pub write_timeout_ms: Option<i64>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = Some(baudrate);
        self
    }

    pub fn byte_size(mut self, byte_size: u8) -> Self {
        self.byte_size = Some(byte_size);
        self
    }

    pub fn parity(mut self, parity: impl Into<String>) -> Self {
        self.parity = Some(parity.into());
        self
    }

    pub fn stop_bits(mut self, stop_bits: f64) -> Self {
        self.stop_bits = Some(stop_bits);
        self
    }

    pub fn flow_control(mut self, flow_control: impl Into<String>) -> Self {
        self.flow_control = Some(flow_control.into());
        self
    }

    pub fn read_timeout_ms(mut self, ms: i64) -> Self {
        self.read_timeout_ms = Some(ms);
        self
    }

    pub fn write_timeout_ms(mut self, ms: i64) -> Self {
        self.write_timeout_ms = Some(ms);
        self
    }

    /// Returns true when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge the supplied fields onto `base` and validate the result.
    ///
    /// Fields are checked in a fixed order and the first violation is returned.
    /// `base` is never modified.
    pub fn apply(&self, base: &SerialConfig) -> Result<SerialConfig, SerialError> {
        let baudrate = match self.baudrate {
            Some(b) if !SUPPORTED_BAUDRATES.contains(&b) => {
                return Err(SerialError::invalid_param(
                    "baudrate",
                    b,
                    format!("supported values: {:?}", SUPPORTED_BAUDRATES),
                ))
            }
            Some(b) => b,
            None => base.baudrate,
        };
        let byte_size = match self.byte_size {
            Some(b) => DataBits::try_from(b)?,
            None => base.byte_size,
        };
        let parity = match self.parity.as_deref() {
            Some(p) => p.parse()?,
            None => base.parity,
        };
        let stop_bits = match self.stop_bits {
            Some(s) => StopBits::try_from(s)?,
            None => base.stop_bits,
        };
        let flow_control = match self.flow_control.as_deref() {
            Some(f) => f.parse()?,
            None => base.flow_control,
        };
        let read_timeout_ms = match self.read_timeout_ms {
            Some(ms) => validate_timeout("read_timeout_ms", ms)?,
            None => base.read_timeout_ms,
        };
        let write_timeout_ms = match self.write_timeout_ms {
            Some(ms) => validate_timeout("write_timeout_ms", ms)?,
            None => base.write_timeout_ms,
        };

        Ok(SerialConfig {
            baudrate,
            byte_size,
            parity,
            stop_bits,
            flow_control,
            read_timeout_ms,
            write_timeout_ms,
        })
    }
}

fn validate_timeout(field: &'static str, ms: i64) -> Result<u64, SerialError> {
    if (0..=MAX_TIMEOUT_MS).contains(&ms) {
        Ok(ms as u64)
    } else {
        Err(SerialError::invalid_param(
            field,
            ms,
            format!("range: 0-{}", MAX_TIMEOUT_MS),
        ))
    }
}

/// A serial device found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: String,
    pub description: String,
    pub hwid: String,
}

/// Snapshot of a managed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatus {
    pub port: String,
    pub is_open: bool,
    pub config: SerialConfig,
    /// Result of the liveness probe at the time of the query.
    pub connected: bool,
    pub reconnecting: bool,
}
