//! Core traits for serial port abstraction.
//!
//! Defines the `SerialPortAdapter` trait that allows both real serial ports
//! and mock implementations to be used interchangeably, and the `PortOpener`
//! factory the registry uses to create and enumerate them.

use super::error::PortError;
use crate::state::{DataBits, FlowControl, Parity, PortInfo, SerialConfig, StopBits};
use std::time::Duration;

/// Owned, type-erased live handle.
pub type PortAdapter = Box<dyn SerialPortAdapter>;

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// `serialport` has no mark or space parity.
impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::config(format!(
                "parity {parity} is not supported by this platform backend"
            ))),
        }
    }
}

/// `serialport` has no 1.5 stop bits.
impl TryFrom<StopBits> for serialport::StopBits {
    type Error = PortError;

    fn try_from(bits: StopBits) -> Result<Self, Self::Error> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OnePointFive => Err(PortError::config(
                "1.5 stop bits are not supported by this platform backend",
            )),
        }
    }
}

/// Trait for serial port I/O operations.
///
/// This trait abstracts over synchronous serial port operations, allowing both
/// real hardware ports and mock implementations for testing.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port, blocking up to the write timeout.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer, blocking up to
    /// the read timeout.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Number of bytes waiting in the receive buffer.
    ///
    /// This is the liveness probe: it must not block, and any error means the
    /// device is no longer reachable through this handle.
    fn bytes_to_read(&self) -> Result<usize, PortError>;

    /// Set the read timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Current read timeout.
    fn timeout(&self) -> Duration;

    /// Apply a full configuration to the open handle without reopening it.
    fn apply_config(&mut self, config: &SerialConfig) -> Result<(), PortError>;

    /// Clear both input and output buffers.
    ///
    /// This discards any unread data in the receive buffer and any unsent
    /// data in the transmit buffer.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Release the underlying device. Further I/O fails with `PortError::NotOpen`.
    fn close(&mut self) -> Result<(), PortError>;
}

/// Factory for live handles plus device enumeration.
pub trait PortOpener: Send + Sync {
    /// Open `port` with `config`.
    fn open(&self, port: &str, config: &SerialConfig) -> Result<PortAdapter, PortError>;

    /// Enumerate devices currently present on the system.
    fn available_ports(&self) -> Result<Vec<PortInfo>, PortError>;
}
