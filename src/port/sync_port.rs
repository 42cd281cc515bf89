//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own `SerialPortAdapter`
//! trait for dependency injection and testing.

use super::error::PortError;
use super::traits::{PortAdapter, PortOpener, SerialPortAdapter};
use crate::state::{PortInfo, SerialConfig};
use std::io::{Read, Write};
use std::time::Duration;

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
///
/// `serialport` uses one timeout for both directions, so the write timeout is
/// swapped in around each write and the read timeout restored afterwards.
pub struct SyncSerialPort {
    /// The underlying serial port implementation; `None` once closed.
    port: Option<Box<dyn serialport::SerialPort>>,
    /// The port name/path for identification.
    name: String,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// # Arguments
    /// * `port_name` - The system path to the serial port (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `config` - Configuration parameters for the port
    ///
    /// # Example
    /// ```no_run
    /// use uart_mcp::port::SyncSerialPort;
    /// use uart_mcp::SerialConfig;
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &SerialConfig::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<Self, PortError> {
        let port = serialport::new(port_name, config.baudrate)
            .data_bits(config.byte_size.into())
            .flow_control(config.flow_control.into())
            .parity(config.parity.try_into()?)
            .stop_bits(config.stop_bits.try_into()?)
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                serialport::ErrorKind::Io(kind) => {
                    PortError::Io(std::io::Error::new(kind, e.description.clone()))
                }
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        })
    }

    fn raw(&self) -> Result<&dyn serialport::SerialPort, PortError> {
        self.port.as_deref().ok_or(PortError::NotOpen)
    }

    fn raw_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let (read_timeout, write_timeout) = (self.read_timeout, self.write_timeout);
        let port = self.raw_mut()?;
        if write_timeout != read_timeout {
            port.set_timeout(write_timeout)?;
        }
        let written = port.write(data).and_then(|n| port.flush().map(|_| n));
        if write_timeout != read_timeout {
            port.set_timeout(read_timeout)?;
        }
        written.map_err(PortError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.raw_mut()?.read(buffer).map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        Ok(self.raw()?.bytes_to_read()? as usize)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.raw_mut()?.set_timeout(timeout)?;
        self.read_timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.read_timeout
    }

    fn apply_config(&mut self, config: &SerialConfig) -> Result<(), PortError> {
        let parity = config.parity.try_into()?;
        let stop_bits = config.stop_bits.try_into()?;
        let port = self.raw_mut()?;
        port.set_baud_rate(config.baudrate)?;
        port.set_data_bits(config.byte_size.into())?;
        port.set_parity(parity)?;
        port.set_stop_bits(stop_bits)?;
        port.set_flow_control(config.flow_control.into())?;
        port.set_timeout(config.read_timeout())?;
        self.read_timeout = config.read_timeout();
        self.write_timeout = config.write_timeout();
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        // Clear both input and output buffers
        self.raw()?
            .clear(serialport::ClearBuffer::All)
            .map_err(PortError::Serial)
    }

    fn close(&mut self) -> Result<(), PortError> {
        // Dropping the boxed port releases the file descriptor / handle.
        self.port.take().map(drop).ok_or(PortError::NotOpen)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

/// [`PortOpener`] backed by the operating system's serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, port: &str, config: &SerialConfig) -> Result<PortAdapter, PortError> {
        Ok(Box::new(SyncSerialPort::open(port, config)?))
    }

    fn available_ports(&self) -> Result<Vec<PortInfo>, PortError> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(port_info_from)
            .collect())
    }
}

fn port_info_from(info: serialport::SerialPortInfo) -> PortInfo {
    let (description, hwid) = match &info.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let description = usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .unwrap_or_else(|| "USB serial device".to_string());
            (description, usb_hwid(usb.vid, usb.pid, usb.serial_number.as_deref()))
        }
        serialport::SerialPortType::PciPort => ("PCI serial port".to_string(), "PCI".to_string()),
        serialport::SerialPortType::BluetoothPort => {
            ("Bluetooth serial port".to_string(), "BLUETOOTH".to_string())
        }
        serialport::SerialPortType::Unknown => (String::new(), String::new()),
    };

    PortInfo {
        port: info.port_name,
        description,
        hwid,
    }
}

fn usb_hwid(vid: u16, pid: u16, serial_number: Option<&str>) -> String {
    match serial_number {
        Some(serial) => format!("USB VID:PID={vid:04X}:{pid:04X} SER={serial}"),
        None => format!("USB VID:PID={vid:04X}:{pid:04X}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Parity, StopBits};

    #[test]
    fn test_port_not_found_error() {
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", &SerialConfig::default());

        assert!(result.is_err());
        if let Err(e) = result {
            let text = e.to_string().to_lowercase();
            assert!(
                matches!(e, PortError::NotFound(_)) || text.contains("no such file") || text.contains("not found"),
                "unexpected error: {e:?}"
            );
        }
    }

    #[test]
    fn test_unsupported_settings_rejected_before_open() {
        let config = SerialConfig {
            parity: Parity::Mark,
            ..SerialConfig::default()
        };
        let err = SyncSerialPort::open("/dev/nonexistent_port_12345", &config).unwrap_err();
        assert!(matches!(err, PortError::Config(_)));

        let config = SerialConfig {
            stop_bits: StopBits::OnePointFive,
            ..SerialConfig::default()
        };
        let err = SyncSerialPort::open("/dev/nonexistent_port_12345", &config).unwrap_err();
        assert!(matches!(err, PortError::Config(_)));
    }

    #[test]
    fn test_usb_hwid() {
        assert_eq!(usb_hwid(0x0403, 0x6001, Some("A12345")), "USB VID:PID=0403:6001 SER=A12345");
        assert_eq!(usb_hwid(0x2341, 0x0043, None), "USB VID:PID=2341:0043");
    }

    #[test]
    fn test_unknown_port_info() {
        let info = port_info_from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: serialport::SerialPortType::Unknown,
        });
        assert_eq!(info.port, "/dev/ttyS0");
        assert!(info.description.is_empty());
    }
}
