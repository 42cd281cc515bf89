//! Mock serial port implementation for testing.
//!
//! A [`MockDevice`] simulates one physical device: a receive queue, a write
//! log, optional echo, and plug/unplug. [`MockSerialPort`] is a handle opened
//! on a device, and [`MockPortOpener`] hands handles out to the registry.
//!
//! Unplugging a device bumps its generation, so handles opened before the
//! unplug stay dead even after the device comes back, as a real file
//! descriptor would.

use super::error::PortError;
use super::traits::{PortAdapter, PortOpener, SerialPortAdapter};
use crate::state::{PortInfo, SerialConfig};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inner state of the mock device, protected by a mutex for interior mutability.
#[derive(Debug, Default)]
struct DeviceState {
    present: bool,
    generation: u64,
    echo: bool,
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the device.
    write_log: Vec<Vec<u8>>,
    /// Every configuration the device was opened or reconfigured with.
    config_history: Vec<SerialConfig>,
    /// Timeout used by the most recent read.
    last_read_timeout: Option<Duration>,
    fail_writes: bool,
    /// Upper bound on bytes accepted per write, for short-write simulation.
    max_write: Option<usize>,
    open_failure: Option<String>,
    hold_opens: bool,
    open_count: usize,
    close_count: usize,
}

#[derive(Debug)]
struct DeviceInner {
    name: String,
    description: String,
    state: Mutex<DeviceState>,
    data_ready: Condvar,
    open_gate: Condvar,
}

/// Simulated physical device shared between its handles and the test.
#[derive(Debug, Clone)]
pub struct MockDevice {
    inner: Arc<DeviceInner>,
}

impl MockDevice {
    /// Create a present device with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(DeviceInner {
                description: format!("Mock serial device {name}"),
                name,
                state: Mutex::new(DeviceState {
                    present: true,
                    ..Default::default()
                }),
                data_ready: Condvar::new(),
                open_gate: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueue bytes to be returned by subsequent reads on any handle.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.inner.state.lock().read_queue.extend(data);
        self.inner.data_ready.notify_all();
    }

    /// Loop written bytes straight back into the receive queue.
    pub fn set_echo(&self, echo: bool) {
        self.inner.state.lock().echo = echo;
    }

    /// Simulate the device disappearing. Existing handles become dead.
    pub fn unplug(&self) {
        let mut state = self.inner.state.lock();
        state.present = false;
        state.generation += 1;
        state.read_queue.clear();
        drop(state);
        self.inner.data_ready.notify_all();
    }

    /// Simulate the device coming back. Only new handles will work.
    pub fn plug(&self) {
        self.inner.state.lock().present = true;
    }

    pub fn is_present(&self) -> bool {
        self.inner.state.lock().present
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.state.lock().fail_writes = fail;
    }

    /// Accept at most `limit` bytes per write, like a device whose transmit
    /// buffer fills before the write timeout.
    pub fn set_max_write(&self, limit: Option<usize>) {
        self.inner.state.lock().max_write = limit;
    }

    /// Make subsequent opens fail with the given backend message.
    pub fn set_open_failure(&self, message: Option<&str>) {
        self.inner.state.lock().open_failure = message.map(str::to_string);
    }

    /// Block every open on this device until [`MockDevice::release_opens`].
    pub fn hold_opens(&self) {
        self.inner.state.lock().hold_opens = true;
    }

    pub fn release_opens(&self) {
        self.inner.state.lock().hold_opens = false;
        self.inner.open_gate.notify_all();
    }

    /// Get a copy of all data written to the device.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.inner.state.lock().write_log.clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.inner.state.lock().write_log.concat()
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.inner.state.lock().open_count
    }

    /// Number of handles explicitly closed.
    pub fn close_count(&self) -> usize {
        self.inner.state.lock().close_count
    }

    /// Configuration most recently applied to the device.
    pub fn current_config(&self) -> Option<SerialConfig> {
        self.inner.state.lock().config_history.last().copied()
    }

    pub fn config_history(&self) -> Vec<SerialConfig> {
        self.inner.state.lock().config_history.clone()
    }

    /// Timeout in effect during the most recent read call.
    pub fn last_read_timeout(&self) -> Option<Duration> {
        self.inner.state.lock().last_read_timeout
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.inner.state.lock().read_queue.len()
    }

    fn info(&self) -> PortInfo {
        PortInfo {
            port: self.inner.name.clone(),
            description: self.inner.description.clone(),
            hwid: "MOCK".to_string(),
        }
    }

    fn open_handle(&self, config: &SerialConfig) -> Result<MockSerialPort, PortError> {
        let mut state = self.inner.state.lock();
        while state.hold_opens {
            self.inner.open_gate.wait(&mut state);
        }
        if !state.present {
            return Err(PortError::not_found(self.inner.name.clone()));
        }
        if let Some(message) = &state.open_failure {
            return Err(PortError::Io(std::io::Error::other(message.clone())));
        }
        state.open_count += 1;
        state.config_history.push(*config);
        Ok(MockSerialPort {
            device: self.clone(),
            generation: state.generation,
            timeout: config.read_timeout(),
            closed: false,
        })
    }
}

/// Mock serial port handle for testing.
///
/// # Example
/// ```
/// use uart_mcp::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
///
/// // Enqueue data to be read
/// port.device().enqueue_read(b"Hello, World!");
///
/// // Perform a read
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(n, 13);
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// // Write some data and verify what was written
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.device().get_write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Debug)]
pub struct MockSerialPort {
    device: MockDevice,
    generation: u64,
    timeout: Duration,
    closed: bool,
}

impl MockSerialPort {
    /// Open a handle on a fresh standalone device with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        let device = MockDevice::new(name);
        Self {
            generation: 0,
            timeout: SerialConfig::default().read_timeout(),
            closed: false,
            device,
        }
    }

    pub fn device(&self) -> &MockDevice {
        &self.device
    }

    fn check_alive(&self, state: &DeviceState) -> Result<(), PortError> {
        if self.closed {
            Err(PortError::NotOpen)
        } else if !state.present || state.generation != self.generation {
            Err(PortError::Disconnected(self.device.inner.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.device.inner.state.lock();
        self.check_alive(&state)?;
        if state.fail_writes {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }

        let accepted = &data[..state.max_write.map_or(data.len(), |max| max.min(data.len()))];
        state.write_log.push(accepted.to_vec());
        if state.echo {
            state.read_queue.extend(accepted);
            drop(state);
            self.device.inner.data_ready.notify_all();
        }
        Ok(accepted.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.device.inner.state.lock();
        state.last_read_timeout = Some(self.timeout);
        loop {
            self.check_alive(&state)?;
            if !state.read_queue.is_empty() || buffer.is_empty() {
                break;
            }
            if self
                .device
                .inner
                .data_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                self.check_alive(&state)?;
                if state.read_queue.is_empty() {
                    return Err(PortError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "Operation timed out",
                    )));
                }
                break;
            }
        }

        // Read as many bytes as possible from the queue
        let n = buffer.len().min(state.read_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.device.inner.name
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        let state = self.device.inner.state.lock();
        self.check_alive(&state)?;
        Ok(state.read_queue.len())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        let state = self.device.inner.state.lock();
        self.check_alive(&state)?;
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn apply_config(&mut self, config: &SerialConfig) -> Result<(), PortError> {
        let mut state = self.device.inner.state.lock();
        self.check_alive(&state)?;
        state.config_history.push(*config);
        self.timeout = config.read_timeout();
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.device.inner.state.lock();
        self.check_alive(&state)?;
        state.read_queue.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        if self.closed {
            return Err(PortError::NotOpen);
        }
        self.closed = true;
        self.device.inner.state.lock().close_count += 1;
        Ok(())
    }
}

/// [`PortOpener`] over a set of [`MockDevice`]s.
#[derive(Debug, Default, Clone)]
pub struct MockPortOpener {
    devices: Arc<Mutex<BTreeMap<String, MockDevice>>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a present device and return it for test control.
    pub fn add_device(&self, name: &str) -> MockDevice {
        let device = MockDevice::new(name);
        self.devices.lock().insert(name.to_string(), device.clone());
        device
    }

    pub fn device(&self, name: &str) -> Option<MockDevice> {
        self.devices.lock().get(name).cloned()
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, port: &str, config: &SerialConfig) -> Result<PortAdapter, PortError> {
        // Clone the device out so a held open does not block the device map.
        let device = self
            .device(port)
            .ok_or_else(|| PortError::not_found(port))?;
        Ok(Box::new(device.open_handle(config)?))
    }

    fn available_ports(&self) -> Result<Vec<PortInfo>, PortError> {
        Ok(self
            .devices
            .lock()
            .values()
            .filter(|d| d.is_present())
            .map(MockDevice::info)
            .collect())
    }
}
