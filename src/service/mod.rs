//! Connection registry.
//!
//! [`SerialManager`] owns every open serial connection, keyed by port
//! identifier. Open, close and the reconnect swap change the map under the
//! registry lock. Everything that touches a handle (transfers, reconfiguration,
//! liveness probes) only takes the registry lock long enough to look the handle
//! up, so a busy port never stalls operations on another.
//!
//! # Architecture
//!
//! ```text
//! CLI / protocol layer ─┐
//! TerminalManager      ─┼──> SerialManager ──> Mutex<HashMap<id, ManagedPort>>
//! Reconnect supervisor ─┘                         └──> Arc<Mutex<PortAdapter>>
//! ```
//!
//! Lock order is always registry, then handle. Nothing in this module calls
//! back into a terminal session.

mod reconnect;

use crate::blacklist::{Blacklist, NoBlacklist};
use crate::error::{classify_open_failure, SerialError, SerialResult};
use crate::port::{PortAdapter, PortError, PortOpener, SerialPortAdapter};
use crate::state::{ConfigOverrides, PortInfo, PortStatus, SerialConfig};
use crate::worker::Worker;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Live handle shared between the registry and in-flight transfers.
pub(crate) type SharedHandle = Arc<Mutex<PortAdapter>>;

/// How long a liveness probe waits for a handle busy with a transfer.
/// A handle that stays busy is in use and counted as connected.
const PROBE_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Tunables for a [`SerialManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Run the reconnect supervisor. When false no background thread exists.
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
    /// Bounded wait for the supervisor thread on shutdown.
    pub shutdown_timeout: Duration,
    /// Base configuration that `open_port` overrides are applied to.
    pub defaults: SerialConfig,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_interval: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
            defaults: SerialConfig::default(),
        }
    }
}

/// One registry entry: a port identifier bound to its live handle.
#[derive(Debug)]
pub struct ManagedPort {
    id: String,
    handle: SharedHandle,
    config: SerialConfig,
    auto_reconnect: bool,
    reconnecting: bool,
}

impl ManagedPort {
    fn new(id: String, handle: PortAdapter, config: SerialConfig, auto_reconnect: bool) -> Self {
        Self {
            id,
            handle: Arc::new(Mutex::new(handle)),
            config,
            auto_reconnect,
            reconnecting: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    fn status(&self, connected: bool) -> PortStatus {
        PortStatus {
            port: self.id.clone(),
            is_open: true,
            config: self.config,
            connected,
            reconnecting: self.reconnecting,
        }
    }
}

/// Non-blocking liveness probe. Any error means the device is gone.
pub(crate) fn probe(handle: &SharedHandle) -> bool {
    match handle.try_lock_for(PROBE_LOCK_TIMEOUT) {
        Some(port) => port.bytes_to_read().is_ok(),
        None => true,
    }
}

/// Best-effort release of a handle. Failures are logged, never returned.
pub(crate) fn release(id: &str, handle: &SharedHandle) {
    if let Err(e) = handle.lock().close() {
        if !matches!(e, PortError::NotOpen) {
            warn!("Error closing serial port {}: {}", id, e);
        }
    }
}

pub(crate) struct Registry {
    pub(crate) ports: Mutex<HashMap<String, ManagedPort>>,
    pub(crate) opener: Arc<dyn PortOpener>,
}

/// Registry of managed serial connections.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
pub struct SerialManager {
    registry: Arc<Registry>,
    blacklist: Arc<dyn Blacklist>,
    options: ManagerOptions,
    supervisor: Mutex<Option<Worker>>,
}

impl SerialManager {
    /// Create a registry and, if enabled, start its reconnect supervisor.
    pub fn new(
        opener: Arc<dyn PortOpener>,
        blacklist: Arc<dyn Blacklist>,
        options: ManagerOptions,
    ) -> Self {
        let registry = Arc::new(Registry {
            ports: Mutex::new(HashMap::new()),
            opener,
        });

        let supervisor = if options.auto_reconnect {
            let reg = Arc::clone(&registry);
            let interval = options.reconnect_interval;
            match Worker::spawn("uart-reconnect", move |signal| {
                reconnect::run(&reg, &signal, interval)
            }) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    warn!("Failed to start reconnect supervisor: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            registry,
            blacklist,
            options,
            supervisor: Mutex::new(supervisor),
        }
    }

    /// Registry over the given opener with no blacklist and default options.
    pub fn with_opener(opener: Arc<dyn PortOpener>) -> Self {
        Self::new(opener, Arc::new(NoBlacklist), ManagerOptions::default())
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Enumerate system devices, minus blacklisted ones.
    pub fn list_ports(&self) -> SerialResult<Vec<PortInfo>> {
        let ports = self
            .registry
            .opener
            .available_ports()
            .map_err(|e| SerialError::open_failed("*", format!("port enumeration failed: {e}")))?;

        Ok(ports
            .into_iter()
            .filter(|info| {
                let blocked = self.blacklist.is_blacklisted(&info.port);
                if blocked {
                    debug!("Filtered blacklisted port: {}", info.port);
                }
                !blocked
            })
            .collect())
    }

    /// Open `id`, or return the status of the existing connection unchanged.
    ///
    /// # Errors
    ///
    /// - `PortBlacklisted` if the blacklist rejects `id`
    /// - `InvalidParam` for the first override outside its supported set
    /// - `PortNotFound`, `PermissionDenied`, `PortBusy` or `PortOpenFailed`
    ///   when the device cannot be opened
    pub fn open_port(
        &self,
        id: &str,
        overrides: &ConfigOverrides,
        auto_reconnect: bool,
    ) -> SerialResult<PortStatus> {
        if self.blacklist.is_blacklisted(id) {
            return Err(SerialError::PortBlacklisted(id.to_string()));
        }
        let config = overrides.apply(&self.options.defaults)?;

        let mut ports = self.registry.ports.lock();
        if let Some(managed) = ports.get(id) {
            info!("Serial port already open, returning current status: {}", id);
            let (status, handle) = (managed.status(false), Arc::clone(&managed.handle));
            drop(ports);
            return Ok(with_probe(status, &handle));
        }

        let handle = self
            .registry
            .opener
            .open(id, &config)
            .map_err(|e| classify_open_failure(id, &e))?;
        let managed = ManagedPort::new(id.to_string(), handle, config, auto_reconnect);
        let status = managed.status(true);
        ports.insert(id.to_string(), managed);

        info!(
            "Opened serial port {} ({} baud, auto_reconnect={})",
            id, config.baudrate, auto_reconnect
        );
        Ok(status)
    }

    /// Release `id` and remove it from the registry.
    pub fn close_port(&self, id: &str) -> SerialResult<()> {
        let managed = self
            .registry
            .ports
            .lock()
            .remove(id)
            .ok_or_else(|| SerialError::PortClosed(id.to_string()))?;
        release(id, &managed.handle);
        info!("Closed serial port {}", id);
        Ok(())
    }

    /// Merge `overrides` onto the current configuration and apply it in place.
    ///
    /// Validation happens before anything is touched. The handle is
    /// reconfigured without the registry lock, so a transfer in flight on this
    /// port delays only this call. The stored configuration changes only if
    /// the entry still holds the same handle and configuration when the live
    /// handle has accepted the merge; otherwise the merge is redone on the
    /// newer state.
    pub fn set_config(&self, id: &str, overrides: &ConfigOverrides) -> SerialResult<PortStatus> {
        loop {
            let (handle, current) = self.entry(id, |m| (Arc::clone(&m.handle), m.config))?;
            let merged = overrides.apply(&current)?;
            handle
                .lock()
                .apply_config(&merged)
                .map_err(|e| match e {
                    PortError::Config(reason) => SerialError::invalid_param("config", id, reason),
                    other => SerialError::open_failed(id, other.to_string()),
                })?;

            let mut ports = self.registry.ports.lock();
            let managed = ports
                .get_mut(id)
                .ok_or_else(|| SerialError::PortClosed(id.to_string()))?;
            if !Arc::ptr_eq(&managed.handle, &handle) || managed.config != current {
                debug!("Serial port {} changed during reconfiguration, merging again", id);
                continue;
            }
            managed.config = merged;
            let status = managed.status(false);
            drop(ports);

            info!("Reconfigured serial port {}", id);
            return Ok(with_probe(status, &handle));
        }
    }

    pub fn get_status(&self, id: &str) -> SerialResult<PortStatus> {
        let (status, handle) = self.entry(id, |m| (m.status(false), Arc::clone(&m.handle)))?;
        Ok(with_probe(status, &handle))
    }

    /// Status of every open port, sorted by identifier.
    pub fn get_all_status(&self) -> Vec<PortStatus> {
        let snapshot: Vec<(PortStatus, SharedHandle)> = {
            let ports = self.registry.ports.lock();
            ports
                .values()
                .map(|m| (m.status(false), Arc::clone(&m.handle)))
                .collect()
        };
        let mut statuses: Vec<PortStatus> = snapshot
            .into_iter()
            .map(|(status, handle)| with_probe(status, &handle))
            .collect();
        statuses.sort_by(|a, b| a.port.cmp(&b.port));
        statuses
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.registry.ports.lock().contains_key(id)
    }

    /// Write `data` to `id`, returning the number of bytes written.
    pub fn send_data(&self, id: &str, data: &[u8]) -> SerialResult<usize> {
        let handle = self.entry(id, |m| Arc::clone(&m.handle))?;
        let mut port = handle.lock();
        let written = port
            .write_bytes(data)
            .map_err(|e| SerialError::write_failed(id, e))?;
        debug!("Sent {} bytes to {}", written, id);
        Ok(written)
    }

    /// Read from `id`.
    ///
    /// Without `size`, reads exactly the bytes available at call time and
    /// returns immediately if there are none. With `size`, reads until that
    /// many bytes arrived or the timeout expired. A `timeout` override is
    /// restored to the configured read timeout afterwards, whatever the outcome.
    pub fn read_data(
        &self,
        id: &str,
        size: Option<usize>,
        timeout: Option<Duration>,
    ) -> SerialResult<Vec<u8>> {
        let handle = self.entry(id, |m| Arc::clone(&m.handle))?;
        let mut port = handle.lock();
        let configured = port.timeout();

        if let Some(timeout) = timeout {
            port.set_timeout(timeout)
                .map_err(|e| SerialError::read_failed(id, e))?;
        }
        let result = read_from(&mut **port, size, timeout.unwrap_or(configured));
        if timeout.is_some() {
            if let Err(e) = port.set_timeout(configured) {
                debug!("Could not restore read timeout on {}: {}", id, e);
            }
        }

        result.map_err(|e| SerialError::read_failed(id, e))
    }

    /// Close every port and stop the supervisor.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(mut worker) = self.supervisor.lock().take() {
            worker.stop(self.options.shutdown_timeout);
        }

        let drained: Vec<ManagedPort> = {
            let mut ports = self.registry.ports.lock();
            ports.drain().map(|(_, m)| m).collect()
        };
        for managed in &drained {
            release(&managed.id, &managed.handle);
        }
        if !drained.is_empty() {
            info!("Serial manager shut down, closed {} port(s)", drained.len());
        }
    }

    /// Copy what `f` needs out of the entry for `id`, releasing the registry
    /// lock before returning.
    fn entry<T>(&self, id: &str, f: impl FnOnce(&ManagedPort) -> T) -> SerialResult<T> {
        let ports = self.registry.ports.lock();
        let found = ports.get(id).map(f);
        found.ok_or_else(|| SerialError::PortClosed(id.to_string()))
    }
}

impl Drop for SerialManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialManager")
            .field("ports", &self.registry.ports.lock().len())
            .field("options", &self.options)
            .finish()
    }
}

fn with_probe(status: PortStatus, handle: &SharedHandle) -> PortStatus {
    PortStatus {
        connected: probe(handle),
        ..status
    }
}

/// Reads go through a fixed scratch block, so memory grows with the bytes
/// that actually arrive rather than with the requested size.
const READ_CHUNK: usize = 4096;

fn read_from(
    port: &mut dyn SerialPortAdapter,
    size: Option<usize>,
    timeout: Duration,
) -> Result<Vec<u8>, PortError> {
    let wanted = match size {
        Some(n) => n,
        None => port.bytes_to_read()?,
    };
    if wanted == 0 {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(wanted.min(READ_CHUNK));
    let mut scratch = [0u8; READ_CHUNK];
    let deadline = Instant::now() + timeout;
    while out.len() < wanted {
        let block = (wanted - out.len()).min(READ_CHUNK);
        match port.read_bytes(&mut scratch[..block]) {
            Ok(n) => out.extend_from_slice(&scratch[..n]),
            Err(e) if e.is_timeout() => break,
            Err(e) => return Err(e),
        }
        if Instant::now() >= deadline {
            break;
        }
    }
    Ok(out)
}
