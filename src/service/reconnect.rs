//! Reconnect supervisor.
//!
//! Every interval the supervisor probes each port opted into auto-reconnect.
//! A port whose probe fails is marked `reconnecting` and its handle is
//! recreated from the stored configuration outside the registry lock. Retries
//! happen at the fixed interval until the device returns or the port is closed.

use super::{probe, release, Registry, SharedHandle};
use crate::state::SerialConfig;
use crate::worker::StopSignal;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(super) fn run(registry: &Registry, signal: &StopSignal, interval: Duration) {
    debug!("Reconnect supervisor started (interval {:?})", interval);
    while !signal.wait(interval) {
        check_ports(registry);
    }
    debug!("Reconnect supervisor stopped");
}

/// One supervisor pass over the registry.
pub(super) fn check_ports(registry: &Registry) {
    let candidates: Vec<(String, SharedHandle)> = {
        let ports = registry.ports.lock();
        ports
            .values()
            .filter(|m| m.auto_reconnect && !m.reconnecting)
            .map(|m| (m.id.clone(), Arc::clone(&m.handle)))
            .collect()
    };

    for (id, handle) in candidates {
        if probe(&handle) {
            continue;
        }
        let Some(config) = mark_reconnecting(registry, &id, &handle) else {
            continue;
        };
        warn!("Serial port {} disconnected, attempting to reconnect", id);
        reconnect(registry, &id, &handle, &config);
    }
}

/// Flag the entry if it still holds `stale`. Returns the config to reopen with.
fn mark_reconnecting(registry: &Registry, id: &str, stale: &SharedHandle) -> Option<SerialConfig> {
    let mut ports = registry.ports.lock();
    match ports.get_mut(id) {
        Some(m) if Arc::ptr_eq(&m.handle, stale) && !m.reconnecting => {
            m.reconnecting = true;
            Some(m.config)
        }
        _ => None,
    }
}

fn reconnect(registry: &Registry, id: &str, stale: &SharedHandle, config: &SerialConfig) {
    let fresh = match registry.opener.open(id, config) {
        Ok(port) => Arc::new(Mutex::new(port)),
        Err(e) => {
            debug!("Reconnect attempt for {} failed: {}", id, e);
            let mut ports = registry.ports.lock();
            if let Some(m) = ports.get_mut(id) {
                if Arc::ptr_eq(&m.handle, stale) {
                    m.reconnecting = false;
                }
            }
            return;
        }
    };

    let mut ports = registry.ports.lock();
    match ports.get_mut(id) {
        Some(m) if Arc::ptr_eq(&m.handle, stale) => {
            let old = std::mem::replace(&mut m.handle, fresh);
            m.reconnecting = false;
            drop(ports);
            release(id, &old);
            info!("Serial port {} reconnected", id);
        }
        _ => {
            // Closed (or reopened) while the new handle was being created.
            drop(ports);
            release(id, &fresh);
            info!("Serial port {} was closed during reconnect, discarding new handle", id);
        }
    }
}
