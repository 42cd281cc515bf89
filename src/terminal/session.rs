//! A terminal session: one bounded output buffer plus a reader thread.

use super::buffer::OutputBuffer;
use crate::error::{SerialError, SerialResult};
use crate::service::SerialManager;
use crate::worker::{StopSignal, Worker};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Line terminator appended to commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineEnding {
    Cr,
    Lf,
    #[default]
    Crlf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Cr => b"\r",
            Self::Lf => b"\n",
            Self::Crlf => b"\r\n",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cr => "CR",
            Self::Lf => "LF",
            Self::Crlf => "CRLF",
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineEnding {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CR" => Ok(Self::Cr),
            "LF" => Ok(Self::Lf),
            "CRLF" => Ok(Self::Crlf),
            _ => Err(SerialError::InvalidLineEnding(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    pub line_ending: LineEnding,
    pub local_echo: bool,
    pub buffer_size: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            line_ending: LineEnding::Crlf,
            local_echo: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Reader loop timing.
#[derive(Debug, Clone, Copy)]
pub struct TerminalOptions {
    /// Pause between reads.
    pub read_interval: Duration,
    /// Read timeout passed to the connection layer on each read.
    pub read_timeout: Duration,
    /// Bounded wait for a reader thread on close.
    pub stop_timeout: Duration,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            read_interval: Duration::from_millis(50),
            read_timeout: Duration::from_millis(50),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub port: String,
    pub config: TerminalConfig,
    /// Bytes currently buffered.
    pub buffer_size: usize,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Logical view over one open port. The session id is the port id.
#[derive(Debug)]
pub struct TerminalSession {
    id: String,
    config: TerminalConfig,
    buffer: Arc<OutputBuffer>,
    active: Arc<AtomicBool>,
    created_at: DateTime<Utc>,
    reader: Mutex<Option<Worker>>,
}

impl TerminalSession {
    pub(crate) fn new(id: &str, config: TerminalConfig) -> Self {
        Self {
            id: id.to_string(),
            config,
            buffer: Arc::new(OutputBuffer::new(config.buffer_size)),
            active: Arc::new(AtomicBool::new(false)),
            created_at: Utc::now(),
            reader: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    /// Start the reader thread.
    pub(crate) fn start(
        &self,
        serial: Arc<SerialManager>,
        options: TerminalOptions,
    ) -> SerialResult<()> {
        self.active.store(true, Ordering::SeqCst);
        let id = self.id.clone();
        let buffer = Arc::clone(&self.buffer);
        let active = Arc::clone(&self.active);

        let worker = Worker::spawn(format!("terminal-read-{}", self.id), move |signal| {
            read_loop(&serial, &id, &buffer, &active, &signal, options)
        })
        .map_err(|e| {
            self.active.store(false, Ordering::SeqCst);
            SerialError::open_failed(self.id.clone(), format!("failed to start reader: {e}"))
        })?;

        *self.reader.lock() = Some(worker);
        info!("Terminal session started: {}", self.id);
        Ok(())
    }

    /// Stop the reader thread, waiting at most `timeout`.
    pub(crate) fn stop(&self, timeout: Duration) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(mut worker) = self.reader.lock().take() {
            worker.stop(timeout);
        }
        info!("Terminal session stopped: {}", self.id);
    }

    /// Encode `command` (plus the line ending) and write it through `serial`.
    pub(crate) fn send_command(
        &self,
        serial: &SerialManager,
        command: &str,
        add_line_ending: bool,
    ) -> SerialResult<usize> {
        let mut data = command.as_bytes().to_vec();
        if add_line_ending {
            data.extend_from_slice(self.config.line_ending.as_bytes());
        }

        let written = serial
            .send_data(&self.id, &data)
            .map_err(|e| SerialError::SendCommandFailed {
                session: self.id.clone(),
                reason: e.to_string(),
            })?;
        if self.config.local_echo {
            self.buffer.append(&data[..written.min(data.len())]);
        }
        debug!("Terminal command sent: {} - {} bytes", self.id, written);
        Ok(written)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            port: self.id.clone(),
            config: self.config,
            buffer_size: self.buffer.len(),
            active: self.is_active(),
            created_at: self.created_at,
        }
    }
}

fn read_loop(
    serial: &SerialManager,
    id: &str,
    buffer: &OutputBuffer,
    active: &AtomicBool,
    signal: &StopSignal,
    options: TerminalOptions,
) {
    while !signal.is_stopped() {
        match serial.read_data(id, None, Some(options.read_timeout)) {
            Ok(data) => buffer.append(&data),
            Err(e) => {
                if active.swap(false, Ordering::SeqCst) {
                    warn!("Terminal read failed, session inactive: {} - {}", id, e);
                }
                break;
            }
        }
        if signal.wait(options.read_interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_ending_parse() {
        assert_eq!("crlf".parse::<LineEnding>().unwrap(), LineEnding::Crlf);
        assert_eq!("Cr".parse::<LineEnding>().unwrap(), LineEnding::Cr);
        assert_eq!("LF".parse::<LineEnding>().unwrap(), LineEnding::Lf);
        assert_eq!(
            "NUL".parse::<LineEnding>().unwrap_err(),
            SerialError::InvalidLineEnding("NUL".into())
        );
    }

    #[test]
    fn test_line_ending_bytes() {
        assert_eq!(LineEnding::Cr.as_bytes(), b"\r");
        assert_eq!(LineEnding::Lf.as_bytes(), b"\n");
        assert_eq!(LineEnding::Crlf.as_bytes(), b"\r\n");
    }

    #[test]
    fn test_default_config() {
        let config = TerminalConfig::default();
        assert_eq!(config.line_ending, LineEnding::Crlf);
        assert!(!config.local_echo);
        assert_eq!(config.buffer_size, 65536);
    }

    #[test]
    fn test_info_serializes_line_ending_name() {
        let session = TerminalSession::new("P1", TerminalConfig::default());
        let json = serde_json::to_value(session.info()).unwrap();
        assert_eq!(json["session_id"], "P1");
        assert_eq!(json["config"]["line_ending"], "CRLF");
        assert_eq!(json["active"], false);
    }
}
