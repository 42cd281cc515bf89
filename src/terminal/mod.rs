//! Terminal sessions over managed connections.
//!
//! Each open port can carry at most one [`TerminalSession`]. A session's
//! reader thread drains the connection into a bounded [`OutputBuffer`]; all
//! byte transfer goes through the [`SerialManager`], never to hardware
//! directly. The session map lock is never held across a call into the
//! serial manager.

mod buffer;
mod session;

pub use buffer::OutputBuffer;
pub use session::{
    LineEnding, SessionInfo, TerminalConfig, TerminalOptions, TerminalSession, DEFAULT_BUFFER_SIZE,
};

use crate::error::{SerialError, SerialResult};
use crate::service::SerialManager;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Buffered output decoded as lossy UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputText {
    pub data: String,
    pub bytes: usize,
}

/// Registry of terminal sessions, keyed by port id.
pub struct TerminalManager {
    serial: Arc<SerialManager>,
    sessions: Mutex<HashMap<String, Arc<TerminalSession>>>,
    options: TerminalOptions,
}

impl TerminalManager {
    pub fn new(serial: Arc<SerialManager>) -> Self {
        Self::with_options(serial, TerminalOptions::default())
    }

    pub fn with_options(serial: Arc<SerialManager>, options: TerminalOptions) -> Self {
        Self {
            serial,
            sessions: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Create a session on an open port from raw parameters.
    ///
    /// # Errors
    ///
    /// - `InvalidLineEnding` unless `line_ending` is CR, LF or CRLF
    /// - `InvalidParam` if `buffer_size` is zero
    /// - `PortNotOpen` if the serial manager does not report `port` open
    /// - `SessionExists` if `port` already has a session
    pub fn create_session(
        &self,
        port: &str,
        line_ending: &str,
        local_echo: bool,
        buffer_size: usize,
    ) -> SerialResult<SessionInfo> {
        let line_ending: LineEnding = line_ending.parse()?;
        self.create_session_with_config(
            port,
            TerminalConfig {
                line_ending,
                local_echo,
                buffer_size,
            },
        )
    }

    pub fn create_session_with_config(
        &self,
        port: &str,
        config: TerminalConfig,
    ) -> SerialResult<SessionInfo> {
        if config.buffer_size == 0 {
            return Err(SerialError::invalid_param(
                "buffer_size",
                0,
                "must be greater than 0",
            ));
        }
        if self.serial.get_status(port).is_err() {
            return Err(SerialError::PortNotOpen(port.to_string()));
        }

        let mut sessions = self.sessions.lock();
        if sessions.contains_key(port) {
            return Err(SerialError::SessionExists(port.to_string()));
        }
        let session = Arc::new(TerminalSession::new(port, config));
        session.start(Arc::clone(&self.serial), self.options)?;
        let info = session.info();
        sessions.insert(port.to_string(), session);

        info!("Created terminal session: {}", port);
        Ok(info)
    }

    pub fn close_session(&self, session_id: &str) -> SerialResult<()> {
        let session = self
            .sessions
            .lock()
            .remove(session_id)
            .ok_or_else(|| SerialError::SessionNotFound(session_id.to_string()))?;
        session.stop(self.options.stop_timeout);
        info!("Closed terminal session: {}", session_id);
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> SerialResult<Arc<TerminalSession>> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SerialError::SessionNotFound(session_id.to_string()))
    }

    /// Send `command`, appending the session's line ending if requested.
    pub fn send_command(
        &self,
        session_id: &str,
        command: &str,
        add_line_ending: bool,
    ) -> SerialResult<usize> {
        let session = self.get_session(session_id)?;
        if !session.is_active() {
            return Err(SerialError::SessionClosed(session_id.to_string()));
        }
        session.send_command(&self.serial, command, add_line_ending)
    }

    pub fn read_output(&self, session_id: &str, clear: bool) -> SerialResult<Vec<u8>> {
        Ok(self.get_session(session_id)?.buffer().read(clear))
    }

    pub fn read_output_text(&self, session_id: &str, clear: bool) -> SerialResult<OutputText> {
        let raw = self.read_output(session_id, clear)?;
        Ok(OutputText {
            bytes: raw.len(),
            data: String::from_utf8_lossy(&raw).into_owned(),
        })
    }

    pub fn clear_buffer(&self, session_id: &str) -> SerialResult<()> {
        self.get_session(session_id)?.buffer().clear();
        Ok(())
    }

    /// Info for every session, sorted by id.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<TerminalSession>> = self.sessions.lock().values().cloned().collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }

    pub fn get_session_info(&self, session_id: &str) -> SerialResult<SessionInfo> {
        Ok(self.get_session(session_id)?.info())
    }

    /// Stop and remove every session. Safe to call more than once.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<TerminalSession>> =
            self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.stop(self.options.stop_timeout);
        }
        if !drained.is_empty() {
            info!("Terminal manager shut down, closed {} session(s)", drained.len());
        }
    }
}

impl Drop for TerminalManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TerminalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalManager")
            .field("sessions", &self.sessions.lock().len())
            .field("options", &self.options)
            .finish()
    }
}
