//! Public error type for connection and terminal operations.
//!
//! Every public operation of [`crate::SerialManager`] and
//! [`crate::TerminalManager`] fails with a [`SerialError`]. Each variant maps to
//! a stable numeric [`ErrorCode`] for the protocol layer.

use crate::port::PortError;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Display;
use thiserror::Error;

/// Stable numeric error codes.
///
/// Connection errors live in 1001-1999, terminal session errors in 2001-2999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum ErrorCode {
    PortNotFound = 1001,
    PortBusy = 1002,
    PortOpenFailed = 1003,
    PortClosed = 1004,
    InvalidParam = 1005,
    ReadFailed = 1006,
    WriteFailed = 1007,
    PermissionDenied = 1008,
    PortBlacklisted = 1009,

    SessionExists = 2001,
    SessionNotFound = 2002,
    PortNotOpen = 2003,
    SessionClosed = 2004,
    SendCommandFailed = 2005,
    InvalidLineEnding = 2006,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerialError {
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    #[error("Serial port is busy: {0}")]
    PortBusy(String),

    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed { port: String, reason: String },

    /// Operation on a port that is not in the registry.
    #[error("Serial port is closed: {0}")]
    PortClosed(String),

    #[error("Invalid parameter {param}={value} ({reason})")]
    InvalidParam {
        param: &'static str,
        value: String,
        reason: String,
    },

    #[error("Read from {port} failed: {reason}")]
    ReadFailed { port: String, reason: String },

    #[error("Write to {port} failed: {reason}")]
    WriteFailed { port: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Serial port is blacklisted: {0}")]
    PortBlacklisted(String),

    #[error("Terminal session already exists: {0}")]
    SessionExists(String),

    #[error("Terminal session not found: {0}")]
    SessionNotFound(String),

    /// A session was requested for a port the registry does not report open.
    #[error("Serial port is not open: {0}")]
    PortNotOpen(String),

    #[error("Terminal session is closed: {0}")]
    SessionClosed(String),

    #[error("Failed to send command on {session}: {reason}")]
    SendCommandFailed { session: String, reason: String },

    #[error("Invalid line ending: {0} (supported values: CR, LF, CRLF)")]
    InvalidLineEnding(String),
}

/// Result type for connection and terminal operations.
pub type SerialResult<T> = Result<T, SerialError>;

impl SerialError {
    /// Create an InvalidParam error naming the field, the offending value and
    /// the accepted set or range.
    pub fn invalid_param(param: &'static str, value: impl Display, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            param,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn open_failed(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PortOpenFailed {
            port: port.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failed(port: impl Into<String>, reason: impl Display) -> Self {
        Self::WriteFailed {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read_failed(port: impl Into<String>, reason: impl Display) -> Self {
        Self::ReadFailed {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PortNotFound(_) => ErrorCode::PortNotFound,
            Self::PortBusy(_) => ErrorCode::PortBusy,
            Self::PortOpenFailed { .. } => ErrorCode::PortOpenFailed,
            Self::PortClosed(_) => ErrorCode::PortClosed,
            Self::InvalidParam { .. } => ErrorCode::InvalidParam,
            Self::ReadFailed { .. } => ErrorCode::ReadFailed,
            Self::WriteFailed { .. } => ErrorCode::WriteFailed,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::PortBlacklisted(_) => ErrorCode::PortBlacklisted,
            Self::SessionExists(_) => ErrorCode::SessionExists,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::PortNotOpen(_) => ErrorCode::PortNotOpen,
            Self::SessionClosed(_) => ErrorCode::SessionClosed,
            Self::SendCommandFailed { .. } => ErrorCode::SendCommandFailed,
            Self::InvalidLineEnding(_) => ErrorCode::InvalidLineEnding,
        }
    }

    /// Render as `{"error": {"code": ..., "message": ...}}`.
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code().as_u16(),
                "message": self.to_string(),
            }
        })
    }
}

/// Map a backend failure from opening `port` onto a public error kind.
///
/// Structured variants are used when the backend provides them. Otherwise the
/// failure text is inspected, which is best-effort: text that matches none of
/// the known phrases is reported as a generic open failure carrying the raw
/// description.
pub fn classify_open_failure(port: &str, err: &PortError) -> SerialError {
    match err {
        PortError::NotFound(_) => return SerialError::PortNotFound(port.to_string()),
        PortError::Io(io) => match io.kind() {
            std::io::ErrorKind::NotFound => return SerialError::PortNotFound(port.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                return SerialError::PermissionDenied(port.to_string())
            }
            _ => {}
        },
        PortError::Config(msg) => return SerialError::open_failed(port, msg.clone()),
        _ => {}
    }
    classify_open_failure_text(port, &err.to_string())
}

/// Text-only half of [`classify_open_failure`].
pub fn classify_open_failure_text(port: &str, description: &str) -> SerialError {
    let lower = description.to_lowercase();
    if lower.contains("no such file") || lower.contains("not found") {
        SerialError::PortNotFound(port.to_string())
    } else if lower.contains("permission") || lower.contains("access") {
        SerialError::PermissionDenied(port.to_string())
    } else if lower.contains("busy") || lower.contains("in use") {
        SerialError::PortBusy(port.to_string())
    } else {
        SerialError::open_failed(port, description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SerialError::PortNotFound("x".into()).code().as_u16(), 1001);
        assert_eq!(SerialError::PortBlacklisted("x".into()).code().as_u16(), 1009);
        assert_eq!(SerialError::SessionExists("x".into()).code().as_u16(), 2001);
        assert_eq!(
            SerialError::InvalidLineEnding("x".into()).code().as_u16(),
            2006
        );
    }

    #[test]
    fn test_invalid_param_display() {
        let err = SerialError::invalid_param("baudrate", 1234, "supported values: [9600]");
        assert_eq!(
            err.to_string(),
            "Invalid parameter baudrate=1234 (supported values: [9600])"
        );
    }

    #[test]
    fn test_to_json() {
        let v = SerialError::PortClosed("/dev/ttyUSB0".into()).to_json();
        assert_eq!(v["error"]["code"], 1004);
        assert_eq!(v["error"]["message"], "Serial port is closed: /dev/ttyUSB0");
    }

    #[test]
    fn test_classify_by_text() {
        let port = "/dev/ttyUSB0";
        assert!(matches!(
            classify_open_failure_text(port, "could not open port: [Errno 2] No such file or directory"),
            SerialError::PortNotFound(_)
        ));
        assert!(matches!(
            classify_open_failure_text(port, "Access is denied."),
            SerialError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_open_failure_text(port, "Device or resource busy"),
            SerialError::PortBusy(_)
        ));
        match classify_open_failure_text(port, "something odd happened") {
            SerialError::PortOpenFailed { reason, .. } => assert_eq!(reason, "something odd happened"),
            other => panic!("expected PortOpenFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_structured() {
        let err = PortError::not_found("/dev/ttyACM3");
        assert!(matches!(
            classify_open_failure("/dev/ttyACM3", &err),
            SerialError::PortNotFound(p) if p == "/dev/ttyACM3"
        ));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            classify_open_failure("COM4", &PortError::Io(io)),
            SerialError::PermissionDenied(_)
        ));
    }
}
