//! Unified error type for serial connections.
//!
//! The variants separate the failure classes callers react to differently:
//! invalid arguments are rejected before any I/O and never retried, protocol
//! violations are fatal to the current open or command attempt, timeouts name
//! the option or command that expired, and I/O errors surface unmodified.

use thiserror::Error;

/// A specialized `Result` for serial port operations.
pub type SerialResult<T> = Result<T, SerialError>;

/// Errors that can occur while opening or using a serial connection.
#[derive(Debug, Error)]
pub enum SerialError {
    /// An argument was rejected before any I/O took place.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed or unexpected wire data, a refused telnet option, or a
    /// refused port setting.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No resolution arrived within the configured deadline. The message
    /// names the option or command that timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The operation requires an open port.
    #[error("Port {0} is closed!")]
    PortClosed(String),

    /// An I/O error from the underlying transport or device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side closed the stream before any byte was delivered.
    #[error("Unexpected end of stream, the remote side closed the connection")]
    EndOfStream,
}

impl SerialError {
    /// Create an InvalidArgument error from a message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a Protocol error from a message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a Timeout error from a message.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a PortClosed error from a port name.
    pub fn port_closed(port_name: impl Into<String>) -> Self {
        Self::PortClosed(port_name.into())
    }
}
