//! Generic synchronized connection wrapper.
//!
//! [`SerialConnection`] provides the uniform write/read/close contract over
//! any backend that implements the capability traits below. It guarantees at
//! most one in-flight read and, independently, at most one in-flight write,
//! observes closure before either lock is taken, and closes eagerly when a
//! backend operation fails.

use crate::error::{SerialError, SerialResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Reading side of a connection backend.
pub trait ReadHalf: Send {
    /// Blocks until at least one byte is available and returns the bytes
    /// read. Must never return an empty buffer; a stream that ends before
    /// delivering a byte reports [`SerialError::EndOfStream`].
    fn read_internal(&mut self) -> SerialResult<Vec<u8>>;
}

/// Writing side of a connection backend.
pub trait WriteHalf: Send {
    /// Writes all bytes, forwarding them to the underlying port before
    /// returning.
    fn write_internal(&mut self, data: &[u8]) -> SerialResult<()>;
}

/// Releases the backend's resources.
pub trait CloseHandle: Send {
    /// Invoked at most once per successful close. A failing call leaves the
    /// connection open so the caller can retry `close()`.
    fn close_internal(&mut self) -> SerialResult<()>;
}

/// Synchronized connection over an arbitrary backend.
///
/// Reads and writes may proceed concurrently, but two reads or two writes
/// never overlap: each side holds its own lock. The closed flag is monotonic,
/// a connection never reopens.
pub struct SerialConnection {
    /// Used in the port-closed error message.
    port_name: String,
    closed: AtomicBool,
    reader: Mutex<Box<dyn ReadHalf>>,
    writer: Mutex<Box<dyn WriteHalf>>,
    closer: Mutex<Box<dyn CloseHandle>>,
}

impl SerialConnection {
    /// Assembles a connection from a backend's halves.
    pub fn new(
        port_name: impl Into<String>,
        reader: Box<dyn ReadHalf>,
        writer: Box<dyn WriteHalf>,
        closer: Box<dyn CloseHandle>,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            closed: AtomicBool::new(false),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closer: Mutex::new(closer),
        }
    }

    /// Writes `data` to the port.
    ///
    /// Fails with [`SerialError::PortClosed`] if the connection is closed.
    /// On a backend I/O failure the connection is closed before the error is
    /// returned; no further writes are possible after a failed write.
    pub fn write(&self, data: &[u8]) -> SerialResult<()> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        match writer.write_internal(data) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close()?;
                Err(e)
            }
        }
    }

    /// Reads from the port, blocking until at least one byte is available.
    ///
    /// Fails with [`SerialError::PortClosed`] if the connection is closed.
    /// On a backend I/O failure the connection is closed before the error is
    /// returned.
    pub fn read(&self) -> SerialResult<Vec<u8>> {
        self.ensure_open()?;
        let mut reader = self.reader.lock();
        match reader.read_internal() {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.close()?;
                Err(e)
            }
        }
    }

    /// Closes the connection.
    ///
    /// Idempotent: only the first call reaches the backend. The closed flag
    /// is set only after the backend close returns, so a failing close leaves
    /// the connection retry-able and the backend error propagates unmodified.
    pub fn close(&self) -> SerialResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut closer = self.closer.lock();
        // A concurrent close may have won the race for the lock.
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        closer.close_internal()?;
        self.closed.store(true, Ordering::SeqCst);
        debug!(port = %self.port_name, "connection closed");
        Ok(())
    }

    /// Whether `close()` has completed successfully.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The name of the port this connection belongs to.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn ensure_open(&self) -> SerialResult<()> {
        if self.is_closed() {
            return Err(SerialError::port_closed(self.port_name.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SerialConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection")
            .field("port_name", &self.port_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
