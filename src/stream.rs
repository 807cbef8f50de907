//! Adapters that turn raw byte streams into connection backends.
//!
//! Any `io::Read`/`io::Write` pair, such as the byte streams of a telnet
//! session, becomes a [`SerialConnection`](crate::connection::SerialConnection)
//! backend through these two wrappers.

use crate::connection::{ReadHalf, WriteHalf};
use crate::error::{SerialError, SerialResult};
use std::io::{ErrorKind, Read, Write};

/// Buffer capacity of a single read.
pub(crate) const READ_BUFFER_SIZE: usize = 4096;

/// Blocks on an input stream and yields the bytes of each successful read.
pub struct StreamReader<R> {
    input: R,
}

impl<R: Read + Send> StreamReader<R> {
    /// Wraps the given input stream.
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: Read + Send> ReadHalf for StreamReader<R> {
    /// Returns between 1 and 4096 bytes, never an empty buffer. A stream that
    /// ends before delivering a byte reports [`SerialError::EndOfStream`].
    fn read_internal(&mut self) -> SerialResult<Vec<u8>> {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match self.input.read(&mut buffer) {
                Ok(0) => return Err(SerialError::EndOfStream),
                Ok(read) => {
                    buffer.truncate(read);
                    return Ok(buffer);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Forwards every write in full to an output stream and flushes it.
pub struct StreamWriter<W> {
    output: W,
}

impl<W: Write + Send> StreamWriter<W> {
    /// Wraps the given output stream.
    pub fn new(output: W) -> Self {
        Self { output }
    }
}

impl<W: Write + Send> WriteHalf for StreamWriter<W> {
    /// All bytes are forwarded to the stream before the call returns.
    fn write_internal(&mut self, data: &[u8]) -> SerialResult<()> {
        self.output.write_all(data)?;
        self.output.flush()?;
        Ok(())
    }
}
