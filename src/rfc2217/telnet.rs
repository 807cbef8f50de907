//! Blocking TCP implementation of the telnet transport.
//!
//! Owns the telnet command framing of the session: IAC escaping of data
//! bytes, WILL/WONT/DO/DONT dispositions for the options this crate offers,
//! and `IAC SB ... IAC SE` collection of sub-negotiation payloads. A reader
//! thread demultiplexes the socket; decoded data bytes flow into a blocking
//! pipe that backs the session's read stream, everything else is delivered
//! to the registered listener.

use super::transport::{NegotiationEvent, TelnetListener, TelnetTransport};
use super::{BINARY_OPTION, COM_PORT_OPTION};
use crate::error::{SerialError, SerialResult};
use crate::octets;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

// Telnet command bytes (RFC 854).
const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Telnet client over a TCP socket.
///
/// On connect it offers the binary-transmission option in both directions
/// and the com-port option, then reports the peer's dispositions to the
/// registered listener.
pub struct TcpTelnetTransport {
    host: String,
    port: u16,
    state: Mutex<State>,
    listener: Mutex<Option<Arc<dyn TelnetListener>>>,
}

#[derive(Default)]
struct State {
    socket: Option<TcpStream>,
    pipe: Option<Arc<DataPipe>>,
}

impl TcpTelnetTransport {
    /// Creates a transport that will connect to `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            state: Mutex::new(State::default()),
            listener: Mutex::new(None),
        }
    }

    fn session_loop(
        socket: TcpStream,
        replies: TcpStream,
        listener: Option<Arc<dyn TelnetListener>>,
        pipe: Arc<DataPipe>,
    ) {
        let mut input = BufReader::new(socket);
        if let Err(e) = Self::parse_stream(&mut input, &replies, listener.as_deref(), &pipe) {
            debug!(error = %e, "telnet session ended with an I/O error");
        }
        pipe.close();
    }

    fn parse_stream<R: Read>(
        input: &mut R,
        replies: &TcpStream,
        listener: Option<&dyn TelnetListener>,
        pipe: &DataPipe,
    ) -> io::Result<()> {
        loop {
            let Some(byte) = read_octet(input)? else {
                return Ok(());
            };
            if byte != IAC {
                pipe.push(byte);
                continue;
            }
            let Some(command) = read_octet(input)? else {
                return Ok(());
            };
            match command {
                // Escaped data byte.
                IAC => pipe.push(IAC),
                WILL | WONT | DO | DONT => {
                    let Some(option) = read_octet(input)? else {
                        return Ok(());
                    };
                    Self::handle_disposition(command, option, replies, listener)?;
                }
                SB => {
                    let Some(payload) = read_subnegotiation(input)? else {
                        return Ok(());
                    };
                    trace!(len = payload.len(), "sub-negotiation payload received");
                    if let Some(listener) = listener {
                        listener.on_subnegotiation(&payload);
                    }
                }
                other => trace!(command = other, "ignoring telnet command"),
            }
        }
    }

    /// Answers a peer disposition and reports it for the options this
    /// transport offered at connect time.
    fn handle_disposition(
        command: u8,
        option: u8,
        replies: &TcpStream,
        listener: Option<&dyn TelnetListener>,
    ) -> io::Result<()> {
        let offered = option == BINARY_OPTION || option == COM_PORT_OPTION;
        match command {
            DO | WILL if offered => {
                trace!(option, "option accepted by the peer");
                if let Some(listener) = listener {
                    listener.on_negotiation(option, NegotiationEvent::Accepted);
                }
            }
            DONT if offered => {
                // DONT demands an acknowledging WONT.
                send(replies, &[IAC, WONT, option])?;
                if let Some(listener) = listener {
                    listener.on_negotiation(option, NegotiationEvent::Refused);
                }
            }
            WONT if offered => {
                if let Some(listener) = listener {
                    listener.on_negotiation(option, NegotiationEvent::Refused);
                }
            }
            // Anything the peer requests beyond the offered options is refused.
            DO => send(replies, &[IAC, WONT, option])?,
            WILL => send(replies, &[IAC, DONT, option])?,
            _ => {}
        }
        Ok(())
    }
}

impl TelnetTransport for TcpTelnetTransport {
    fn connect(&self) -> SerialResult<()> {
        let mut state = self.state.lock();
        if state.socket.is_some() {
            return Err(SerialError::invalid_argument(
                "the transport is already connected",
            ));
        }

        let socket = TcpStream::connect((self.host.as_str(), self.port))?;
        debug!(host = %self.host, port = self.port, "telnet session established");

        // Offer binary transmission in both directions and the com-port
        // option before any data flows.
        send(
            &socket,
            &[
                IAC, WILL, BINARY_OPTION,
                IAC, DO, BINARY_OPTION,
                IAC, WILL, COM_PORT_OPTION,
            ],
        )?;

        let pipe = Arc::new(DataPipe::new());
        let reader_socket = socket.try_clone()?;
        let reply_socket = socket.try_clone()?;
        let listener = self.listener.lock().clone();
        let session_pipe = pipe.clone();
        thread::Builder::new()
            .name("telnet-session".into())
            .spawn(move || {
                Self::session_loop(reader_socket, reply_socket, listener, session_pipe)
            })
            .map_err(SerialError::Io)?;

        state.socket = Some(socket);
        state.pipe = Some(pipe);
        Ok(())
    }

    fn disconnect(&self) -> SerialResult<()> {
        let mut state = self.state.lock();
        if let Some(socket) = state.socket.take() {
            match socket.shutdown(Shutdown::Both) {
                Ok(()) => {}
                // The peer may have torn the session down first.
                Err(e) if e.kind() == ErrorKind::NotConnected => {}
                Err(e) => {
                    // Keep the socket so the caller can retry the teardown.
                    state.socket = Some(socket);
                    return Err(e.into());
                }
            }
            if let Some(pipe) = state.pipe.take() {
                pipe.close();
            }
            debug!(host = %self.host, port = self.port, "telnet session closed");
        }
        Ok(())
    }

    fn register_listener(&self, listener: Arc<dyn TelnetListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn send_subnegotiation(&self, payload: &[u32]) -> SerialResult<()> {
        let state = self.state.lock();
        let socket = state
            .socket
            .as_ref()
            .ok_or_else(|| SerialError::invalid_argument("the transport is not connected"))?;

        let bytes = octets::to_byte_array(payload, payload.len());
        let mut frame = Vec::with_capacity(bytes.len() + 4);
        frame.push(IAC);
        frame.push(SB);
        for byte in bytes {
            if byte == IAC {
                frame.push(IAC);
            }
            frame.push(byte);
        }
        frame.push(IAC);
        frame.push(SE);
        send(socket, &frame)?;
        Ok(())
    }

    fn byte_streams(&self) -> SerialResult<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        let state = self.state.lock();
        let socket = state
            .socket
            .as_ref()
            .ok_or_else(|| SerialError::invalid_argument("the transport is not connected"))?;
        let pipe = state
            .pipe
            .as_ref()
            .expect("a connected transport always has a pipe")
            .clone();
        let output = socket.try_clone()?;
        Ok((
            Box::new(PipeReader { pipe }),
            Box::new(EscapingWriter { socket: output }),
        ))
    }
}

fn send(mut socket: &TcpStream, bytes: &[u8]) -> io::Result<()> {
    socket.write_all(bytes)?;
    socket.flush()
}

fn read_octet<R: Read>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Collects octet values until `IAC SE`. Returns `None` if the stream ends
/// mid-frame.
fn read_subnegotiation<R: Read>(input: &mut R) -> io::Result<Option<Vec<u32>>> {
    let mut payload = Vec::new();
    loop {
        let Some(byte) = read_octet(input)? else {
            return Ok(None);
        };
        if byte != IAC {
            payload.push(u32::from(byte));
            continue;
        }
        let Some(command) = read_octet(input)? else {
            return Ok(None);
        };
        match command {
            SE => return Ok(Some(payload)),
            IAC => payload.push(u32::from(IAC)),
            other => trace!(command = other, "ignoring telnet command inside sub-negotiation"),
        }
    }
}

/// Decoded data bytes, handed from the session thread to the read stream.
struct PipeBuffer {
    data: VecDeque<u8>,
    eof: bool,
}

struct DataPipe {
    buffer: Mutex<PipeBuffer>,
    available: Condvar,
}

impl DataPipe {
    fn new() -> Self {
        Self {
            buffer: Mutex::new(PipeBuffer {
                data: VecDeque::new(),
                eof: false,
            }),
            available: Condvar::new(),
        }
    }

    fn push(&self, byte: u8) {
        let mut buffer = self.buffer.lock();
        buffer.data.push_back(byte);
        self.available.notify_all();
    }

    fn close(&self) {
        let mut buffer = self.buffer.lock();
        buffer.eof = true;
        self.available.notify_all();
    }
}

/// Read side of the data pipe; blocks until data or end of session.
struct PipeReader {
    pipe: Arc<DataPipe>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut buffer = self.pipe.buffer.lock();
        while buffer.data.is_empty() {
            if buffer.eof {
                return Ok(0);
            }
            self.pipe.available.wait(&mut buffer);
        }
        let count = buf.len().min(buffer.data.len());
        for slot in buf.iter_mut().take(count) {
            *slot = buffer.data.pop_front().expect("count is bounded by len");
        }
        Ok(count)
    }
}

/// Write side of the session; doubles IAC so data bytes survive framing.
struct EscapingWriter {
    socket: TcpStream,
}

impl Write for EscapingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut escaped = Vec::with_capacity(buf.len());
        for &byte in buf {
            if byte == IAC {
                escaped.push(IAC);
            }
            escaped.push(byte);
        }
        self.socket.write_all(&escaped)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}
