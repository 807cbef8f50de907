//! Scriptable doubles for tests.
//!
//! [`MockTransport`] plays the access-server side of the telnet transport
//! contract: option dispositions are configured up front, setting commands
//! are echoed back the way a compliant server confirms them, and everything
//! sent is captured for inspection. [`MockBackend`] is a queue-backed
//! connection backend for exercising
//! [`SerialConnection`](crate::connection::SerialConnection) without any
//! transport. Both are exported so downstream crates can test against this
//! crate without hardware or a live access server.

use crate::connection::{CloseHandle, ReadHalf, WriteHalf};
use crate::error::{SerialError, SerialResult};
use crate::octets;
use crate::rfc2217::transport::{NegotiationEvent, TelnetListener, TelnetTransport};
use crate::rfc2217::{BINARY_OPTION, COM_PORT_OPTION};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

struct TransportState {
    listener: Option<Arc<dyn TelnetListener>>,
    /// Disposition announced for each option on connect; options absent
    /// from the map stay silent, which is how timeouts are provoked.
    dispositions: HashMap<u8, NegotiationEvent>,
    /// Whether sub-negotiation requests are echoed back as confirmations.
    echo: bool,
    /// Scripted responses served before any echo, one per request.
    scripted_responses: VecDeque<Vec<u8>>,
    connected: bool,
    connect_count: u32,
    disconnect_count: u32,
    sent_subnegotiations: Vec<Vec<u8>>,
    /// Bytes the session's read stream will yield.
    session_data: VecDeque<u8>,
    /// Bytes written to the session's write stream.
    written: Vec<u8>,
}

/// In-memory stand-in for an RFC2217 access server.
///
/// Freshly created, it accepts both options and confirms every setting
/// command by echoing it, so a default `open()` succeeds.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use serial_link::mock::MockTransport;
/// use serial_link::rfc2217::Rfc2217SerialPort;
/// use serial_link::settings::SerialPortSettings;
///
/// let transport = Arc::new(MockTransport::new());
/// let port = Rfc2217SerialPort::with_transport("mock", 23, transport.clone());
/// let connection = port.open(&SerialPortSettings::default()).unwrap();
/// assert_eq!(connection.port_name(), "RFC2217@mock:23");
/// connection.close().unwrap();
/// assert_eq!(transport.disconnect_count(), 1);
/// ```
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    /// Creates a transport that accepts both options and echoes commands.
    pub fn new() -> Self {
        let mut dispositions = HashMap::new();
        dispositions.insert(BINARY_OPTION, NegotiationEvent::Accepted);
        dispositions.insert(COM_PORT_OPTION, NegotiationEvent::Accepted);
        Self {
            state: Arc::new(Mutex::new(TransportState {
                listener: None,
                dispositions,
                echo: true,
                scripted_responses: VecDeque::new(),
                connected: false,
                connect_count: 0,
                disconnect_count: 0,
                sent_subnegotiations: Vec::new(),
                session_data: VecDeque::new(),
                written: Vec::new(),
            })),
        }
    }

    /// Announce `option` as refused on connect.
    pub fn refuse_option(&self, option: u8) {
        self.state
            .lock()
            .dispositions
            .insert(option, NegotiationEvent::Refused);
    }

    /// Never announce a disposition for `option`.
    pub fn ignore_option(&self, option: u8) {
        self.state.lock().dispositions.remove(&option);
    }

    /// Never announce any disposition; negotiation will time out.
    pub fn ignore_all_options(&self) {
        self.state.lock().dispositions.clear();
    }

    /// Stop echoing setting commands; requests go unanswered.
    pub fn stop_echoing(&self) {
        self.state.lock().echo = false;
    }

    /// Serve `response` (raw sub-negotiation bytes) for the next request
    /// instead of the echo.
    pub fn respond_next_with(&self, response: &[u8]) {
        self.state
            .lock()
            .scripted_responses
            .push_back(response.to_vec());
    }

    /// Deliver an unsolicited sub-negotiation payload to the listener, as
    /// an access server volunteering data would.
    pub fn deliver_subnegotiation(&self, payload: &[u8]) {
        let listener = self.state.lock().listener.clone();
        if let Some(listener) = listener {
            listener.on_subnegotiation(&octets::to_int_array(payload));
        }
    }

    /// Queue bytes the session's read stream will yield.
    pub fn enqueue_session_data(&self, data: &[u8]) {
        self.state.lock().session_data.extend(data);
    }

    /// Every sub-negotiation frame sent so far, in order.
    pub fn sent_subnegotiations(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent_subnegotiations.clone()
    }

    /// Everything written to the session's write stream.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Number of completed `connect()` calls.
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connect_count
    }

    /// Number of completed `disconnect()` teardowns.
    pub fn disconnect_count(&self) -> u32 {
        self.state.lock().disconnect_count
    }

    /// Whether the transport is currently connected.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// A compliant server confirms a request by echoing its payload under
    /// the response code, which sits 100 above the request code.
    fn echoed(request: &[u8]) -> Option<Vec<u8>> {
        let code = *request.get(1)?;
        let mut response = request.to_vec();
        response[1] = code.checked_add(100)?;
        Some(response)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetTransport for MockTransport {
    fn connect(&self) -> SerialResult<()> {
        let (listener, dispositions) = {
            let mut state = self.state.lock();
            state.connected = true;
            state.connect_count += 1;
            (state.listener.clone(), state.dispositions.clone())
        };
        // The real access server answers the offers right away; dispositions
        // are delivered before connect returns, deterministically ordered.
        if let Some(listener) = listener {
            let mut announced: Vec<_> = dispositions.into_iter().collect();
            announced.sort_by_key(|(option, _)| *option);
            for (option, event) in announced {
                listener.on_negotiation(option, event);
            }
        }
        Ok(())
    }

    fn disconnect(&self) -> SerialResult<()> {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.disconnect_count += 1;
        }
        Ok(())
    }

    fn register_listener(&self, listener: Arc<dyn TelnetListener>) {
        self.state.lock().listener = Some(listener);
    }

    fn send_subnegotiation(&self, payload: &[u32]) -> SerialResult<()> {
        let bytes = octets::to_byte_array(payload, payload.len());
        let (listener, response) = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(SerialError::invalid_argument(
                    "the transport is not connected",
                ));
            }
            state.sent_subnegotiations.push(bytes.clone());
            let response = state
                .scripted_responses
                .pop_front()
                .or_else(|| state.echo.then(|| Self::echoed(&bytes)).flatten());
            (state.listener.clone(), response)
        };
        if let (Some(listener), Some(response)) = (listener, response) {
            listener.on_subnegotiation(&octets::to_int_array(&response));
        }
        Ok(())
    }

    fn byte_streams(&self) -> SerialResult<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        if !self.state.lock().connected {
            return Err(SerialError::invalid_argument(
                "the transport is not connected",
            ));
        }
        Ok((
            Box::new(SessionReader {
                state: self.state.clone(),
            }),
            Box::new(SessionWriter {
                state: self.state.clone(),
            }),
        ))
    }
}

/// Yields the scripted session data; an exhausted script reads as end of
/// stream.
struct SessionReader {
    state: Arc<Mutex<TransportState>>,
}

impl Read for SessionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let count = buf.len().min(state.session_data.len());
        for slot in buf.iter_mut().take(count) {
            *slot = state.session_data.pop_front().expect("count is bounded");
        }
        Ok(count)
    }
}

/// Captures everything written through the session.
struct SessionWriter {
    state: Arc<Mutex<TransportState>>,
}

impl Write for SessionWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BackendState {
    read_queue: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    fail_next_read: Option<String>,
    fail_next_write: Option<String>,
    fail_next_close: Option<String>,
    close_count: u32,
}

/// Queue-backed connection backend.
///
/// Reads pop pre-enqueued buffers, writes are captured, and each half can be
/// told to fail its next operation. The backend hands out its halves via
/// [`halves`](MockBackend::halves) and keeps the shared state for the test
/// to inspect afterwards.
///
/// # Example
/// ```
/// use serial_link::connection::SerialConnection;
/// use serial_link::mock::MockBackend;
///
/// let backend = MockBackend::new();
/// backend.enqueue_read(b"ok");
/// let (reader, writer, closer) = backend.halves();
/// let connection = SerialConnection::new("MOCK0", reader, writer, closer);
///
/// connection.write(b"ping").unwrap();
/// assert_eq!(connection.read().unwrap(), b"ok");
/// assert_eq!(backend.writes(), vec![b"ping".to_vec()]);
/// connection.close().unwrap();
/// assert_eq!(backend.close_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces the three capability halves sharing this backend's state.
    pub fn halves(&self) -> (Box<dyn ReadHalf>, Box<dyn WriteHalf>, Box<dyn CloseHandle>) {
        (
            Box::new(MockReadHalf {
                state: self.state.clone(),
            }),
            Box::new(MockWriteHalf {
                state: self.state.clone(),
            }),
            Box::new(MockCloseHandle {
                state: self.state.clone(),
            }),
        )
    }

    /// Queue a buffer to be returned by a subsequent read.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.push_back(data.to_vec());
    }

    /// Make the next read fail with an I/O error carrying `message`.
    pub fn fail_next_read(&self, message: &str) {
        self.state.lock().fail_next_read = Some(message.to_string());
    }

    /// Make the next write fail with an I/O error carrying `message`.
    pub fn fail_next_write(&self, message: &str) {
        self.state.lock().fail_next_write = Some(message.to_string());
    }

    /// Make the next close fail with an I/O error carrying `message`.
    pub fn fail_next_close(&self, message: &str) {
        self.state.lock().fail_next_close = Some(message.to_string());
    }

    /// Every buffer written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// How many times the backend's close was invoked.
    pub fn close_count(&self) -> u32 {
        self.state.lock().close_count
    }
}

struct MockReadHalf {
    state: Arc<Mutex<BackendState>>,
}

impl ReadHalf for MockReadHalf {
    fn read_internal(&mut self) -> SerialResult<Vec<u8>> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_read.take() {
            return Err(io::Error::other(message).into());
        }
        match state.read_queue.pop_front() {
            Some(data) => Ok(data),
            // An exhausted queue reads as the stream having ended.
            None => Err(SerialError::EndOfStream),
        }
    }
}

struct MockWriteHalf {
    state: Arc<Mutex<BackendState>>,
}

impl WriteHalf for MockWriteHalf {
    fn write_internal(&mut self, data: &[u8]) -> SerialResult<()> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_write.take() {
            return Err(io::Error::other(message).into());
        }
        state.writes.push(data.to_vec());
        Ok(())
    }
}

struct MockCloseHandle {
    state: Arc<Mutex<BackendState>>,
}

impl CloseHandle for MockCloseHandle {
    fn close_internal(&mut self) -> SerialResult<()> {
        let mut state = self.state.lock();
        state.close_count += 1;
        if let Some(message) = state.fail_next_close.take() {
            return Err(io::Error::other(message).into());
        }
        Ok(())
    }
}
