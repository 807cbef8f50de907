//! Client side of the RFC2217 "serial over telnet" protocol.
//!
//! An access server exposes a physical com port over a telnet session. After
//! the binary-transmission and com-port options are negotiated, the serial
//! settings travel as sub-negotiation control commands and the session's
//! byte streams carry the port data itself.
//!
//! [`Rfc2217SerialPort`] composes the pieces: the
//! [`negotiation`] state machine gates `open()` until both options are
//! accepted, the [`codec`] translates control commands to and from wire
//! bytes, and the [`correlator`] matches the access server's asynchronous
//! confirmations with the synchronous open flow.

pub mod codec;
pub mod correlator;
pub mod negotiation;
pub mod telnet;
pub mod transport;

use crate::connection::{CloseHandle, SerialConnection};
use crate::error::{SerialError, SerialResult};
use crate::octets;
use crate::settings::SerialPortSettings;
use crate::stream::{StreamReader, StreamWriter};
use self::codec::ControlCommand;
use self::correlator::CommandSender;
use self::negotiation::NegotiationHandler;
use self::telnet::TcpTelnetTransport;
use self::transport::{NegotiationEvent, TelnetListener, TelnetTransport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Telnet binary-transmission option code (RFC 856).
pub const BINARY_OPTION: u8 = 0;
/// Telnet com-port-control option code (RFC 2217).
pub const COM_PORT_OPTION: u8 = 44;

/// Deadline granted to the option negotiation phase of `open()`.
const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for a single control command round-trip.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// A remote serial port exposed by an RFC2217 access server.
///
/// # Example
/// ```no_run
/// use serial_link::rfc2217::Rfc2217SerialPort;
/// use serial_link::settings::SerialPortSettings;
///
/// let port = Rfc2217SerialPort::new("192.168.0.15", 23);
/// let settings = SerialPortSettings::builder().baud_rate(9600).build()?;
/// let connection = port.open(&settings)?;
/// connection.write(b"AT\r\n")?;
/// let answer = connection.read()?;
/// connection.close()?;
/// # Ok::<(), serial_link::SerialError>(())
/// ```
pub struct Rfc2217SerialPort {
    host: String,
    port: u16,
    transport: Arc<dyn TelnetTransport>,
    negotiation_timeout: Duration,
    command_timeout: Duration,
    signature: Arc<Mutex<Option<String>>>,
}

impl Rfc2217SerialPort {
    /// Creates a port that will connect to the access server at
    /// `host:port`. The port is initially not open.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let transport = Arc::new(TcpTelnetTransport::new(host.clone(), port));
        Self::with_transport(host, port, transport)
    }

    /// Creates a port over a caller-supplied transport. Used by tests and by
    /// deployments with their own session layer.
    pub fn with_transport(
        host: impl Into<String>,
        port: u16,
        transport: Arc<dyn TelnetTransport>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            signature: Arc::new(Mutex::new(None)),
        }
    }

    /// The name of this port, `"RFC2217@" + host + ":" + port`, e.g.
    /// `RFC2217@192.168.0.15:23`.
    pub fn port_name(&self) -> String {
        format!("RFC2217@{}:{}", self.host, self.port)
    }

    /// Sets the deadline `open()` grants the negotiation of all telnet
    /// options. Must be greater than zero.
    pub fn set_negotiation_timeout(&mut self, timeout: Duration) -> SerialResult<()> {
        if timeout.is_zero() {
            return Err(SerialError::invalid_argument(
                "the negotiation timeout must be greater than zero",
            ));
        }
        self.negotiation_timeout = timeout;
        Ok(())
    }

    /// Sets the deadline for each control command round-trip during
    /// `open()`. Must be greater than zero.
    pub fn set_command_timeout(&mut self, timeout: Duration) -> SerialResult<()> {
        if timeout.is_zero() {
            return Err(SerialError::invalid_argument(
                "the command timeout must be greater than zero",
            ));
        }
        self.command_timeout = timeout;
        Ok(())
    }

    /// Signature text most recently volunteered by the access server.
    ///
    /// The text is free-form; it may name the manufacturer or a version, and
    /// there is no defined structure to rely on. `None` until the server
    /// sent one, typically only after the port was opened.
    pub fn signature(&self) -> Option<String> {
        self.signature.lock().clone()
    }

    /// Opens this port: establishes the telnet session with the access
    /// server, awaits the option negotiation, transfers the settings, and
    /// returns the connection.
    ///
    /// Every failure disconnects the transport before the error is
    /// returned; a half-negotiated connection never escapes. Concurrent
    /// `open()` calls on one instance are not supported.
    pub fn open(&self, settings: &SerialPortSettings) -> SerialResult<SerialConnection> {
        let negotiation = Arc::new(NegotiationHandler::new());
        let sender = Arc::new(CommandSender::new(self.transport.clone()));
        let listener = Arc::new(PortListener {
            negotiation: negotiation.clone(),
            sender: sender.clone(),
            signature: self.signature.clone(),
        });
        self.transport.register_listener(listener);
        self.transport.connect()?;

        match self.configure(&negotiation, &sender, settings) {
            Ok(connection) => {
                debug!(port = %self.port_name(), "port opened");
                Ok(connection)
            }
            Err(e) => {
                if let Err(disconnect_error) = self.transport.disconnect() {
                    warn!(error = %disconnect_error, "disconnect after a failed open also failed");
                }
                Err(e)
            }
        }
    }

    fn configure(
        &self,
        negotiation: &NegotiationHandler,
        sender: &CommandSender,
        settings: &SerialPortSettings,
    ) -> SerialResult<SerialConnection> {
        negotiation.await_negotiated(self.negotiation_timeout)?;
        debug!(port = %self.port_name(), "options negotiated, transferring settings");
        self.transfer_settings(sender, settings)?;

        let (input, output) = self.transport.byte_streams()?;
        Ok(SerialConnection::new(
            self.port_name(),
            Box::new(StreamReader::new(input)),
            Box::new(StreamWriter::new(output)),
            Box::new(TransportCloseHandle {
                transport: self.transport.clone(),
            }),
        ))
    }

    /// Sends one control command per setting, awaiting each confirmation.
    fn transfer_settings(
        &self,
        sender: &CommandSender,
        settings: &SerialPortSettings,
    ) -> SerialResult<()> {
        self.send_setting(sender, ControlCommand::SetBaudRate(settings.baud_rate()), "baud rate")?;
        self.send_setting(sender, ControlCommand::SetDataSize(settings.data_bits()), "data size")?;
        self.send_setting(sender, ControlCommand::SetStopSize(settings.stop_bits()), "stop size")?;
        self.send_setting(sender, ControlCommand::SetParity(settings.parity()), "parity")?;
        self.send_setting(
            sender,
            ControlCommand::SetFlowControl(settings.flow_control()),
            "flow control",
        )?;
        Ok(())
    }

    /// A compliant access server confirms a setting by echoing it; any other
    /// answer means the setting was refused.
    fn send_setting(
        &self,
        sender: &CommandSender,
        request: ControlCommand,
        setting: &str,
    ) -> SerialResult<()> {
        let response = sender.send_and_await(&request, self.command_timeout)?;
        if response != request {
            return Err(SerialError::protocol(format!(
                "the {setting} setting was refused, requested {request:?} but the access server answered {response:?}"
            )));
        }
        debug!(?request, "setting accepted by the access server");
        Ok(())
    }
}

/// Fans transport notifications out to the negotiation handler and the
/// command correlator. Runs on the transport's notification thread.
struct PortListener {
    negotiation: Arc<NegotiationHandler>,
    sender: Arc<CommandSender>,
    signature: Arc<Mutex<Option<String>>>,
}

impl TelnetListener for PortListener {
    fn on_negotiation(&self, option: u8, event: NegotiationEvent) {
        self.negotiation.on_negotiation(option, event);
    }

    fn on_subnegotiation(&self, payload: &[u32]) {
        let bytes = octets::to_byte_array(payload, payload.len());
        match codec::decode(&bytes) {
            Ok(response) => {
                if let ControlCommand::Signature(text) = &response {
                    *self.signature.lock() = Some(text.clone());
                }
                self.sender.on_response_received(response);
            }
            // An undecodable response must not kill the session thread.
            Err(e) => warn!(error = %e, "dropping undecodable com port response"),
        }
    }
}

/// Releases the telnet session when the connection closes.
struct TransportCloseHandle {
    transport: Arc<dyn TelnetTransport>,
}

impl CloseHandle for TransportCloseHandle {
    fn close_internal(&mut self) -> SerialResult<()> {
        self.transport.disconnect()
    }
}
