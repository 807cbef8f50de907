//! Contract consumed from the telnet transport.
//!
//! The transport owns the telnet session mechanics: IAC framing, option
//! advertisement and socket lifecycle. The RFC2217 layer relies only on the
//! surface below — a synchronous connect/send pair, a listener for
//! negotiation outcomes and decoded sub-negotiation payloads, and the raw
//! byte streams of the session. Payloads cross this boundary as octet
//! values (0-255) so the IAC value stays unambiguous.

use crate::error::SerialResult;
use std::io::{Read, Write};
use std::sync::Arc;

/// Disposition of a single option negotiation, as reported by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationEvent {
    Accepted,
    Refused,
}

/// Receives transport notifications.
///
/// Callbacks run on the transport's reader thread, never on the thread that
/// called `open()`; implementations hand the data over and return quickly.
pub trait TelnetListener: Send + Sync {
    /// A tracked option was accepted or refused by the peer.
    fn on_negotiation(&self, option: u8, event: NegotiationEvent);

    /// A complete sub-negotiation payload arrived.
    fn on_subnegotiation(&self, payload: &[u32]);
}

/// A telnet session carrying an RFC2217 control channel.
pub trait TelnetTransport: Send + Sync {
    /// Establishes the session and starts option negotiation.
    fn connect(&self) -> SerialResult<()>;

    /// Tears the session down. Idempotent; the socket is released exactly
    /// once, a failing teardown may be retried.
    fn disconnect(&self) -> SerialResult<()>;

    /// Registers the listener notified of negotiations and payloads.
    /// Must be called before [`connect`](TelnetTransport::connect).
    fn register_listener(&self, listener: Arc<dyn TelnetListener>);

    /// Sends one sub-negotiation frame on the control channel.
    fn send_subnegotiation(&self, payload: &[u32]) -> SerialResult<()>;

    /// The session's raw byte streams. Available once the session is
    /// connected and negotiation succeeded.
    fn byte_streams(&self) -> SerialResult<(Box<dyn Read + Send>, Box<dyn Write + Send>)>;
}
