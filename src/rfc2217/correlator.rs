//! Blocking request/response correlator.
//!
//! Connection setup sends control commands synchronously, but the access
//! server's responses arrive on the transport's notification thread. A
//! single-slot rendezvous bridges the two: the sending thread parks until
//! the response whose kind matches its request arrives or the deadline
//! elapses. Unsolicited, duplicate and late responses are discarded, never
//! buffered.

use super::codec::{self, CommandKind, ControlCommand};
use super::transport::TelnetTransport;
use crate::error::{SerialError, SerialResult};
use crate::octets;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Default)]
struct Slot {
    /// Kind of the outstanding request, if any.
    pending: Option<CommandKind>,
    /// The matching response, once it arrived.
    answer: Option<ControlCommand>,
}

/// Sends control commands and awaits their correlated responses.
///
/// At most one request may be pending per sender; issuing a second request
/// while one is outstanding is rejected eagerly as a programming error.
pub struct CommandSender {
    transport: Arc<dyn TelnetTransport>,
    slot: Mutex<Slot>,
    arrived: Condvar,
}

impl CommandSender {
    /// Creates a sender that transmits over the given transport's
    /// sub-negotiation channel.
    pub fn new(transport: Arc<dyn TelnetTransport>) -> Self {
        Self {
            transport,
            slot: Mutex::new(Slot::default()),
            arrived: Condvar::new(),
        }
    }

    /// Encodes and transmits `request`, then blocks until the response of
    /// the same kind arrives or `timeout` elapses.
    ///
    /// On timeout the pending request is forgotten before the error is
    /// returned; a response arriving afterwards is discarded.
    pub fn send_and_await(
        &self,
        request: &ControlCommand,
        timeout: Duration,
    ) -> SerialResult<ControlCommand> {
        let encoded = codec::encode(request)?;

        {
            let mut slot = self.slot.lock();
            if slot.pending.is_some() {
                return Err(SerialError::invalid_argument(format!(
                    "a control command is already awaiting its response, cannot send {request:?}"
                )));
            }
            slot.pending = Some(request.kind());
            slot.answer = None;
        }

        // The transmit happens outside the slot lock, the response may
        // arrive on the notification thread before we start waiting.
        if let Err(e) = self.transport.send_subnegotiation(&octets::to_int_array(&encoded)) {
            self.slot.lock().pending = None;
            return Err(e);
        }

        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if let Some(answer) = slot.answer.take() {
                slot.pending = None;
                trace!(?answer, "control command resolved");
                return Ok(answer);
            }
            if Instant::now() >= deadline {
                slot.pending = None;
                return Err(SerialError::timeout(format!(
                    "no response received for command: {request:?}"
                )));
            }
            let _ = self.arrived.wait_until(&mut slot, deadline);
        }
    }

    /// Transport callback: resolves the pending request if the kinds match,
    /// otherwise drops the response.
    pub fn on_response_received(&self, response: ControlCommand) {
        let mut slot = self.slot.lock();
        match slot.pending {
            Some(kind) if kind == response.kind() => {
                slot.answer = Some(response);
                self.arrived.notify_all();
            }
            _ => trace!(?response, "discarding unsolicited control response"),
        }
    }
}
