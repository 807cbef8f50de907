//! Option negotiation state machine.
//!
//! `open()` must not proceed until the access server accepts both the binary
//! transmission option and the com-port option. Outcomes arrive on the
//! transport's notification thread; the single opening thread parks on a
//! condvar until each option resolves or the deadline elapses. Accepted,
//! refused and timed-out are terminal, a resolved option never changes
//! disposition again.

use super::transport::NegotiationEvent;
use super::{BINARY_OPTION, COM_PORT_OPTION};
use crate::error::{SerialError, SerialResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Progress of the handshake as observed by the opening thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    NotStarted,
    AwaitingBinary,
    AwaitingComPort,
    /// Both options were accepted; data may flow.
    Negotiated,
    /// The access server refused the contained option.
    Refused(u8),
    /// The contained option stayed unresolved past the deadline.
    TimedOut(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionOutcome {
    Pending,
    Accepted,
    Refused,
}

struct Inner {
    outcomes: HashMap<u8, OptionOutcome>,
    state: NegotiationState,
}

/// Tracks per-option outcomes and drives the handshake state machine.
pub struct NegotiationHandler {
    inner: Mutex<Inner>,
    resolved: Condvar,
}

impl NegotiationHandler {
    /// Creates a handler tracking the two options an RFC2217 session needs.
    pub fn new() -> Self {
        let mut outcomes = HashMap::new();
        outcomes.insert(BINARY_OPTION, OptionOutcome::Pending);
        outcomes.insert(COM_PORT_OPTION, OptionOutcome::Pending);
        Self {
            inner: Mutex::new(Inner {
                outcomes,
                state: NegotiationState::NotStarted,
            }),
            resolved: Condvar::new(),
        }
    }

    /// Current machine state.
    pub fn state(&self) -> NegotiationState {
        self.inner.lock().state
    }

    /// Transport callback with the access server's disposition for `option`.
    ///
    /// The first disposition of an option wins; anything later is ignored.
    pub fn on_negotiation(&self, option: u8, event: NegotiationEvent) {
        let outcome = match event {
            NegotiationEvent::Accepted => OptionOutcome::Accepted,
            NegotiationEvent::Refused => OptionOutcome::Refused,
        };
        let mut inner = self.inner.lock();
        let entry = inner
            .outcomes
            .entry(option)
            .or_insert(OptionOutcome::Pending);
        if *entry == OptionOutcome::Pending {
            *entry = outcome;
            debug!(option, ?event, "option negotiation resolved");
        }
        self.resolved.notify_all();
    }

    /// Blocks the opening thread until both options are accepted.
    ///
    /// The deadline spans the whole phase. A refusal fails with a protocol
    /// error naming the option, an expired deadline with a timeout error
    /// naming the option; either failure is terminal for this handler.
    pub fn await_negotiated(&self, timeout: Duration) -> SerialResult<()> {
        let deadline = Instant::now() + timeout;

        self.set_state(NegotiationState::AwaitingBinary);
        self.await_accepted(BINARY_OPTION, deadline)?;

        self.set_state(NegotiationState::AwaitingComPort);
        self.await_accepted(COM_PORT_OPTION, deadline)?;

        self.set_state(NegotiationState::Negotiated);
        debug!("binary and com-port options negotiated");
        Ok(())
    }

    fn set_state(&self, state: NegotiationState) {
        self.inner.lock().state = state;
    }

    fn await_accepted(&self, option: u8, deadline: Instant) -> SerialResult<()> {
        let mut inner = self.inner.lock();
        loop {
            match inner.outcomes.get(&option).copied().unwrap_or(OptionOutcome::Pending) {
                OptionOutcome::Accepted => return Ok(()),
                OptionOutcome::Refused => {
                    inner.state = NegotiationState::Refused(option);
                    return Err(SerialError::protocol(format!(
                        "the access server refused to accept option: {option}"
                    )));
                }
                OptionOutcome::Pending => {
                    if Instant::now() >= deadline {
                        inner.state = NegotiationState::TimedOut(option);
                        return Err(SerialError::timeout(format!(
                            "option {option} was not negotiated within the deadline"
                        )));
                    }
                    let _ = self.resolved.wait_until(&mut inner, deadline);
                }
            }
        }
    }
}

impl Default for NegotiationHandler {
    fn default() -> Self {
        Self::new()
    }
}
