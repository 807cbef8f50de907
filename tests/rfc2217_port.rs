//! End-to-end tests of the RFC2217 open flow against the mock access server.
//!
//! Covers the contract of `open()`: negotiation gating, per-setting command
//! round-trips, the port naming scheme, and the guarantee that every failure
//! leaves the transport disconnected.

use serial_link::mock::MockTransport;
use serial_link::rfc2217::{Rfc2217SerialPort, COM_PORT_OPTION};
use serial_link::settings::{DataBits, FlowControl, Parity, SerialPortSettings, StopBits};
use serial_link::SerialError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn mock_port() -> (Rfc2217SerialPort, Arc<MockTransport>) {
    init_tracing();
    let transport = Arc::new(MockTransport::new());
    let port = Rfc2217SerialPort::with_transport("mock", 23, transport.clone());
    (port, transport)
}

#[test]
fn test_port_name_follows_the_rfc2217_scheme() {
    let port = Rfc2217SerialPort::new("192.168.0.15", 23);
    assert_eq!(port.port_name(), "RFC2217@192.168.0.15:23");
}

#[test]
fn test_open_transfers_every_setting_in_order() {
    let (port, transport) = mock_port();
    let settings = SerialPortSettings::builder()
        .baud_rate(19_200)
        .data_bits(DataBits::Seven)
        .stop_bits(StopBits::Two)
        .parity(Parity::Even)
        .flow_control(FlowControl::RtsCtsInOut)
        .build()
        .unwrap();

    let connection = port.open(&settings).unwrap();

    assert_eq!(
        transport.sent_subnegotiations(),
        vec![
            vec![44u8, 1, 0x00, 0x00, 0x4B, 0x00], // baud rate 19200
            vec![44, 2, 7],                        // data size
            vec![44, 4, 3],                        // stop size
            vec![44, 3, 3],                        // parity
            vec![44, 5, 3],                        // flow control
        ]
    );
    assert!(!connection.is_closed());
    connection.close().unwrap();
}

#[test]
fn test_open_then_close_fences_further_io() {
    let (port, transport) = mock_port();

    let connection = port.open(&SerialPortSettings::default()).unwrap();
    connection.close().unwrap();

    assert!(connection.is_closed());
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 1);

    let err = connection.write(b"x").unwrap_err();
    assert_eq!(err.to_string(), "Port RFC2217@mock:23 is closed!");
    let err = connection.read().unwrap_err();
    assert_eq!(err.to_string(), "Port RFC2217@mock:23 is closed!");

    // A second close must not reach the transport again.
    connection.close().unwrap();
    assert_eq!(transport.disconnect_count(), 1);
}

#[test]
fn test_refused_com_port_option_fails_open_and_disconnects() {
    let (port, transport) = mock_port();
    transport.refuse_option(COM_PORT_OPTION);

    let err = port.open(&SerialPortSettings::default()).unwrap_err();

    assert!(matches!(err, SerialError::Protocol(_)), "got: {err:?}");
    assert!(
        err.to_string().contains("refused to accept option: 44"),
        "message: {err}"
    );
    assert_eq!(transport.disconnect_count(), 1);
    assert!(!transport.is_connected());
}

#[test]
fn test_negotiation_timeout_is_bounded_and_disconnects_once() {
    let (mut port, transport) = mock_port();
    transport.ignore_all_options();
    port.set_negotiation_timeout(Duration::from_millis(10)).unwrap();

    let started = Instant::now();
    let err = port.open(&SerialPortSettings::default()).unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, SerialError::Timeout(_)), "got: {err:?}");
    assert_eq!(transport.disconnect_count(), 1);
}

#[test]
fn test_a_single_silent_option_times_out_naming_it() {
    let (mut port, transport) = mock_port();
    transport.ignore_option(COM_PORT_OPTION);
    port.set_negotiation_timeout(Duration::from_millis(10)).unwrap();

    let err = port.open(&SerialPortSettings::default()).unwrap_err();

    assert!(matches!(err, SerialError::Timeout(_)), "got: {err:?}");
    assert!(err.to_string().contains("option 44"), "message: {err}");
    assert_eq!(transport.disconnect_count(), 1);
}

#[test]
fn test_unanswered_setting_command_times_out_naming_the_command() {
    let (mut port, transport) = mock_port();
    transport.stop_echoing();
    port.set_command_timeout(Duration::from_millis(20)).unwrap();

    let err = port.open(&SerialPortSettings::default()).unwrap_err();

    assert!(matches!(err, SerialError::Timeout(_)), "got: {err:?}");
    assert!(err.to_string().contains("SetBaudRate"), "message: {err}");
    assert_eq!(transport.disconnect_count(), 1);
}

#[test]
fn test_mismatching_confirmation_is_a_refused_setting() {
    let (port, transport) = mock_port();
    // The access server "confirms" a different baud rate than requested.
    transport.respond_next_with(&[44, 101, 0x00, 0x00, 0x12, 0xC0]);

    let err = port.open(&SerialPortSettings::default()).unwrap_err();

    assert!(matches!(err, SerialError::Protocol(_)), "got: {err:?}");
    assert!(err.to_string().contains("baud rate"), "message: {err}");
    assert_eq!(transport.disconnect_count(), 1);
}

#[test]
fn test_zero_timeouts_are_rejected_at_configuration_time() {
    let (mut port, _transport) = mock_port();

    let err = port.set_negotiation_timeout(Duration::ZERO).unwrap_err();
    assert!(matches!(err, SerialError::InvalidArgument(_)), "got: {err:?}");

    let err = port.set_command_timeout(Duration::ZERO).unwrap_err();
    assert!(matches!(err, SerialError::InvalidArgument(_)), "got: {err:?}");
}

#[test]
fn test_data_flows_through_the_session_streams() {
    let (port, transport) = mock_port();
    transport.enqueue_session_data(b"pong");

    let connection = port.open(&SerialPortSettings::default()).unwrap();

    connection.write(b"ping").unwrap();
    assert_eq!(transport.written(), b"ping");

    assert_eq!(connection.read().unwrap(), b"pong");
}

#[test]
fn test_session_end_of_stream_closes_the_connection() {
    let (port, transport) = mock_port();

    let connection = port.open(&SerialPortSettings::default()).unwrap();

    // No session data scripted: the next read hits the end of the stream.
    let err = connection.read().unwrap_err();
    assert!(matches!(err, SerialError::EndOfStream), "got: {err:?}");
    assert!(connection.is_closed());
    assert_eq!(transport.disconnect_count(), 1);
}

#[test]
fn test_signature_is_cached_when_the_server_volunteers_one() {
    let (port, transport) = mock_port();

    assert_eq!(port.signature(), None);
    let _connection = port.open(&SerialPortSettings::default()).unwrap();

    let mut payload = vec![44u8, 100];
    payload.extend_from_slice(b"acme access server 4.2");
    transport.deliver_subnegotiation(&payload);

    assert_eq!(port.signature().as_deref(), Some("acme access server 4.2"));
}

#[test]
fn test_undecodable_responses_are_dropped_without_killing_the_session() {
    let (port, transport) = mock_port();

    let connection = port.open(&SerialPortSettings::default()).unwrap();

    // Unknown command code and wrong option code: both must be ignored.
    transport.deliver_subnegotiation(&[44, 99, 1]);
    transport.deliver_subnegotiation(&[0, 101, 0, 0, 0x25, 0x80]);

    transport.enqueue_session_data(b"still alive");
    assert_eq!(connection.read().unwrap(), b"still alive");
}

#[test]
fn test_out_only_flow_control_fails_open_before_any_command() {
    let (port, transport) = mock_port();
    let settings = SerialPortSettings::builder()
        .flow_control(FlowControl::RtsCtsOut)
        .build()
        .unwrap();

    let err = port.open(&settings).unwrap_err();

    assert!(matches!(err, SerialError::InvalidArgument(_)), "got: {err:?}");
    // The four commands before flow control made it out, the fifth did not.
    assert_eq!(transport.sent_subnegotiations().len(), 4);
    assert_eq!(transport.disconnect_count(), 1);
}
