//! Control command codec for the RFC2217 com-port option.
//!
//! Requests and responses share the wire shape
//! `[COM_PORT_OPTION, command code, payload...]`, with distinct request and
//! response codes from a fixed table. Integer payloads are four octets in
//! network byte order, single-value payloads one octet. Everything here works
//! in unsigned octets; nothing depends on the signedness of the host's byte
//! representation.

use super::COM_PORT_OPTION;
use crate::error::{SerialError, SerialResult};
use crate::settings::{DataBits, FlowControl, Parity, StopBits};

// Com-port option command codes, client to access server.
const SIGNATURE_REQ: u8 = 0;
const SET_BAUDRATE_REQ: u8 = 1;
const SET_DATASIZE_REQ: u8 = 2;
const SET_PARITY_REQ: u8 = 3;
const SET_STOPSIZE_REQ: u8 = 4;
const SET_CONTROL_REQ: u8 = 5;

// Com-port option command codes, access server to client.
const SIGNATURE_RESP: u8 = 100;
const SET_BAUDRATE_RESP: u8 = 101;
const SET_DATASIZE_RESP: u8 = 102;
const SET_PARITY_RESP: u8 = 103;
const SET_STOPSIZE_RESP: u8 = 104;
const SET_CONTROL_RESP: u8 = 105;

/// A com-port control command.
///
/// A value is constructed immediately before encoding, or by [`decode`] from
/// the raw bytes of an access-server response. Both are immutable and
/// short-lived; an accepted setting is recognized by the response echoing the
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Sets the baud rate; the payload is four octets, network byte order.
    SetBaudRate(u32),
    /// Sets the number of data bits per character.
    SetDataSize(DataBits),
    /// Sets the number of stop bits.
    SetStopSize(StopBits),
    /// Sets the parity mode.
    SetParity(Parity),
    /// Sets the flow control mode.
    SetFlowControl(FlowControl),
    /// Signature text of the access server. An empty request queries the
    /// server; the response carries free-form ASCII text.
    Signature(String),
}

/// Discriminant of a [`ControlCommand`], used to match a response to the
/// pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    BaudRate,
    DataSize,
    StopSize,
    Parity,
    FlowControl,
    Signature,
}

impl ControlCommand {
    /// The discriminant this command correlates under.
    pub fn kind(&self) -> CommandKind {
        match self {
            ControlCommand::SetBaudRate(_) => CommandKind::BaudRate,
            ControlCommand::SetDataSize(_) => CommandKind::DataSize,
            ControlCommand::SetStopSize(_) => CommandKind::StopSize,
            ControlCommand::SetParity(_) => CommandKind::Parity,
            ControlCommand::SetFlowControl(_) => CommandKind::FlowControl,
            ControlCommand::Signature(_) => CommandKind::Signature,
        }
    }
}

/// Encodes a command as a request to the access server.
///
/// Fails with [`SerialError::InvalidArgument`] for payloads that have no
/// request form: a baud rate of 0, or the out-only flow control variants
/// (their wire codes are shared with the in+out variants, which must be
/// requested instead).
pub fn encode(command: &ControlCommand) -> SerialResult<Vec<u8>> {
    let mut out = Vec::with_capacity(8);
    out.push(COM_PORT_OPTION);
    match command {
        ControlCommand::SetBaudRate(baud) => {
            if *baud == 0 {
                return Err(SerialError::invalid_argument(
                    "the baud rate must be greater than 0",
                ));
            }
            out.push(SET_BAUDRATE_REQ);
            out.extend_from_slice(&baud.to_be_bytes());
        }
        ControlCommand::SetDataSize(data_bits) => {
            out.push(SET_DATASIZE_REQ);
            out.push(data_size_octet(*data_bits));
        }
        ControlCommand::SetStopSize(stop_bits) => {
            out.push(SET_STOPSIZE_REQ);
            out.push(stop_size_octet(*stop_bits));
        }
        ControlCommand::SetParity(parity) => {
            out.push(SET_PARITY_REQ);
            out.push(parity_octet(*parity));
        }
        ControlCommand::SetFlowControl(flow_control) => {
            out.push(SET_CONTROL_REQ);
            out.push(flow_control_octet(*flow_control)?);
        }
        ControlCommand::Signature(text) => {
            out.push(SIGNATURE_REQ);
            out.extend_from_slice(text.as_bytes());
        }
    }
    Ok(out)
}

/// Decodes an access-server response.
///
/// The leading octet must be the com-port option code; the command code
/// selects the variant, whose fixed-size payload follows. Unknown codes and
/// out-of-table payload values are protocol errors, never silently ignored.
pub fn decode(payload: &[u8]) -> SerialResult<ControlCommand> {
    let (&option, rest) = payload
        .split_first()
        .ok_or_else(|| SerialError::protocol("empty com port response"))?;
    if option != COM_PORT_OPTION {
        return Err(SerialError::protocol(format!(
            "unexpected telnet option, got: {option}"
        )));
    }
    let (&command, body) = rest
        .split_first()
        .ok_or_else(|| SerialError::protocol("com port response is missing the command code"))?;

    match command {
        SET_BAUDRATE_RESP => {
            let raw: [u8; 4] = body.try_into().map_err(|_| {
                SerialError::protocol(format!(
                    "the baud rate payload must be 4 bytes, got {}",
                    body.len()
                ))
            })?;
            let baud = u32::from_be_bytes(raw);
            if baud == 0 {
                return Err(SerialError::protocol(
                    "the received baud rate is invalid, expected a value greater than 0",
                ));
            }
            Ok(ControlCommand::SetBaudRate(baud))
        }
        SET_DATASIZE_RESP => {
            let value = single_octet(body, "data size")?;
            let data_bits = data_size_from_octet(value).ok_or_else(|| {
                SerialError::protocol(format!("unexpected data size value: {value}"))
            })?;
            Ok(ControlCommand::SetDataSize(data_bits))
        }
        SET_STOPSIZE_RESP => {
            let value = single_octet(body, "stop size")?;
            let stop_bits = stop_size_from_octet(value).ok_or_else(|| {
                SerialError::protocol(format!("unexpected stop size value: {value}"))
            })?;
            Ok(ControlCommand::SetStopSize(stop_bits))
        }
        SET_PARITY_RESP => {
            let value = single_octet(body, "parity")?;
            let parity = parity_from_octet(value)
                .ok_or_else(|| SerialError::protocol(format!("unexpected parity value: {value}")))?;
            Ok(ControlCommand::SetParity(parity))
        }
        SET_CONTROL_RESP => {
            let value = single_octet(body, "flow control")?;
            let flow_control = flow_control_from_octet(value).ok_or_else(|| {
                SerialError::protocol(format!("unexpected flow control value: {value}"))
            })?;
            Ok(ControlCommand::SetFlowControl(flow_control))
        }
        SIGNATURE_RESP => Ok(ControlCommand::Signature(
            String::from_utf8_lossy(body).into_owned(),
        )),
        unknown => Err(SerialError::protocol(format!(
            "unknown command code, got: {unknown}"
        ))),
    }
}

fn single_octet(body: &[u8], what: &str) -> SerialResult<u8> {
    match body {
        [value] => Ok(*value),
        _ => Err(SerialError::protocol(format!(
            "the {what} payload must be 1 byte, got {}",
            body.len()
        ))),
    }
}

fn data_size_octet(data_bits: DataBits) -> u8 {
    match data_bits {
        DataBits::Five => 5,
        DataBits::Six => 6,
        DataBits::Seven => 7,
        DataBits::Eight => 8,
    }
}

fn data_size_from_octet(value: u8) -> Option<DataBits> {
    match value {
        5 => Some(DataBits::Five),
        6 => Some(DataBits::Six),
        7 => Some(DataBits::Seven),
        8 => Some(DataBits::Eight),
        _ => None,
    }
}

fn stop_size_octet(stop_bits: StopBits) -> u8 {
    match stop_bits {
        StopBits::One => 1,
        StopBits::OneAndHalf => 2,
        StopBits::Two => 3,
    }
}

fn stop_size_from_octet(value: u8) -> Option<StopBits> {
    match value {
        1 => Some(StopBits::One),
        2 => Some(StopBits::OneAndHalf),
        3 => Some(StopBits::Two),
        _ => None,
    }
}

fn parity_octet(parity: Parity) -> u8 {
    match parity {
        Parity::None => 1,
        Parity::Odd => 2,
        Parity::Even => 3,
        Parity::Mark => 4,
        Parity::Space => 5,
    }
}

fn parity_from_octet(value: u8) -> Option<Parity> {
    match value {
        1 => Some(Parity::None),
        2 => Some(Parity::Odd),
        3 => Some(Parity::Even),
        4 => Some(Parity::Mark),
        5 => Some(Parity::Space),
        _ => None,
    }
}

/// The out-only variants share their wire code with the in+out variants and
/// cannot be requested; callers must use the in+out variant.
fn flow_control_octet(flow_control: FlowControl) -> SerialResult<u8> {
    match flow_control {
        FlowControl::None => Ok(1),
        FlowControl::XonXoffInOut => Ok(2),
        FlowControl::RtsCtsInOut => Ok(3),
        FlowControl::XonXoffIn => Ok(15),
        FlowControl::RtsCtsIn => Ok(16),
        FlowControl::XonXoffOut => Err(SerialError::invalid_argument(
            "XON/XOFF outbound-only flow control cannot be requested, use the in+out variant",
        )),
        FlowControl::RtsCtsOut => Err(SerialError::invalid_argument(
            "RTS/CTS outbound-only flow control cannot be requested, use the in+out variant",
        )),
    }
}

fn flow_control_from_octet(value: u8) -> Option<FlowControl> {
    match value {
        1 => Some(FlowControl::None),
        2 => Some(FlowControl::XonXoffInOut),
        3 => Some(FlowControl::RtsCtsInOut),
        15 => Some(FlowControl::XonXoffIn),
        16 => Some(FlowControl::RtsCtsIn),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_baud_rate_request_is_big_endian() {
        let encoded = encode(&ControlCommand::SetBaudRate(9600)).unwrap();
        assert_eq!(encoded, [44, 1, 0x00, 0x00, 0x25, 0x80]);
    }

    #[test]
    fn test_baud_rate_round_trip() {
        let encoded = encode(&ControlCommand::SetBaudRate(9600)).unwrap();
        // A confirming access server echoes the payload under the response code.
        let mut response = encoded.clone();
        response[1] = 101;
        let decoded = decode(&response).unwrap();
        assert_eq!(decoded, ControlCommand::SetBaudRate(9600));
    }

    #[test]
    fn test_encode_rejects_zero_baud_rate() {
        let result = encode(&ControlCommand::SetBaudRate(0));
        assert!(matches!(result, Err(SerialError::InvalidArgument(_))));
    }

    #[test]
    fn test_decode_rejects_an_unexpected_option_code() {
        let err = decode(&[0, 101, 0, 0, 0x25, 0x80]).unwrap_err();
        assert!(matches!(err, SerialError::Protocol(_)), "got: {err:?}");
        assert!(err.to_string().contains("got: 0"), "message: {err}");
    }

    #[test]
    fn test_decode_rejects_an_unknown_command_code() {
        let err = decode(&[44, 99, 1]).unwrap_err();
        assert!(err.to_string().contains("unknown command code"), "message: {err}");
        assert!(err.to_string().contains("99"), "message: {err}");
    }

    #[test]
    fn test_decode_rejects_a_truncated_baud_rate_payload() {
        let err = decode(&[44, 101, 0x25, 0x80]).unwrap_err();
        assert!(matches!(err, SerialError::Protocol(_)), "got: {err:?}");
    }

    #[test]
    fn test_decode_rejects_a_zero_baud_rate() {
        let err = decode(&[44, 101, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, SerialError::Protocol(_)), "got: {err:?}");
    }

    #[test]
    fn test_data_size_wire_values() {
        for (data_bits, octet) in [
            (DataBits::Five, 5u8),
            (DataBits::Six, 6),
            (DataBits::Seven, 7),
            (DataBits::Eight, 8),
        ] {
            let encoded = encode(&ControlCommand::SetDataSize(data_bits)).unwrap();
            assert_eq!(encoded, [44, 2, octet]);
            let decoded = decode(&[44, 102, octet]).unwrap();
            assert_eq!(decoded, ControlCommand::SetDataSize(data_bits));
        }
    }

    #[test]
    fn test_stop_size_wire_values() {
        for (stop_bits, octet) in [
            (StopBits::One, 1u8),
            (StopBits::OneAndHalf, 2),
            (StopBits::Two, 3),
        ] {
            let encoded = encode(&ControlCommand::SetStopSize(stop_bits)).unwrap();
            assert_eq!(encoded, [44, 4, octet]);
            let decoded = decode(&[44, 104, octet]).unwrap();
            assert_eq!(decoded, ControlCommand::SetStopSize(stop_bits));
        }
    }

    #[test]
    fn test_parity_wire_values() {
        for (parity, octet) in [
            (Parity::None, 1u8),
            (Parity::Odd, 2),
            (Parity::Even, 3),
            (Parity::Mark, 4),
            (Parity::Space, 5),
        ] {
            let encoded = encode(&ControlCommand::SetParity(parity)).unwrap();
            assert_eq!(encoded, [44, 3, octet]);
            let decoded = decode(&[44, 103, octet]).unwrap();
            assert_eq!(decoded, ControlCommand::SetParity(parity));
        }
    }

    #[test]
    fn test_flow_control_wire_values() {
        for (flow_control, octet) in [
            (FlowControl::None, 1u8),
            (FlowControl::XonXoffInOut, 2),
            (FlowControl::RtsCtsInOut, 3),
            (FlowControl::XonXoffIn, 15),
            (FlowControl::RtsCtsIn, 16),
        ] {
            let encoded = encode(&ControlCommand::SetFlowControl(flow_control)).unwrap();
            assert_eq!(encoded, [44, 5, octet]);
            let decoded = decode(&[44, 105, octet]).unwrap();
            assert_eq!(decoded, ControlCommand::SetFlowControl(flow_control));
        }
    }

    #[test]
    fn test_out_only_flow_control_cannot_be_requested() {
        for flow_control in [FlowControl::XonXoffOut, FlowControl::RtsCtsOut] {
            let result = encode(&ControlCommand::SetFlowControl(flow_control));
            assert!(
                matches!(result, Err(SerialError::InvalidArgument(_))),
                "{flow_control:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_decode_rejects_out_of_table_single_octet_values() {
        for response in [[44u8, 102, 9], [44, 103, 0], [44, 104, 4], [44, 105, 7]] {
            let err = decode(&response).unwrap_err();
            assert!(matches!(err, SerialError::Protocol(_)), "got: {err:?}");
        }
    }

    #[test]
    fn test_signature_query_and_response() {
        let encoded = encode(&ControlCommand::Signature(String::new())).unwrap();
        assert_eq!(encoded, [44, 0]);

        let decoded = decode(b"\x2c\x64serial-hub 2.1").unwrap();
        assert_eq!(
            decoded,
            ControlCommand::Signature("serial-hub 2.1".to_string())
        );
    }

    #[test]
    fn test_command_kind_matches_variant() {
        assert_eq!(ControlCommand::SetBaudRate(1).kind(), CommandKind::BaudRate);
        assert_eq!(
            ControlCommand::SetParity(Parity::Odd).kind(),
            CommandKind::Parity
        );
        assert_ne!(
            ControlCommand::SetBaudRate(1).kind(),
            ControlCommand::SetDataSize(DataBits::Eight).kind()
        );
    }
}
