//! Native backend over the `serialport` crate.
//!
//! Maps the crate's settings onto a local device and exposes it through the
//! generic connection wrapper. The `serialport` read timeout is treated as a
//! polling tick: the reader keeps waiting across ticks until at least one
//! byte arrives, which matches the blocking contract of
//! [`SerialConnection::read`](crate::connection::SerialConnection::read).

use crate::connection::{CloseHandle, ReadHalf, SerialConnection, WriteHalf};
use crate::error::{SerialError, SerialResult};
use crate::settings::{DataBits, FlowControl, Parity, SerialPortSettings, StopBits};
use crate::stream::READ_BUFFER_SIZE;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Poll interval of the blocking read loop.
const READ_TICK: Duration = Duration::from_millis(100);

/// Opens the local device `port_name` with the given settings.
///
/// # Example
/// ```no_run
/// use serial_link::native;
/// use serial_link::settings::SerialPortSettings;
///
/// let settings = SerialPortSettings::builder().baud_rate(115_200).build()?;
/// let connection = native::open("/dev/ttyUSB0", &settings)?;
/// connection.write(b"AT\r\n")?;
/// # Ok::<(), serial_link::SerialError>(())
/// ```
pub fn open(port_name: &str, settings: &SerialPortSettings) -> SerialResult<SerialConnection> {
    let mut port = serialport::new(port_name, settings.baud_rate())
        .data_bits(native_data_bits(settings.data_bits()))
        .stop_bits(native_stop_bits(settings.stop_bits())?)
        .parity(native_parity(settings.parity())?)
        .flow_control(native_flow_control(settings.flow_control()))
        .timeout(READ_TICK)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::InvalidInput => SerialError::invalid_argument(e.to_string()),
            _ => SerialError::Io(e.into()),
        })?;

    port.write_request_to_send(settings.rts())
        .map_err(|e| SerialError::Io(e.into()))?;
    port.write_data_terminal_ready(settings.dtr())
        .map_err(|e| SerialError::Io(e.into()))?;

    let writer = port.try_clone().map_err(|e| SerialError::Io(e.into()))?;
    debug!(port = port_name, baud = settings.baud_rate(), "native port opened");

    Ok(SerialConnection::new(
        port_name,
        Box::new(NativeReader { port }),
        Box::new(NativeWriter { port: writer }),
        Box::new(NativeCloseHandle),
    ))
}

fn native_data_bits(data_bits: DataBits) -> serialport::DataBits {
    match data_bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn native_stop_bits(stop_bits: StopBits) -> SerialResult<serialport::StopBits> {
    match stop_bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OneAndHalf => Err(SerialError::invalid_argument(
            "1.5 stop bits are not supported by the native backend",
        )),
    }
}

fn native_parity(parity: Parity) -> SerialResult<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(SerialError::invalid_argument(
            "mark and space parity are not supported by the native backend",
        )),
    }
}

/// The native layer knows no per-direction flow control; the in/out
/// variants collapse onto the matching mode.
fn native_flow_control(flow_control: FlowControl) -> serialport::FlowControl {
    match flow_control {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::RtsCtsIn | FlowControl::RtsCtsOut | FlowControl::RtsCtsInOut => {
            serialport::FlowControl::Hardware
        }
        FlowControl::XonXoffIn | FlowControl::XonXoffOut | FlowControl::XonXoffInOut => {
            serialport::FlowControl::Software
        }
    }
}

struct NativeReader {
    port: Box<dyn serialport::SerialPort>,
}

impl ReadHalf for NativeReader {
    fn read_internal(&mut self) -> SerialResult<Vec<u8>> {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match self.port.read(&mut buffer) {
                Ok(0) => return Err(SerialError::EndOfStream),
                Ok(read) => {
                    buffer.truncate(read);
                    return Ok(buffer);
                }
                // A tick without data is not a failure, keep waiting.
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

struct NativeWriter {
    port: Box<dyn serialport::SerialPort>,
}

impl WriteHalf for NativeWriter {
    fn write_internal(&mut self, data: &[u8]) -> SerialResult<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }
}

/// The device descriptors live in the reader and writer halves and are
/// released when the connection is dropped; closing only fences further I/O.
struct NativeCloseHandle;

impl CloseHandle for NativeCloseHandle {
    fn close_internal(&mut self) -> SerialResult<()> {
        Ok(())
    }
}
