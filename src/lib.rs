//! Serial port access over local devices and RFC2217 telnet access servers.
//!
//! Every port, native or remote, is used through the same synchronized
//! [`SerialConnection`]: `write` and `read` may proceed concurrently but
//! never overlap themselves, `close` is idempotent, and a failed backend
//! operation closes the connection eagerly.
//!
//! # Modules
//!
//! - `settings`: immutable port settings with a validating builder
//! - `connection`: the generic synchronized connection wrapper
//! - `rfc2217`: the client side of the serial-over-telnet protocol
//! - `native`: local devices via the `serialport` crate
//! - `stream`: adapters that turn raw byte streams into backends
//! - `octets`: conversions between stream bytes and telnet octet values
//! - `mock`: scriptable doubles for tests
//! - `error`: unified error handling
//!
//! # Opening a remote port
//!
//! ```no_run
//! use serial_link::rfc2217::Rfc2217SerialPort;
//! use serial_link::settings::SerialPortSettings;
//!
//! let port = Rfc2217SerialPort::new("192.168.0.15", 23);
//! let settings = SerialPortSettings::builder().baud_rate(9600).build()?;
//! let connection = port.open(&settings)?;
//! connection.write(b"AT\r\n")?;
//! let answer = connection.read()?;
//! connection.close()?;
//! # Ok::<(), serial_link::SerialError>(())
//! ```

pub mod connection;
pub mod error;
pub mod mock;
pub mod native;
pub mod octets;
pub mod rfc2217;
pub mod settings;
pub mod stream;

// Re-export commonly used types for convenience
pub use connection::{CloseHandle, ReadHalf, SerialConnection, WriteHalf};
pub use error::{SerialError, SerialResult};
pub use rfc2217::Rfc2217SerialPort;
pub use settings::{
    DataBits, FlowControl, Parity, SerialPortSettings, SerialPortSettingsBuilder, StopBits,
};
pub use stream::{StreamReader, StreamWriter};
