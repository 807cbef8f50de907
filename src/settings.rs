//! Immutable serial port settings.
//!
//! A [`SerialPortSettings`] value is created through its builder, validated
//! once, and never mutated afterwards. The same value configures both the
//! native backend and the remote RFC2217 backend.

use crate::error::{SerialError, SerialResult};
use serde::{Deserialize, Serialize};

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Flow control mode.
///
/// The in/out variants restrict the direction the control applies to; the
/// plain variants apply it in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    RtsCtsIn,
    RtsCtsOut,
    RtsCtsInOut,
    XonXoffIn,
    XonXoffOut,
    XonXoffInOut,
}

/// Immutable serial port settings, created via [`SerialPortSettings::builder`].
///
/// # Example
/// ```
/// use serial_link::settings::{DataBits, Parity, SerialPortSettings};
///
/// let settings = SerialPortSettings::builder()
///     .baud_rate(19200)
///     .data_bits(DataBits::Seven)
///     .parity(Parity::Even)
///     .build()?;
/// assert_eq!(settings.baud_rate(), 19200);
/// # Ok::<(), serial_link::SerialError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortSettings {
    baud_rate: u32,
    data_bits: DataBits,
    stop_bits: StopBits,
    parity: Parity,
    flow_control: FlowControl,
    rts: bool,
    dtr: bool,
}

impl SerialPortSettings {
    /// Starts a builder with the conventional defaults: 9600 baud, 8 data
    /// bits, 1 stop bit, no parity, no flow control, RTS and DTR asserted.
    pub fn builder() -> SerialPortSettingsBuilder {
        SerialPortSettingsBuilder::default()
    }

    /// Baud rate in bits per second, always greater than 0.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Number of data bits per character.
    pub fn data_bits(&self) -> DataBits {
        self.data_bits
    }

    /// Number of stop bits.
    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    /// Parity checking mode.
    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Flow control mode.
    pub fn flow_control(&self) -> FlowControl {
        self.flow_control
    }

    /// Whether the RTS line is asserted on open.
    pub fn rts(&self) -> bool {
        self.rts
    }

    /// Whether the DTR line is asserted on open.
    pub fn dtr(&self) -> bool {
        self.dtr
    }
}

impl Default for SerialPortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            rts: true,
            dtr: true,
        }
    }
}

/// Builder for [`SerialPortSettings`].
#[derive(Debug, Clone)]
pub struct SerialPortSettingsBuilder {
    settings: SerialPortSettings,
}

impl Default for SerialPortSettingsBuilder {
    fn default() -> Self {
        Self {
            settings: SerialPortSettings::default(),
        }
    }
}

impl SerialPortSettingsBuilder {
    /// Set the baud rate in bits per second.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of data bits per character.
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the number of stop bits.
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the parity checking mode.
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the flow control mode.
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set whether RTS is asserted on open.
    pub fn rts(mut self, rts: bool) -> Self {
        self.settings.rts = rts;
        self
    }

    /// Set whether DTR is asserted on open.
    pub fn dtr(mut self, dtr: bool) -> Self {
        self.settings.dtr = dtr;
        self
    }

    /// Validates the combination and produces the immutable settings value.
    ///
    /// Rejected combinations:
    /// - a baud rate of 0;
    /// - 5 data bits with 2 stop bits;
    /// - 6, 7 or 8 data bits with 1.5 stop bits.
    pub fn build(self) -> SerialResult<SerialPortSettings> {
        let s = self.settings;
        if s.baud_rate == 0 {
            return Err(SerialError::invalid_argument(
                "the baud rate must be greater than 0",
            ));
        }
        if s.data_bits == DataBits::Five && s.stop_bits == StopBits::Two {
            return Err(SerialError::invalid_argument(
                "the use of 5 data bits with 2 stop bits is an invalid combination",
            ));
        }
        if s.data_bits != DataBits::Five && s.stop_bits == StopBits::OneAndHalf {
            return Err(SerialError::invalid_argument(
                "the use of 6, 7 or 8 data bits with 1.5 stop bits is an invalid combination",
            ));
        }
        Ok(s)
    }
}
