//! Conversions between stream bytes and telnet octet values.
//!
//! Telnet option handling works in the full unsigned octet range 0-255, and
//! the IAC value 0xFF must survive unambiguously. These helpers convert
//! between byte buffers and octet-valued integers at the transport seam:
//! sub-negotiation payloads cross the transport boundary as `u32` octet
//! values, the command codec works in `u8`. Both functions are pure and
//! allocate exactly the requested length.

/// Truncates each of the first `length` values to its low eight bits.
///
/// Values are reduced modulo 256, not range checked.
pub fn to_byte_array(values: &[u32], length: usize) -> Vec<u8> {
    values[..length].iter().map(|&v| (v & 0xff) as u8).collect()
}

/// Widens each byte to its unsigned octet value (0-255).
pub fn to_int_array(bytes: &[u8]) -> Vec<u32> {
    bytes.iter().map(|&b| u32::from(b)).collect()
}
