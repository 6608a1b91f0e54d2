//! Wire codec for the charger's proprietary command/response protocol.
//!
//! Commands are short checksummed frames (7 bytes with a payload, 3 without);
//! responses arrive as notification buffers dispatched by a 16-bit code at
//! offset 0. All multi-byte fields are little-endian.

mod command;
mod notification;

pub use command::Command;
pub use notification::{decode, AckOutcome, Decoded, StatusFields};

// Inbound notification codes, u16 little-endian at offset 0.
pub(crate) const STATUS_UPDATE_CODE: u16 = 0x0630;
pub(crate) const SETPOINT_ECHO_CODE: u16 = 0x0565;
pub(crate) const SET_VOLTAGE_RESPONSE_CODE: u16 = 0x0703;
pub(crate) const SET_CURRENT_RESPONSE_CODE: u16 = 0x0803;

// Acknowledgment subcodes, u16 little-endian at offset 2.
pub(crate) const SET_VOLTAGE_SUCCESS_SUBCODE: u16 = 0x0801;
pub(crate) const SET_VOLTAGE_ERROR_SUBCODE: u16 = 0x0700;
pub(crate) const SET_CURRENT_SUCCESS_SUBCODE: u16 = 0x0901;
pub(crate) const SET_CURRENT_ERROR_SUBCODE: u16 = 0x0800;

/// Compute the check value for the given bytes: their sum modulo 256.
pub(crate) fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

#[test]
fn test_checksum() {
    assert_eq!(checksum(&[]), 0);
    assert_eq!(checksum(&[0x07, 0x33, 0x33, 0x17, 0x43]), 0xc7);
    assert_eq!(checksum(&[0xff, 0x01]), 0x00);
    assert_eq!(checksum(&[0xff, 0xff, 0xff]), 0xfd);
}
