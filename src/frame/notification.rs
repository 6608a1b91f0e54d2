use super::*;

/// The fields of a status-update notification, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusFields {
    pub ac_input_voltage: f32,
    pub ac_input_current: f32,
    pub ac_input_frequency: f32,
    pub temperature_1: f32,
    pub temperature_2: f32,
    pub dc_output_voltage: f32,
    pub dc_output_current: f32,
    /// How far into the current-limiting region the output is, in percent.
    pub current_limiting_point_pct: f32,
    pub efficiency_pct: f32,
}

/// Whether the device accepted a voltage or current write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Accepted,
    Rejected,
}

/// The result of decoding one inbound notification buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded {
    Status(StatusFields),
    SetpointEcho { voltage: f32, current: f32 },
    SetVoltageAck(AckOutcome),
    SetCurrentAck(AckOutcome),
    /// A code this client does not understand. Not an error.
    Unhandled { code: u16 },
    /// Too short for its declared code. Discarded.
    Malformed,
}

const STATUS_LEN: usize = 38;
const SETPOINT_ECHO_LEN: usize = 10;

/// Decode one notification buffer.
///
/// Never fails: unknown codes and undersized buffers come back as
/// [`Decoded::Unhandled`] and [`Decoded::Malformed`] for the caller to
/// discard.
pub fn decode(buffer: &[u8]) -> Decoded {
    let Some(code) = read_u16(buffer, 0) else {
        return Decoded::Malformed;
    };
    match code {
        STATUS_UPDATE_CODE => decode_status(buffer),
        SETPOINT_ECHO_CODE => decode_setpoint_echo(buffer),
        SET_VOLTAGE_RESPONSE_CODE => match read_u16(buffer, 2) {
            None => Decoded::Malformed,
            Some(SET_VOLTAGE_SUCCESS_SUBCODE) => Decoded::SetVoltageAck(AckOutcome::Accepted),
            Some(SET_VOLTAGE_ERROR_SUBCODE) => Decoded::SetVoltageAck(AckOutcome::Rejected),
            Some(_) => Decoded::Unhandled { code },
        },
        SET_CURRENT_RESPONSE_CODE => match read_u16(buffer, 2) {
            None => Decoded::Malformed,
            Some(SET_CURRENT_SUCCESS_SUBCODE) => Decoded::SetCurrentAck(AckOutcome::Accepted),
            Some(SET_CURRENT_ERROR_SUBCODE) => Decoded::SetCurrentAck(AckOutcome::Rejected),
            Some(_) => Decoded::Unhandled { code },
        },
        _ => Decoded::Unhandled { code },
    }
}

fn decode_status(buffer: &[u8]) -> Decoded {
    if buffer.len() < STATUS_LEN {
        return Decoded::Malformed;
    }
    Decoded::Status(StatusFields {
        ac_input_voltage: read_f32(buffer, 2),
        ac_input_current: read_f32(buffer, 6),
        ac_input_frequency: read_f32(buffer, 10),
        temperature_1: read_f32(buffer, 14),
        temperature_2: read_f32(buffer, 18),
        dc_output_voltage: read_f32(buffer, 22),
        dc_output_current: read_f32(buffer, 26),
        current_limiting_point_pct: read_f32(buffer, 30),
        efficiency_pct: read_f32(buffer, 34),
    })
}

fn decode_setpoint_echo(buffer: &[u8]) -> Decoded {
    if buffer.len() < SETPOINT_ECHO_LEN {
        return Decoded::Malformed;
    }
    Decoded::SetpointEcho {
        voltage: read_f32(buffer, 2),
        current: read_f32(buffer, 6),
    }
}

fn read_u16(buffer: &[u8], at: usize) -> Option<u16> {
    if buffer.len() < at + 2 {
        return None;
    }
    Some(u16::from_le_bytes([buffer[at], buffer[at + 1]]))
}

// Callers have already checked the buffer length.
fn read_f32(buffer: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([
        buffer[at],
        buffer[at + 1],
        buffer[at + 2],
        buffer[at + 3],
    ])
}
