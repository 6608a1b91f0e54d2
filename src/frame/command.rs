use super::checksum;

/// An outbound command for the charger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Ask the device to echo its current voltage/current setpoint.
    RequestSetpoint,
    /// Ask the device for a status update.
    RequestStatus,
    /// Set the output voltage target, in volts.
    SetVoltage(f32),
    /// Set the output current target, in amps.
    SetCurrent(f32),
    /// Switch the output on or off.
    SetOutputEnabled(bool),
}

impl Command {
    fn opcode(&self) -> [u8; 2] {
        match self {
            Command::RequestSetpoint => [0x02, 0x05],
            Command::RequestStatus => [0x02, 0x06],
            Command::SetVoltage(_) => [0x06, 0x07],
            Command::SetCurrent(_) => [0x06, 0x08],
            Command::SetOutputEnabled(_) => [0x06, 0x0c],
        }
    }

    /// Encode this command as a wire frame.
    ///
    /// Voltage, current and enable commands are 7 bytes: opcode, subopcode,
    /// 4-byte little-endian payload, checksum. Voltage and current targets
    /// are f32; the enable command carries a raw u32 where `1` disables the
    /// output and `0` enables it. The two request commands carry no payload
    /// at all and are 3 bytes: opcode, subopcode, checksum. In either shape
    /// the trailing checksum covers everything after the opcode byte.
    pub fn encode(&self) -> Vec<u8> {
        let payload: Option<[u8; 4]> = match self {
            Command::RequestSetpoint | Command::RequestStatus => None,
            Command::SetVoltage(volts) => Some(volts.to_le_bytes()),
            Command::SetCurrent(amps) => Some(amps.to_le_bytes()),
            Command::SetOutputEnabled(enabled) => Some(u32::from(!enabled).to_le_bytes()),
        };

        let mut frame = Vec::with_capacity(7);
        frame.extend_from_slice(&self.opcode());
        if let Some(payload) = payload {
            frame.extend_from_slice(&payload);
        }
        frame.push(checksum(&frame[1..]));
        frame
    }
}
