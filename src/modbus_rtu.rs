use std::time::Duration;

use super::*;
use crate::crc;

pub const MIN_SLAVE_ADDRESS: u8 = 1;
pub const MAX_SLAVE_ADDRESS: u8 = 247;

/// Address, function code and CRC.
pub const MIN_FRAME_LEN: usize = 4;
pub const EXCEPTION_FRAME_LEN: usize = 5;

const BYTES_BEFORE_PAYLOAD: usize = 2;
const CRC_LEN: usize = 2;

const BITS_PER_CHARACTER: f64 = 11.0;
const SILENT_CHARACTER_TIMES: f64 = 3.5;
const MIN_SILENT_INTERVAL: Duration = Duration::from_micros(1750);

/// A validated RTU frame with its CRC stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RtuFrame {
    pub slave: u8,
    pub function: u8,
    pub payload: Vec<u8>,
}

impl RtuFrame {
    pub fn function_code(&self) -> Result<FunctionCode> {
        Ok(FunctionCode::try_from(self.function)?)
    }
}

fn check_slave_address(slave: u8) -> Result<()> {
    if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&slave) {
        return Err(ModbusTransportError::InvalidAddress(slave));
    }
    Ok(())
}

/// Builds `slave ‖ function ‖ payload ‖ crc`, CRC low byte first.
pub fn encode_frame(slave: u8, function: FunctionCode, payload: &[u8]) -> Result<Vec<u8>> {
    check_slave_address(slave)?;

    let max = function.max_payload_len();
    if payload.len() > max {
        return Err(ModbusTransportError::PayloadTooLarge {
            function: function.as_u8(),
            len: payload.len(),
            max,
        });
    }

    let mut frame = Vec::with_capacity(BYTES_BEFORE_PAYLOAD + payload.len() + CRC_LEN);
    frame.push(slave);
    frame.push(function.as_u8());
    frame.extend_from_slice(payload);

    let crc = crc::crc16_bytes(&frame);
    frame.extend_from_slice(&crc);
    Ok(frame)
}

/// Validates a received frame against the slave it was expected from.
///
/// Checks run in wire order: length, CRC, slave address, exception flag. An
/// exception response is returned as an error, never as payload data.
pub fn decode_frame(frame: &[u8], expected_slave: u8) -> Result<RtuFrame> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(ModbusTransportError::FrameTooShort);
    }

    let (body, tail) = frame.split_at(frame.len() - CRC_LEN);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    let calculated = crc::crc16(body);
    if received != calculated {
        return Err(ModbusTransportError::CrcMismatch {
            expected: calculated,
            received,
        });
    }

    let slave = body[0];
    if slave != expected_slave {
        return Err(ModbusTransportError::SlaveMismatch {
            expected: expected_slave,
            received: slave,
        });
    }

    let function = body[1];
    if FunctionCode::is_exception(function) {
        let code = body
            .get(BYTES_BEFORE_PAYLOAD)
            .ok_or(ModbusTransportError::FrameTooShort)?;
        return Err(ModbusTransportError::ExceptionResponse {
            function: function & 0x7F,
            code: ExceptionCode::from(*code),
        });
    }

    Ok(RtuFrame {
        slave,
        function,
        payload: body[BYTES_BEFORE_PAYLOAD..].to_vec(),
    })
}

/// Full length of the frame a slave returns for `request`, CRC included.
pub fn predict_response_len(request: &ModbusRequest) -> usize {
    BYTES_BEFORE_PAYLOAD + request.expected_response_len() + CRC_LEN
}

/// Time to transmit one character: start bit, 8 data bits, parity or second
/// stop bit, stop bit.
pub fn character_time(baud_rate: u32) -> Duration {
    Duration::from_secs_f64(BITS_PER_CHARACTER / baud_rate.max(1) as f64)
}

/// Minimum line silence that separates two frames.
pub fn silent_interval(baud_rate: u32) -> Duration {
    character_time(baud_rate)
        .mul_f64(SILENT_CHARACTER_TIMES)
        .max(MIN_SILENT_INTERVAL)
}

pub(crate) fn transmission_time(baud_rate: u32, bytes: usize) -> Duration {
    character_time(baud_rate) * bytes as u32
}
