use std::fmt;

use thiserror::Error;

use crate::value;

pub const MAX_BITS_TO_READ: u16 = 2000;
pub const MAX_BITS_TO_WRITE: u16 = 1968;
pub const MAX_REGISTERS_TO_READ: u16 = 125;
pub const MAX_REGISTERS_TO_WRITE: u16 = 123;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

#[derive(Debug, Error)]
pub enum ModbusUnitError {
    #[error("Invalid {what}: {value} is outside {min}..={max}")]
    ArgumentOutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Register type {0:?} can't be used for {1}")]
    InvalidRegisterType(RegisterType, &'static str),

    #[error("Value {0} overflow the register width")]
    ValueOverflow(f64),

    #[error("Unknown function code {0:#04x}")]
    UnknownFunctionCode(u8),

    #[error("Unexpected function code: expected {expected:#x}, got {received:#x}")]
    UnexpectedFunctionCode { expected: u8, received: u8 },

    #[error("Invalid response length: expected {expected} bytes, got {actual}")]
    InvalidResponseLength { expected: usize, actual: usize },

    #[error("Echoed {what} mismatch: expected {expected:#06x}, got {received:#06x}")]
    ResponseMismatch {
        what: &'static str,
        expected: u16,
        received: u16,
    },

    #[error("Response carries no {0}")]
    UnexpectedResponse(&'static str),
}

/// Rejects `value` unless it lies within `min..=max`.
pub(crate) fn check_range(
    what: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), ModbusUnitError> {
    if value < min || value > max {
        return Err(ModbusUnitError::ArgumentOutOfRange { what, value, min, max });
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterType {
    CoilRegister,
    DiscreteRegister,
    HoldingRegister,
    InputRegister,
}

impl RegisterType {
    pub fn is_bit(self) -> bool {
        matches!(self, RegisterType::CoilRegister | RegisterType::DiscreteRegister)
    }

    pub fn read_function(self) -> FunctionCode {
        match self {
            RegisterType::CoilRegister => FunctionCode::ReadCoils,
            RegisterType::DiscreteRegister => FunctionCode::ReadDiscreteInputs,
            RegisterType::HoldingRegister => FunctionCode::ReadHoldingRegisters,
            RegisterType::InputRegister => FunctionCode::ReadInputRegisters,
        }
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Largest request payload this function may carry.
    pub fn max_payload_len(self) -> usize {
        match self {
            FunctionCode::WriteMultipleCoils => 5 + MAX_BITS_TO_WRITE.div_ceil(8) as usize,
            FunctionCode::WriteMultipleRegisters => 5 + 2 * MAX_REGISTERS_TO_WRITE as usize,
            _ => 4,
        }
    }

    pub fn is_exception(byte: u8) -> bool {
        (byte & 0x80) != 0
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = ModbusUnitError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FunctionCode::ReadCoils),
            0x02 => Ok(FunctionCode::ReadDiscreteInputs),
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x05 => Ok(FunctionCode::WriteSingleCoil),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            0x0F => Ok(FunctionCode::WriteMultipleCoils),
            0x10 => Ok(FunctionCode::WriteMultipleRegisters),
            other => Err(ModbusUnitError::UnknownFunctionCode(other)),
        }
    }
}

/// Exception code returned by a slave that rejected a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailedToRespond,
    Unknown(u8),
}

impl ExceptionCode {
    pub fn as_u8(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::SlaveDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailedToRespond => 0x0B,
            ExceptionCode::Unknown(raw) => raw,
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::SlaveDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailedToRespond,
            other => ExceptionCode::Unknown(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::SlaveDeviceFailure => "slave device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::SlaveDeviceBusy => "slave device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailedToRespond => "gateway target failed to respond",
            ExceptionCode::Unknown(_) => "unknown exception",
        };
        write!(f, "{} ({:#04x})", name, self.as_u8())
    }
}

/// One request PDU, keyed by the function it maps to.
#[derive(Clone, Debug, PartialEq)]
pub enum ModbusRequest {
    ReadBits {
        register_type: RegisterType,
        address: u16,
        count: u16,
    },
    ReadRegisters {
        register_type: RegisterType,
        address: u16,
        count: u16,
    },
    WriteSingleCoil {
        address: u16,
        value: bool,
    },
    WriteSingleRegister {
        address: u16,
        value: u16,
    },
    WriteMultipleCoils {
        address: u16,
        values: Vec<bool>,
    },
    WriteMultipleRegisters {
        address: u16,
        values: Vec<u16>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModbusResponse {
    Bits(Vec<bool>),
    Registers(Vec<u16>),
    Written { address: u16, quantity: u16 },
}

impl ModbusResponse {
    pub fn into_bits(self) -> Result<Vec<bool>, ModbusUnitError> {
        match self {
            ModbusResponse::Bits(bits) => Ok(bits),
            _ => Err(ModbusUnitError::UnexpectedResponse("bits")),
        }
    }

    pub fn into_registers(self) -> Result<Vec<u16>, ModbusUnitError> {
        match self {
            ModbusResponse::Registers(registers) => Ok(registers),
            _ => Err(ModbusUnitError::UnexpectedResponse("registers")),
        }
    }
}

impl ModbusRequest {
    /// Read request for `count` items starting at `address`.
    pub fn read(
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<Self, ModbusUnitError> {
        let request = if register_type.is_bit() {
            ModbusRequest::ReadBits { register_type, address, count }
        } else {
            ModbusRequest::ReadRegisters { register_type, address, count }
        };
        request.validate()?;
        Ok(request)
    }

    /// Coil write. A single value goes out as function 0x05, more as 0x0F.
    pub fn write_bits(address: u16, values: &[bool]) -> Result<Self, ModbusUnitError> {
        let request = match values {
            [value] => ModbusRequest::WriteSingleCoil { address, value: *value },
            _ => ModbusRequest::WriteMultipleCoils { address, values: values.to_vec() },
        };
        request.validate()?;
        Ok(request)
    }

    /// Holding register write. A single value goes out as function 0x06, more as 0x10.
    pub fn write_registers(address: u16, values: &[u16]) -> Result<Self, ModbusUnitError> {
        match values {
            [value] => Ok(ModbusRequest::WriteSingleRegister { address, value: *value }),
            _ => Self::write_multiple_registers(address, values),
        }
    }

    /// Holding register write that always uses function 0x10.
    pub fn write_multiple_registers(
        address: u16,
        values: &[u16],
    ) -> Result<Self, ModbusUnitError> {
        let request = ModbusRequest::WriteMultipleRegisters { address, values: values.to_vec() };
        request.validate()?;
        Ok(request)
    }

    pub fn function_code(&self) -> FunctionCode {
        match self {
            ModbusRequest::ReadBits { register_type, .. }
            | ModbusRequest::ReadRegisters { register_type, .. } => register_type.read_function(),
            ModbusRequest::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            ModbusRequest::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            ModbusRequest::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            ModbusRequest::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub fn address(&self) -> u16 {
        match self {
            ModbusRequest::ReadBits { address, .. }
            | ModbusRequest::ReadRegisters { address, .. }
            | ModbusRequest::WriteSingleCoil { address, .. }
            | ModbusRequest::WriteSingleRegister { address, .. }
            | ModbusRequest::WriteMultipleCoils { address, .. }
            | ModbusRequest::WriteMultipleRegisters { address, .. } => *address,
        }
    }

    /// Number of bits or registers the request touches.
    pub fn quantity(&self) -> u16 {
        match self {
            ModbusRequest::ReadBits { count, .. } | ModbusRequest::ReadRegisters { count, .. } => {
                *count
            }
            ModbusRequest::WriteSingleCoil { .. } | ModbusRequest::WriteSingleRegister { .. } => 1,
            ModbusRequest::WriteMultipleCoils { values, .. } => values.len() as u16,
            ModbusRequest::WriteMultipleRegisters { values, .. } => values.len() as u16,
        }
    }

    /// Checks counts and address ranges against the protocol limits.
    pub fn validate(&self) -> Result<(), ModbusUnitError> {
        match self {
            ModbusRequest::ReadBits { register_type, count, .. } => {
                if !register_type.is_bit() {
                    return Err(ModbusUnitError::InvalidRegisterType(*register_type, "bit reads"));
                }
                check_range("number of bits", *count as i64, 1, MAX_BITS_TO_READ as i64)?;
            }
            ModbusRequest::ReadRegisters { register_type, count, .. } => {
                if register_type.is_bit() {
                    return Err(ModbusUnitError::InvalidRegisterType(
                        *register_type,
                        "register reads",
                    ));
                }
                check_range(
                    "number of registers",
                    *count as i64,
                    1,
                    MAX_REGISTERS_TO_READ as i64,
                )?;
            }
            ModbusRequest::WriteSingleCoil { .. } | ModbusRequest::WriteSingleRegister { .. } => {}
            ModbusRequest::WriteMultipleCoils { values, .. } => {
                check_range(
                    "number of bits",
                    values.len() as i64,
                    1,
                    MAX_BITS_TO_WRITE as i64,
                )?;
            }
            ModbusRequest::WriteMultipleRegisters { values, .. } => {
                check_range(
                    "number of registers",
                    values.len() as i64,
                    1,
                    MAX_REGISTERS_TO_WRITE as i64,
                )?;
            }
        }

        let last = self.address() as i64 + self.quantity() as i64 - 1;
        check_range("end address", last, 0, u16::MAX as i64)
    }

    /// Validates the request, then encodes its payload.
    pub fn encode_payload(&self) -> Result<Vec<u8>, ModbusUnitError> {
        self.validate()?;

        let mut result: Vec<u8> = Vec::with_capacity(self.function_code().max_payload_len());
        result.extend_from_slice(&self.address().to_be_bytes());

        match self {
            ModbusRequest::ReadBits { count, .. } | ModbusRequest::ReadRegisters { count, .. } => {
                result.extend_from_slice(&count.to_be_bytes());
            }
            ModbusRequest::WriteSingleCoil { value, .. } => {
                let raw = if *value { COIL_ON } else { COIL_OFF };
                result.extend_from_slice(&raw.to_be_bytes());
            }
            ModbusRequest::WriteSingleRegister { value, .. } => {
                result.extend_from_slice(&value.to_be_bytes());
            }
            ModbusRequest::WriteMultipleCoils { values, .. } => {
                let packed = value::pack_bits(values);
                result.extend_from_slice(&(values.len() as u16).to_be_bytes());
                result.push(packed.len() as u8);
                result.extend(packed);
            }
            ModbusRequest::WriteMultipleRegisters { values, .. } => {
                result.extend_from_slice(&(values.len() as u16).to_be_bytes());
                result.push((values.len() * 2) as u8);
                result.extend(value::registers_to_bytes(values));
            }
        }
        Ok(result)
    }

    /// Length of the response payload (between function byte and CRC).
    pub fn expected_response_len(&self) -> usize {
        match self {
            ModbusRequest::ReadBits { count, .. } => 1 + count.div_ceil(8) as usize,
            ModbusRequest::ReadRegisters { count, .. } => 1 + 2 * *count as usize,
            _ => 4,
        }
    }

    pub fn parse_response(&self, payload: &[u8]) -> Result<ModbusResponse, ModbusUnitError> {
        let expected = self.expected_response_len();
        if payload.len() != expected {
            return Err(ModbusUnitError::InvalidResponseLength {
                expected,
                actual: payload.len(),
            });
        }

        match self {
            ModbusRequest::ReadBits { count, .. } => {
                Self::check_byte_count(payload)?;
                let bits = value::unpack_bits(&payload[1..], *count as usize)?;
                Ok(ModbusResponse::Bits(bits))
            }
            ModbusRequest::ReadRegisters { .. } => {
                Self::check_byte_count(payload)?;
                let registers = value::bytes_to_registers(&payload[1..])?;
                Ok(ModbusResponse::Registers(registers))
            }
            ModbusRequest::WriteSingleCoil { value, .. } => {
                let raw = if *value { COIL_ON } else { COIL_OFF };
                self.check_write_echo(payload, "coil value", raw)
            }
            ModbusRequest::WriteSingleRegister { value, .. } => {
                self.check_write_echo(payload, "register value", *value)
            }
            ModbusRequest::WriteMultipleCoils { .. }
            | ModbusRequest::WriteMultipleRegisters { .. } => {
                self.check_write_echo(payload, "quantity", self.quantity())
            }
        }
    }

    fn check_byte_count(payload: &[u8]) -> Result<(), ModbusUnitError> {
        let byte_count = payload[0] as usize;
        if byte_count != payload.len() - 1 {
            return Err(ModbusUnitError::InvalidResponseLength {
                expected: payload.len() - 1,
                actual: byte_count,
            });
        }
        Ok(())
    }

    fn check_write_echo(
        &self,
        payload: &[u8],
        what: &'static str,
        expected: u16,
    ) -> Result<ModbusResponse, ModbusUnitError> {
        let address = u16::from_be_bytes([payload[0], payload[1]]);
        if address != self.address() {
            return Err(ModbusUnitError::ResponseMismatch {
                what: "address",
                expected: self.address(),
                received: address,
            });
        }

        let echoed = u16::from_be_bytes([payload[2], payload[3]]);
        if echoed != expected {
            return Err(ModbusUnitError::ResponseMismatch { what, expected, received: echoed });
        }

        Ok(ModbusResponse::Written { address, quantity: self.quantity() })
    }
}
