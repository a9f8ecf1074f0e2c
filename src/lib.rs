// lib.rs

mod config;
mod core;
pub mod crc;
mod master;
mod modbus_rtu;
mod transaction;
pub mod transport;
pub mod value;

pub use config::{DataBits, MasterConfig, ParityMode, SerialSettings, StopBits};
pub use crate::core::{
    ExceptionCode, FunctionCode, ModbusRequest, ModbusResponse, ModbusUnitError, RegisterType,
};
pub use crate::core::{MAX_BITS_TO_READ, MAX_BITS_TO_WRITE, MAX_REGISTERS_TO_READ, MAX_REGISTERS_TO_WRITE};
pub use master::{ModbusMaster, ModbusMasterBuilder};
pub use modbus_rtu::{
    RtuFrame, character_time, decode_frame, encode_frame, predict_response_len, silent_interval,
};
pub use modbus_rtu::{MAX_SLAVE_ADDRESS, MIN_SLAVE_ADDRESS};
pub use transaction::{TransactionManager, TransactionState};
pub use transport::SerialTransport;
#[cfg(feature = "serial")]
pub use transport::SerialPortTransport;
pub use value::ByteOrder;

pub type Result<T> = std::result::Result<T, ModbusTransportError>;

#[derive(Debug, thiserror::Error)]
pub enum ModbusTransportError {
    #[error("Invalid slave address: {0}, expected 1..=247")]
    InvalidAddress(u8),

    #[error("Payload too large for function {function:#04x}: {len} > {max} bytes")]
    PayloadTooLarge { function: u8, len: usize, max: usize },

    #[error("Frame too short")]
    FrameTooShort,

    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    CrcMismatch { expected: u16, received: u16 },

    #[error("Slave address mismatch: expected {expected}, received {received}")]
    SlaveMismatch { expected: u8, received: u8 },

    #[error("Modbus exception: function code {function:#x}, {code}")]
    ExceptionResponse { function: u8, code: ExceptionCode },

    #[error("No complete response in time: received {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    #[error("Transport closed")]
    TransportClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ModbusUnitError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl ModbusTransportError {
    /// True when the call was rejected before anything was put on the bus.
    pub fn is_argument_error(&self) -> bool {
        match self {
            ModbusTransportError::InvalidAddress(_)
            | ModbusTransportError::PayloadTooLarge { .. }
            | ModbusTransportError::InvalidConfig(_) => true,
            ModbusTransportError::Protocol(err) => matches!(
                err,
                ModbusUnitError::ArgumentOutOfRange { .. }
                    | ModbusUnitError::InvalidRegisterType(..)
                    | ModbusUnitError::ValueOverflow(_)
            ),
            _ => false,
        }
    }

    /// Exception code when a slave answered with an exception response.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            ModbusTransportError::ExceptionResponse { code, .. } => Some(*code),
            _ => None,
        }
    }
}
