//! Conversions between register words, packed bits and the typed values a
//! caller works with.

use serde::{Deserialize, Serialize};

use crate::core::{ModbusUnitError, check_range};

pub const MAX_NUMBER_OF_DECIMALS: u8 = 10;

const BITS_PER_BYTE: usize = 8;

/// Order of the bytes of a multi-register value on the wire.
///
/// Modbus only fixes the byte order inside one register (high byte first); how
/// devices spread a 32-bit value over two registers varies by vendor. Letters
/// name the bytes of the big-endian value, most significant first.
///
/// The default is [`ByteOrder::BigSwap`]: big-endian words, low word first, the
/// layout of Click PLCs and many other controllers. Devices that send the high
/// word first need [`ByteOrder::Big`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// ABCD
    Big,
    /// DCBA
    Little,
    /// CDAB
    #[default]
    BigSwap,
    /// BADC
    LittleSwap,
}

impl ByteOrder {
    /// Rearranges a big-endian byte image into wire order. Applying it twice
    /// restores the input, so the same call decodes.
    fn arrange(self, bytes: &mut [u8]) {
        match self {
            ByteOrder::Big => {}
            ByteOrder::Little => bytes.reverse(),
            ByteOrder::BigSwap => {
                bytes.reverse();
                swap_word_bytes(bytes);
            }
            ByteOrder::LittleSwap => swap_word_bytes(bytes),
        }
    }

    pub fn opposite_word_order(self) -> Self {
        match self {
            ByteOrder::Big => ByteOrder::BigSwap,
            ByteOrder::BigSwap => ByteOrder::Big,
            ByteOrder::Little => ByteOrder::LittleSwap,
            ByteOrder::LittleSwap => ByteOrder::Little,
        }
    }
}

fn swap_word_bytes(bytes: &mut [u8]) {
    for word in bytes.chunks_exact_mut(2) {
        word.swap(0, 1);
    }
}

/// Packs bits LSB first, eight per byte; the last byte is zero-padded.
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len().div_ceil(BITS_PER_BYTE)];
    for (i, &bit) in values.iter().enumerate() {
        if bit {
            bytes[i / BITS_PER_BYTE] |= 1 << (i % BITS_PER_BYTE);
        }
    }
    bytes
}

/// Unpacks the first `count` bits; padding bits in the last byte are ignored.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Result<Vec<bool>, ModbusUnitError> {
    let needed = count.div_ceil(BITS_PER_BYTE);
    if bytes.len() < needed {
        return Err(ModbusUnitError::InvalidResponseLength {
            expected: needed,
            actual: bytes.len(),
        });
    }

    Ok((0..count)
        .map(|i| (bytes[i / BITS_PER_BYTE] >> (i % BITS_PER_BYTE)) & 0x01 == 1)
        .collect())
}

pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    registers.iter().flat_map(|register| register.to_be_bytes()).collect()
}

pub fn bytes_to_registers(bytes: &[u8]) -> Result<Vec<u16>, ModbusUnitError> {
    if bytes.len() % 2 != 0 {
        return Err(ModbusUnitError::InvalidResponseLength {
            expected: bytes.len() + 1,
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn to_signed(raw: u16) -> i16 {
    raw as i16
}

pub fn from_signed(value: i16) -> u16 {
    value as u16
}

fn check_register_count(registers: &[u16], count: usize) -> Result<(), ModbusUnitError> {
    check_range(
        "number of registers",
        registers.len() as i64,
        count as i64,
        count as i64,
    )
}

pub fn u32_to_registers(value: u32, order: ByteOrder) -> [u16; 2] {
    let mut bytes = value.to_be_bytes();
    order.arrange(&mut bytes);
    [
        u16::from_be_bytes([bytes[0], bytes[1]]),
        u16::from_be_bytes([bytes[2], bytes[3]]),
    ]
}

pub fn registers_to_u32(registers: &[u16], order: ByteOrder) -> Result<u32, ModbusUnitError> {
    check_register_count(registers, 2)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&registers_to_bytes(registers));
    order.arrange(&mut bytes);
    Ok(u32::from_be_bytes(bytes))
}

pub fn i32_to_registers(value: i32, order: ByteOrder) -> [u16; 2] {
    u32_to_registers(value as u32, order)
}

pub fn registers_to_i32(registers: &[u16], order: ByteOrder) -> Result<i32, ModbusUnitError> {
    registers_to_u32(registers, order).map(|raw| raw as i32)
}

pub fn f32_to_registers(value: f32, order: ByteOrder) -> [u16; 2] {
    u32_to_registers(value.to_bits(), order)
}

pub fn registers_to_f32(registers: &[u16], order: ByteOrder) -> Result<f32, ModbusUnitError> {
    registers_to_u32(registers, order).map(f32::from_bits)
}

pub fn f64_to_registers(value: f64, order: ByteOrder) -> [u16; 4] {
    let mut bytes = value.to_bits().to_be_bytes();
    order.arrange(&mut bytes);
    let mut registers = [0u16; 4];
    for (register, pair) in registers.iter_mut().zip(bytes.chunks_exact(2)) {
        *register = u16::from_be_bytes([pair[0], pair[1]]);
    }
    registers
}

pub fn registers_to_f64(registers: &[u16], order: ByteOrder) -> Result<f64, ModbusUnitError> {
    check_register_count(registers, 4)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&registers_to_bytes(registers));
    order.arrange(&mut bytes);
    Ok(f64::from_bits(u64::from_be_bytes(bytes)))
}

/// Encodes a 32-bit long. Signed values must fit `i32`, unsigned ones `u32`.
pub fn long_to_registers(
    value: i64,
    signed: bool,
    order: ByteOrder,
) -> Result<[u16; 2], ModbusUnitError> {
    if signed {
        let value = i32::try_from(value).map_err(|_| ModbusUnitError::ValueOverflow(value as f64))?;
        Ok(i32_to_registers(value, order))
    } else {
        let value = u32::try_from(value).map_err(|_| ModbusUnitError::ValueOverflow(value as f64))?;
        Ok(u32_to_registers(value, order))
    }
}

pub fn registers_to_long(
    registers: &[u16],
    signed: bool,
    order: ByteOrder,
) -> Result<i64, ModbusUnitError> {
    if signed {
        registers_to_i32(registers, order).map(i64::from)
    } else {
        registers_to_u32(registers, order).map(i64::from)
    }
}

pub(crate) fn check_decimals(decimals: u8) -> Result<(), ModbusUnitError> {
    check_range(
        "number of decimals",
        decimals as i64,
        0,
        MAX_NUMBER_OF_DECIMALS as i64,
    )
}

fn decimal_factor(decimals: u8) -> Result<f64, ModbusUnitError> {
    check_decimals(decimals)?;
    Ok(10f64.powi(decimals as i32))
}

/// Interprets a raw register as a fixed-point number with `decimals` digits.
pub fn scale_register(raw: u16, decimals: u8, signed: bool) -> Result<f64, ModbusUnitError> {
    let divisor = decimal_factor(decimals)?;
    let base = if signed { to_signed(raw) as f64 } else { raw as f64 };
    Ok(base / divisor)
}

/// Inverse of [`scale_register`]; the scaled value is truncated toward zero.
pub fn unscale_register(value: f64, decimals: u8, signed: bool) -> Result<u16, ModbusUnitError> {
    let multiplier = decimal_factor(decimals)?;
    let scaled = (value * multiplier).trunc();
    let (min, max) = if signed {
        (i16::MIN as f64, i16::MAX as f64)
    } else {
        (0.0, u16::MAX as f64)
    };
    if !scaled.is_finite() || scaled < min || scaled > max {
        return Err(ModbusUnitError::ValueOverflow(value));
    }

    if signed {
        Ok(from_signed(scaled as i16))
    } else {
        Ok(scaled as u16)
    }
}
