use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::*;
use crate::modbus_rtu::{MAX_SLAVE_ADDRESS, MIN_SLAVE_ADDRESS};

const DEFAULT_BAUD_RATE: u32 = 9600;
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Bus-wide settings of a [`ModbusMaster`](crate::ModbusMaster).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Used for the inter-frame gap and to stretch the response timeout.
    pub baud_rate: u32,
    /// Base response timeout; the transmission time of the expected
    /// response is added on top. Stored in whole milliseconds.
    #[serde(rename = "response_timeout_ms", with = "duration_millis")]
    pub response_timeout: Duration,
    /// Word order for floats and longs of slaves not listed below.
    pub byte_order: ByteOrder,
    pub slave_byte_orders: BTreeMap<u8, ByteOrder>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            byte_order: ByteOrder::default(),
            slave_byte_orders: BTreeMap::new(),
        }
    }
}

impl MasterConfig {
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn byte_order_for(&self, slave: u8) -> ByteOrder {
        self.slave_byte_orders
            .get(&slave)
            .copied()
            .unwrap_or(self.byte_order)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(ModbusTransportError::InvalidConfig("baud rate must be positive"));
        }
        if self.response_timeout.is_zero() {
            return Err(ModbusTransportError::InvalidConfig(
                "response timeout must be positive",
            ));
        }
        if u64::try_from(self.response_timeout.as_millis()).is_err() {
            return Err(ModbusTransportError::InvalidConfig("response timeout too large"));
        }
        if let Some(&slave) = self
            .slave_byte_orders
            .keys()
            .find(|slave| !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(*slave))
        {
            return Err(ModbusTransportError::InvalidAddress(slave));
        }
        Ok(())
    }
}

/// Millisecond representation of a [`Duration`]; sub-millisecond parts round up.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, ser};

    pub fn serialize<S: Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(timeout.as_nanos().div_ceil(1_000_000))
            .map_err(<S::Error as ser::Error>::custom)?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityMode {
    None,
    #[default]
    Odd,
    Even,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Line settings used to open a serial port.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub parity: ParityMode,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            parity: ParityMode::default(),
            data_bits: DataBits::default(),
            stop_bits: StopBits::default(),
        }
    }
}
