use std::time::Duration;

use super::*;
use crate::core::check_range;

const REGISTERS_PER_FLOAT: u16 = 2;
const REGISTERS_PER_DOUBLE: u16 = 4;

pub struct ModbusMasterBuilder<T> {
    transport: T,
    config: MasterConfig,
}

impl<T: SerialTransport> ModbusMasterBuilder<T> {
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.config.byte_order = byte_order;
        self
    }

    pub fn slave_byte_order(mut self, slave: u8, byte_order: ByteOrder) -> Self {
        self.config.slave_byte_orders.insert(slave, byte_order);
        self
    }

    pub fn config(mut self, config: MasterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ModbusMaster<T>> {
        ModbusMaster::from_config(self.config, self.transport)
    }
}

/// Modbus RTU master for one serial bus.
///
/// Every operation takes `&self`; share the master between threads with an
/// `Arc` and transactions are serialized on the bus. Arguments are checked
/// before anything is sent.
///
/// Writes of a single bit or register use functions 0x05 and 0x06; longer
/// writes and all float/long writes use 0x0F and 0x10.
pub struct ModbusMaster<T> {
    manager: TransactionManager<T>,
    config: MasterConfig,
}

impl<T: SerialTransport> ModbusMaster<T> {
    pub fn builder(transport: T) -> ModbusMasterBuilder<T> {
        ModbusMasterBuilder {
            transport,
            config: MasterConfig::default(),
        }
    }

    pub fn from_config(config: MasterConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let manager = TransactionManager::new(transport, config.baud_rate, config.response_timeout());
        Ok(Self { manager, config })
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn transaction_manager(&self) -> &TransactionManager<T> {
        &self.manager
    }

    /// Hands the transport back, e.g. to close or reset a hung line.
    pub fn into_transport(self) -> T {
        self.manager.into_transport()
    }

    pub fn byte_order_for(&self, slave: u8) -> ByteOrder {
        self.config.byte_order_for(slave)
    }

    pub fn execute(&self, slave: u8, request: &ModbusRequest) -> Result<ModbusResponse> {
        self.manager.execute(slave, request)
    }

    fn read_block(
        &self,
        slave: u8,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<ModbusResponse> {
        let request = ModbusRequest::read(register_type, address, count)?;
        self.manager.execute(slave, &request)
    }

    /// Reads coils (function 0x01).
    pub fn read_bits(&self, slave: u8, address: u16, count: u16) -> Result<Vec<bool>> {
        let response = self.read_block(slave, RegisterType::CoilRegister, address, count)?;
        Ok(response.into_bits()?)
    }

    /// Reads discrete inputs (function 0x02).
    pub fn read_discrete_inputs(&self, slave: u8, address: u16, count: u16) -> Result<Vec<bool>> {
        let response = self.read_block(slave, RegisterType::DiscreteRegister, address, count)?;
        Ok(response.into_bits()?)
    }

    pub fn read_bit(&self, slave: u8, address: u16) -> Result<bool> {
        let bits = self.read_bits(slave, address, 1)?;
        bits.first()
            .copied()
            .ok_or(ModbusUnitError::UnexpectedResponse("bits").into())
    }

    pub fn write_bits(&self, slave: u8, address: u16, values: &[bool]) -> Result<()> {
        let request = ModbusRequest::write_bits(address, values)?;
        self.manager.execute(slave, &request)?;
        Ok(())
    }

    pub fn write_bit(&self, slave: u8, address: u16, value: bool) -> Result<()> {
        self.write_bits(slave, address, &[value])
    }

    /// Reads holding registers (function 0x03).
    pub fn read_registers(&self, slave: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        let response = self.read_block(slave, RegisterType::HoldingRegister, address, count)?;
        Ok(response.into_registers()?)
    }

    /// Reads input registers (function 0x04).
    pub fn read_input_registers(&self, slave: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        let response = self.read_block(slave, RegisterType::InputRegister, address, count)?;
        Ok(response.into_registers()?)
    }

    pub fn write_registers(&self, slave: u8, address: u16, values: &[u16]) -> Result<()> {
        let request = ModbusRequest::write_registers(address, values)?;
        self.manager.execute(slave, &request)?;
        Ok(())
    }

    fn read_single_register(&self, slave: u8, address: u16) -> Result<u16> {
        let registers = self.read_registers(slave, address, 1)?;
        registers
            .first()
            .copied()
            .ok_or(ModbusUnitError::UnexpectedResponse("registers").into())
    }

    /// Reads one register as a fixed-point number with `decimals` digits.
    pub fn read_register(&self, slave: u8, address: u16, decimals: u8, signed: bool) -> Result<f64> {
        value::check_decimals(decimals)?;
        let raw = self.read_single_register(slave, address)?;
        Ok(value::scale_register(raw, decimals, signed)?)
    }

    pub fn write_register(
        &self,
        slave: u8,
        address: u16,
        scaled: f64,
        decimals: u8,
        signed: bool,
    ) -> Result<()> {
        let raw = value::unscale_register(scaled, decimals, signed)?;
        self.write_registers(slave, address, &[raw])
    }

    pub fn read_register_signed(&self, slave: u8, address: u16) -> Result<i16> {
        Ok(value::to_signed(self.read_single_register(slave, address)?))
    }

    pub fn write_register_signed(&self, slave: u8, address: u16, signed: i16) -> Result<()> {
        self.write_registers(slave, address, &[value::from_signed(signed)])
    }

    /// Rejects register counts that are not a positive multiple of `per_value`.
    fn check_value_registers(register_count: u16, per_value: u16) -> Result<()> {
        let max = MAX_REGISTERS_TO_READ - MAX_REGISTERS_TO_READ % per_value;
        check_range(
            "number of registers",
            register_count as i64,
            per_value as i64,
            max as i64,
        )?;
        if register_count % per_value != 0 {
            return Err(ModbusUnitError::ArgumentOutOfRange {
                what: "number of registers (not a whole number of values)",
                value: register_count as i64,
                min: per_value as i64,
                max: max as i64,
            }
            .into());
        }
        Ok(())
    }

    pub fn read_float(&self, slave: u8, address: u16) -> Result<f32> {
        let registers = self.read_registers(slave, address, REGISTERS_PER_FLOAT)?;
        Ok(value::registers_to_f32(&registers, self.byte_order_for(slave))?)
    }

    /// Reads consecutive floats spread over `register_count` registers.
    pub fn read_floats(&self, slave: u8, address: u16, register_count: u16) -> Result<Vec<f32>> {
        Self::check_value_registers(register_count, REGISTERS_PER_FLOAT)?;
        let order = self.byte_order_for(slave);
        let registers = self.read_registers(slave, address, register_count)?;
        registers
            .chunks_exact(REGISTERS_PER_FLOAT as usize)
            .map(|pair| value::registers_to_f32(pair, order).map_err(ModbusTransportError::from))
            .collect()
    }

    pub fn write_float(&self, slave: u8, address: u16, float: f32) -> Result<()> {
        self.write_floats(slave, address, &[float])
    }

    pub fn write_floats(&self, slave: u8, address: u16, values: &[f32]) -> Result<()> {
        let order = self.byte_order_for(slave);
        let registers: Vec<u16> = values
            .iter()
            .flat_map(|&float| value::f32_to_registers(float, order))
            .collect();
        let request = ModbusRequest::write_multiple_registers(address, &registers)?;
        self.manager.execute(slave, &request)?;
        Ok(())
    }

    pub fn read_double(&self, slave: u8, address: u16) -> Result<f64> {
        let registers = self.read_registers(slave, address, REGISTERS_PER_DOUBLE)?;
        Ok(value::registers_to_f64(&registers, self.byte_order_for(slave))?)
    }

    pub fn write_double(&self, slave: u8, address: u16, double: f64) -> Result<()> {
        let registers = value::f64_to_registers(double, self.byte_order_for(slave));
        let request = ModbusRequest::write_multiple_registers(address, &registers)?;
        self.manager.execute(slave, &request)?;
        Ok(())
    }

    /// Reads a 32-bit long from two registers.
    pub fn read_long(&self, slave: u8, address: u16, signed: bool) -> Result<i64> {
        let registers = self.read_registers(slave, address, REGISTERS_PER_FLOAT)?;
        Ok(value::registers_to_long(&registers, signed, self.byte_order_for(slave))?)
    }

    pub fn read_longs(
        &self,
        slave: u8,
        address: u16,
        register_count: u16,
        signed: bool,
    ) -> Result<Vec<i64>> {
        Self::check_value_registers(register_count, REGISTERS_PER_FLOAT)?;
        let order = self.byte_order_for(slave);
        let registers = self.read_registers(slave, address, register_count)?;
        registers
            .chunks_exact(REGISTERS_PER_FLOAT as usize)
            .map(|pair| {
                value::registers_to_long(pair, signed, order).map_err(ModbusTransportError::from)
            })
            .collect()
    }

    /// Writes a 32-bit long; `value` must fit `i32` when signed, `u32` otherwise.
    pub fn write_long(&self, slave: u8, address: u16, long: i64, signed: bool) -> Result<()> {
        let registers = value::long_to_registers(long, signed, self.byte_order_for(slave))?;
        let request = ModbusRequest::write_multiple_registers(address, &registers)?;
        self.manager.execute(slave, &request)?;
        Ok(())
    }
}
