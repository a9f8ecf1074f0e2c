use a3ot_modbus_master::value::{self, ByteOrder};
use a3ot_modbus_master::ModbusUnitError;

const ALL_ORDERS: [ByteOrder; 4] = [
    ByteOrder::Big,
    ByteOrder::Little,
    ByteOrder::BigSwap,
    ByteOrder::LittleSwap,
];

#[cfg(test)]
mod bit_tests {
    use super::*;

    #[test]
    fn test_multi_coil_bit_packing() {
        // [1,0,1,1,0,0,0,0,1] should pack to [0x0D, 0x01]
        let bits = [true, false, true, true, false, false, false, false, true];
        assert_eq!(value::pack_bits(&bits), vec![0x0D, 0x01]);
    }

    #[test]
    fn test_unpack_truncates_to_count() {
        let bits = value::unpack_bits(&[0x0D, 0x01], 10).unwrap();
        assert_eq!(
            bits,
            vec![true, false, true, true, false, false, false, false, true, false]
        );

        // Padding bits set by a sloppy slave are ignored
        assert_eq!(value::unpack_bits(&[0xFF], 3).unwrap(), vec![true; 3]);
    }

    #[test]
    fn test_unpack_rejects_missing_bytes() {
        let result = value::unpack_bits(&[0x01], 9);
        assert!(matches!(
            result,
            Err(ModbusUnitError::InvalidResponseLength { expected: 2, actual: 1 })
        ));
    }
}

#[cfg(test)]
mod register_tests {
    use super::*;

    #[test]
    fn test_registers_are_big_endian() {
        assert_eq!(value::registers_to_bytes(&[0x1234, 0xABCD]), vec![0x12, 0x34, 0xAB, 0xCD]);
        assert_eq!(
            value::bytes_to_registers(&[0x12, 0x34, 0xAB, 0xCD]).unwrap(),
            vec![0x1234, 0xABCD]
        );
    }

    #[test]
    fn test_odd_byte_count_rejected() {
        let result = value::bytes_to_registers(&[0x12, 0x34, 0x56]);
        assert!(matches!(result, Err(ModbusUnitError::InvalidResponseLength { .. })));
    }

    #[test]
    fn test_signed_reinterpretation() {
        assert_eq!(value::to_signed(0xFFFF), -1);
        assert_eq!(value::to_signed(0x8000), i16::MIN);
        assert_eq!(value::to_signed(0x7FFF), i16::MAX);
        assert_eq!(value::from_signed(-2), 0xFFFE);
    }

    #[test]
    fn test_decimal_scaling() {
        assert_eq!(value::scale_register(125, 1, false).unwrap(), 12.5);
        assert_eq!(value::scale_register(0xFFFF, 2, true).unwrap(), -0.01);
        assert_eq!(value::scale_register(0xFFFF, 0, false).unwrap(), 65535.0);

        assert_eq!(value::unscale_register(12.5, 1, false).unwrap(), 125);
        assert_eq!(value::unscale_register(-0.5, 1, true).unwrap(), 0xFFFB);
    }

    #[test]
    fn test_decimal_scaling_limits() {
        assert!(matches!(
            value::unscale_register(70000.0, 0, false),
            Err(ModbusUnitError::ValueOverflow(_))
        ));
        assert!(matches!(
            value::unscale_register(-1.0, 0, false),
            Err(ModbusUnitError::ValueOverflow(_))
        ));
        assert!(matches!(
            value::unscale_register(f64::NAN, 0, false),
            Err(ModbusUnitError::ValueOverflow(_))
        ));
        assert!(matches!(
            value::scale_register(1, 11, false),
            Err(ModbusUnitError::ArgumentOutOfRange { what: "number of decimals", .. })
        ));
    }
}

#[cfg(test)]
mod word_order_tests {
    use super::*;

    #[test]
    fn test_float_layouts() {
        // 1.0 = 0x3F800000
        assert_eq!(value::f32_to_registers(1.0, ByteOrder::Big), [0x3F80, 0x0000]);
        assert_eq!(value::f32_to_registers(1.0, ByteOrder::BigSwap), [0x0000, 0x3F80]);
        assert_eq!(value::f32_to_registers(1.0, ByteOrder::Little), [0x0000, 0x803F]);
        assert_eq!(value::f32_to_registers(1.0, ByteOrder::LittleSwap), [0x803F, 0x0000]);
    }

    #[test]
    fn test_default_word_order_is_low_word_first() {
        assert_eq!(ByteOrder::default(), ByteOrder::BigSwap);
        assert_eq!(value::u32_to_registers(0x211D_1AE3, ByteOrder::default()), [0x1AE3, 0x211D]);

        // 1.0 as a low-word-first PLC puts it on the wire
        let decoded = value::registers_to_f32(&[0x0000, 0x3F80], ByteOrder::default()).unwrap();
        assert_eq!(decoded, 1.0);
    }

    #[test]
    fn test_float_round_trip_is_bit_exact() {
        for order in ALL_ORDERS {
            for input in [11.22f32, -0.0, f32::MIN_POSITIVE, f32::MAX, f32::INFINITY] {
                let registers = value::f32_to_registers(input, order);
                let output = value::registers_to_f32(&registers, order).unwrap();
                assert_eq!(output.to_bits(), input.to_bits(), "{order:?}");
            }
        }
    }

    #[test]
    fn test_float_with_opposite_word_order_differs() {
        for order in ALL_ORDERS {
            let registers = value::f32_to_registers(11.22, order);
            let misread = value::registers_to_f32(&registers, order.opposite_word_order()).unwrap();
            assert_ne!(misread, 11.22, "{order:?}");
        }
    }

    #[test]
    fn test_long_round_trip_signed_and_unsigned() {
        for order in ALL_ORDERS {
            let registers = value::long_to_registers(555_555_555, false, order).unwrap();
            assert_eq!(value::registers_to_long(&registers, false, order).unwrap(), 555_555_555);

            let registers = value::long_to_registers(-2, true, order).unwrap();
            assert_eq!(value::registers_to_long(&registers, true, order).unwrap(), -2);
            assert_eq!(
                value::registers_to_long(&registers, false, order).unwrap(),
                4_294_967_294
            );
        }
    }

    #[test]
    fn test_long_with_opposite_word_order_differs() {
        let registers = value::long_to_registers(555_555_555, false, ByteOrder::BigSwap).unwrap();
        assert_eq!(registers, [0x1AE3, 0x211D]);
        let misread = value::registers_to_long(&registers, false, ByteOrder::Big).unwrap();
        assert_ne!(misread, 555_555_555);
    }

    #[test]
    fn test_long_range_checks() {
        assert!(value::long_to_registers(u32::MAX as i64, false, ByteOrder::Big).is_ok());
        assert!(matches!(
            value::long_to_registers(-1, false, ByteOrder::Big),
            Err(ModbusUnitError::ValueOverflow(_))
        ));
        assert!(matches!(
            value::long_to_registers(i32::MAX as i64 + 1, true, ByteOrder::Big),
            Err(ModbusUnitError::ValueOverflow(_))
        ));
    }

    #[test]
    fn test_double_round_trip() {
        for order in ALL_ORDERS {
            let registers = value::f64_to_registers(-1234.5678, order);
            assert_eq!(value::registers_to_f64(&registers, order).unwrap(), -1234.5678);
        }
        assert_eq!(
            value::f64_to_registers(1.0, ByteOrder::BigSwap),
            [0x0000, 0x0000, 0x0000, 0x3FF0]
        );
    }

    #[test]
    fn test_wrong_register_count_rejected() {
        assert!(matches!(
            value::registers_to_f32(&[1, 2, 3], ByteOrder::Big),
            Err(ModbusUnitError::ArgumentOutOfRange { value: 3, min: 2, max: 2, .. })
        ));
        assert!(value::registers_to_f64(&[1, 2], ByteOrder::Big).is_err());
    }
}
