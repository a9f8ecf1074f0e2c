//! The byte-level serial link the transaction manager drives.

use std::io;
use std::time::Duration;

use crate::ModbusTransportError;

/// Half-duplex byte channel to the RS-485 bus.
pub trait SerialTransport: Send {
    /// Puts a complete frame on the line.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads whatever arrives within `timeout` into `buf`.
    ///
    /// `Ok(0)` and an error of kind [`io::ErrorKind::TimedOut`] both mean the
    /// line stayed quiet for the whole window.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Drops stale bytes received before a new request.
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn baud_rate(&self) -> Option<u32> {
        None
    }
}

pub(crate) fn classify_io_error(err: io::Error) -> ModbusTransportError {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => ModbusTransportError::TransportClosed,
        _ => ModbusTransportError::Transport(err),
    }
}

#[cfg(feature = "serial")]
pub use self::serial::SerialPortTransport;

#[cfg(feature = "serial")]
mod serial {
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use serialport::{ClearBuffer, SerialPort};
    use tracing::debug;

    use super::SerialTransport;
    use crate::{DataBits, ParityMode, SerialSettings, StopBits};

    impl From<ParityMode> for serialport::Parity {
        fn from(parity: ParityMode) -> Self {
            match parity {
                ParityMode::None => serialport::Parity::None,
                ParityMode::Odd => serialport::Parity::Odd,
                ParityMode::Even => serialport::Parity::Even,
            }
        }
    }

    impl From<DataBits> for serialport::DataBits {
        fn from(data_bits: DataBits) -> Self {
            match data_bits {
                DataBits::Seven => serialport::DataBits::Seven,
                DataBits::Eight => serialport::DataBits::Eight,
            }
        }
    }

    impl From<StopBits> for serialport::StopBits {
        fn from(stop_bits: StopBits) -> Self {
            match stop_bits {
                StopBits::One => serialport::StopBits::One,
                StopBits::Two => serialport::StopBits::Two,
            }
        }
    }

    /// [`SerialTransport`] over a port opened with the `serialport` crate.
    pub struct SerialPortTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialPortTransport {
        pub fn new(port: Box<dyn SerialPort>) -> Self {
            Self { port }
        }

        pub fn open(settings: &SerialSettings) -> crate::Result<Self> {
            let port = serialport::new(settings.path.as_str(), settings.baud_rate)
                .parity(settings.parity.into())
                .data_bits(settings.data_bits.into())
                .stop_bits(settings.stop_bits.into())
                .open()
                .map_err(io::Error::from)?;
            debug!(
                path = %settings.path,
                baud_rate = settings.baud_rate,
                "opened serial port"
            );
            Ok(Self::new(port))
        }

        pub fn into_inner(self) -> Box<dyn SerialPort> {
            self.port
        }
    }

    impl SerialTransport for SerialPortTransport {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.port.write_all(bytes)?;
            self.port.flush()
        }

        fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
            self.port.set_timeout(timeout).map_err(io::Error::from)?;
            match self.port.read(buf) {
                Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
                other => other,
            }
        }

        fn clear_input(&mut self) -> io::Result<()> {
            self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
        }

        fn baud_rate(&self) -> Option<u32> {
            self.port.baud_rate().ok()
        }
    }
}
