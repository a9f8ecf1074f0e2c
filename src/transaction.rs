use std::io;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::*;
use crate::modbus_rtu::{self, EXCEPTION_FRAME_LEN};
use crate::transport::classify_io_error;

/// Lifecycle of a single request/response exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Sending,
    AwaitingResponse,
    Validating,
    Complete,
    Failed,
}

struct Bus<T> {
    transport: T,
    last_activity: Option<Instant>,
}

impl<T: SerialTransport> Bus<T> {
    /// Keeps the line idle for `interval` after the last byte seen on it.
    fn wait_for_silence(&self, interval: Duration) {
        if let Some(last) = self.last_activity {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
    }
}

struct Transaction<'a> {
    slave: u8,
    request: &'a ModbusRequest,
    expected_len: usize,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    fn new(slave: u8, request: &'a ModbusRequest) -> Self {
        Self {
            slave,
            request,
            expected_len: modbus_rtu::predict_response_len(request),
            state: TransactionState::Idle,
        }
    }

    fn transition(&mut self, next: TransactionState) {
        trace!(
            slave = self.slave,
            function = self.request.function_code().as_u8(),
            from = ?self.state,
            to = ?next,
            "transaction state"
        );
        self.state = next;
    }
}

/// Runs request/response exchanges on one physical bus, one at a time.
///
/// The transport sits behind a mutex that is held from the first byte sent
/// until the response is validated or the transaction failed. No retries are
/// made: every call is exactly one send and one receive.
pub struct TransactionManager<T> {
    bus: Mutex<Bus<T>>,
    baud_rate: u32,
    response_timeout: Duration,
}

impl<T: SerialTransport> TransactionManager<T> {
    /// A baud rate reported by the transport wins over `baud_rate`.
    pub fn new(transport: T, baud_rate: u32, response_timeout: Duration) -> Self {
        let baud_rate = transport.baud_rate().unwrap_or(baud_rate);
        Self {
            bus: Mutex::new(Bus {
                transport,
                last_activity: None,
            }),
            baud_rate,
            response_timeout,
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Timeout for a response of `expected_len` bytes.
    pub fn timeout_for(&self, expected_len: usize) -> Duration {
        self.response_timeout + modbus_rtu::transmission_time(self.baud_rate, expected_len)
    }

    /// Runs `f` on the transport while holding the bus lock.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.bus.lock().transport)
    }

    pub fn into_transport(self) -> T {
        self.bus.into_inner().transport
    }

    pub fn execute(&self, slave: u8, request: &ModbusRequest) -> Result<ModbusResponse> {
        let payload = request.encode_payload()?;
        let frame = modbus_rtu::encode_frame(slave, request.function_code(), &payload)?;
        let mut transaction = Transaction::new(slave, request);

        let mut bus = self.bus.lock();
        let result = self.run(&mut bus, &mut transaction, &frame);
        drop(bus);

        match &result {
            Ok(_) => {
                transaction.transition(TransactionState::Complete);
                debug!(
                    slave,
                    function = request.function_code().as_u8(),
                    address = request.address(),
                    quantity = request.quantity(),
                    "modbus transaction complete"
                );
            }
            Err(err) => {
                transaction.transition(TransactionState::Failed);
                warn!(
                    slave,
                    function = request.function_code().as_u8(),
                    address = request.address(),
                    error = %err,
                    "modbus transaction failed"
                );
            }
        }
        result
    }

    fn run(
        &self,
        bus: &mut Bus<T>,
        transaction: &mut Transaction<'_>,
        frame: &[u8],
    ) -> Result<ModbusResponse> {
        transaction.transition(TransactionState::Sending);
        bus.wait_for_silence(modbus_rtu::silent_interval(self.baud_rate));
        bus.transport.clear_input().map_err(classify_io_error)?;

        trace!(slave = transaction.slave, request = ?frame, "sending modbus rtu request");
        let sent = bus.transport.write(frame);
        bus.last_activity = Some(Instant::now());
        sent.map_err(classify_io_error)?;

        transaction.transition(TransactionState::AwaitingResponse);
        let response = self.receive(bus, transaction.expected_len);
        bus.last_activity = Some(Instant::now());
        let response = response?;
        trace!(slave = transaction.slave, response = ?response, "received modbus rtu response");

        transaction.transition(TransactionState::Validating);
        let decoded = modbus_rtu::decode_frame(&response, transaction.slave)?;
        let expected = transaction.request.function_code().as_u8();
        if decoded.function != expected {
            return Err(ModbusUnitError::UnexpectedFunctionCode {
                expected,
                received: decoded.function,
            }
            .into());
        }
        Ok(transaction.request.parse_response(&decoded.payload)?)
    }

    /// Collects the response until the predicted length has arrived, or an
    /// exception frame is complete, or the deadline passes.
    fn receive(&self, bus: &mut Bus<T>, expected_len: usize) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout_for(expected_len);
        let mut response = vec![0u8; expected_len];
        let mut wanted = expected_len;
        let mut received = 0usize;

        while received < wanted {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ModbusTransportError::Timeout {
                    expected: wanted,
                    received,
                });
            }

            let n = match bus.transport.read(&mut response[received..wanted], remaining) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::TimedOut => 0,
                Err(err) => return Err(classify_io_error(err)),
            };
            received += n;

            if received >= 2 && FunctionCode::is_exception(response[1]) {
                wanted = EXCEPTION_FRAME_LEN;
            }
        }

        response.truncate(wanted);
        Ok(response)
    }
}
