#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use a3ot_modbus_master::SerialTransport;
use a3ot_modbus_master::crc;

/// In-memory slave that answers RTU requests the way a device on the bus would.
pub struct SimulatedSlave {
    pub address: u8,
    pub coils: Vec<bool>,
    pub discrete_inputs: Vec<bool>,
    pub holding: Vec<u16>,
    pub input: Vec<u16>,

    /// Every frame the master put on the line.
    pub requests: Vec<Vec<u8>>,
    pub write_times: Vec<Instant>,
    pub last_read_at: Option<Instant>,
    /// Writes seen while a response was still unread.
    pub overlapping_writes: usize,

    /// Never answer.
    pub silent: bool,
    /// Answer every request with this exception code.
    pub exception: Option<u8>,
    /// Flip a bit in the CRC of the next responses.
    pub corrupt_crc: bool,
    /// Put this address into responses instead of our own.
    pub reply_as: Option<u8>,
    /// Echo this function code instead of the requested one.
    pub reply_function: Option<u8>,
    /// Hand out at most this many bytes per read.
    pub chunk_size: usize,
    /// Fail reads as if the port went away.
    pub closed: bool,
    pub baud_rate: Option<u32>,

    pending: VecDeque<u8>,
}

impl SimulatedSlave {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            coils: vec![false; 0x1_0000],
            discrete_inputs: vec![false; 0x1_0000],
            holding: vec![0; 0x1_0000],
            input: vec![0; 0x1_0000],
            requests: Vec::new(),
            write_times: Vec::new(),
            last_read_at: None,
            overlapping_writes: 0,
            silent: false,
            exception: None,
            corrupt_crc: false,
            reply_as: None,
            reply_function: None,
            chunk_size: usize::MAX,
            closed: false,
            baud_rate: None,
            pending: VecDeque::new(),
        }
    }

    fn respond(&mut self, function: u8, pdu: &[u8]) {
        let mut frame = Vec::with_capacity(pdu.len() + 4);
        frame.push(self.reply_as.unwrap_or(self.address));
        frame.push(self.reply_function.unwrap_or(function));
        frame.extend_from_slice(pdu);
        let mut checksum = crc::crc16_bytes(&frame);
        if self.corrupt_crc {
            checksum[0] ^= 0x01;
        }
        frame.extend_from_slice(&checksum);
        self.pending.extend(frame);
    }

    fn respond_exception(&mut self, function: u8, code: u8) {
        let mut frame = vec![self.reply_as.unwrap_or(self.address), function | 0x80, code];
        let checksum = crc::crc16_bytes(&frame);
        frame.extend_from_slice(&checksum);
        self.pending.extend(frame);
    }

    fn handle(&mut self, frame: &[u8]) {
        if frame.len() < 4 || !crc::verify(frame) || frame[0] != self.address || self.silent {
            return;
        }

        let function = frame[1];
        let pdu = &frame[2..frame.len() - 2];
        if let Some(code) = self.exception {
            self.respond_exception(function, code);
            return;
        }

        let address = u16::from_be_bytes([pdu[0], pdu[1]]) as usize;
        let field = u16::from_be_bytes([pdu[2], pdu[3]]);
        match function {
            0x01 | 0x02 => {
                let source = if function == 0x01 { &self.coils } else { &self.discrete_inputs };
                let count = field as usize;
                let mut data = vec![0u8; count.div_ceil(8)];
                for i in 0..count {
                    if source[address + i] {
                        data[i / 8] |= 1 << (i % 8);
                    }
                }
                let mut response = vec![data.len() as u8];
                response.extend(data);
                self.respond(function, &response);
            }
            0x03 | 0x04 => {
                let source = if function == 0x03 { &self.holding } else { &self.input };
                let count = field as usize;
                let mut response = vec![(count * 2) as u8];
                for register in &source[address..address + count] {
                    response.extend_from_slice(&register.to_be_bytes());
                }
                self.respond(function, &response);
            }
            0x05 => {
                match field {
                    0xFF00 => self.coils[address] = true,
                    0x0000 => self.coils[address] = false,
                    _ => return self.respond_exception(function, 0x03),
                }
                self.respond(function, &pdu[..4]);
            }
            0x06 => {
                self.holding[address] = field;
                self.respond(function, &pdu[..4]);
            }
            0x0F => {
                let data = &pdu[5..];
                for i in 0..field as usize {
                    self.coils[address + i] = (data[i / 8] >> (i % 8)) & 0x01 == 1;
                }
                self.respond(function, &pdu[..4]);
            }
            0x10 => {
                let data = &pdu[5..];
                for i in 0..field as usize {
                    self.holding[address + i] = u16::from_be_bytes([data[2 * i], data[2 * i + 1]]);
                }
                self.respond(function, &pdu[..4]);
            }
            _ => self.respond_exception(function, 0x01),
        }
    }
}

impl SerialTransport for SimulatedSlave {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if !self.pending.is_empty() {
            self.overlapping_writes += 1;
        }
        self.requests.push(bytes.to_vec());
        self.write_times.push(Instant::now());
        self.handle(bytes);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if self.pending.is_empty() {
            thread::sleep(timeout);
            return Ok(0);
        }

        let n = buf.len().min(self.pending.len()).min(self.chunk_size);
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        self.last_read_at = Some(Instant::now());
        Ok(n)
    }

    fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }
}
