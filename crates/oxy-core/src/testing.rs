//! Register-level fakes of the two sensors for unit tests

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

pub use embassy_futures::block_on;

use crate::checksum::checksum;
use crate::sensors::BusRecovery;
use crate::sensors::max30102::{MODE_CFG_RESET_MASK, PART_ID, reg};
use crate::sensors::stc31::{Command, STC31_PART_ID};

const NACK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

/// Delay that returns immediately and remembers how long it was asked to wait.
#[derive(Default)]
pub struct NoopDelay {
    pub total_ns: u64,
}

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

/// MAX30102 register file with a scripted FIFO.
pub struct FakeMax30102 {
    pub regs: [u8; 256],
    pub fifo: VecDeque<Vec<u8>>,
    /// Number of upcoming transactions that fail with a NACK.
    pub fail_next: u8,
    /// Keep the reset bit set forever.
    pub stuck_reset: bool,
    pub recoveries: u32,
    pub fifo_reads: u32,
    pointer: u8,
}

impl FakeMax30102 {
    pub fn new() -> Self {
        let mut regs = [0u8; 256];
        regs[reg::PART_ID as usize] = PART_ID;
        Self {
            regs,
            fifo: VecDeque::new(),
            fail_next: 0,
            stuck_reset: false,
            recoveries: 0,
            fifo_reads: 0,
            pointer: 0,
        }
    }
}

impl ErrorType for FakeMax30102 {
    type Error = ErrorKind;
}

impl I2c for FakeMax30102 {
    async fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(NACK);
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    let Some((&register, data)) = bytes.split_first() else {
                        continue;
                    };
                    self.pointer = register;
                    for (offset, &value) in data.iter().enumerate() {
                        let target = register.wrapping_add(offset as u8);
                        let value = if target == reg::MODE_CFG && !self.stuck_reset {
                            value & !MODE_CFG_RESET_MASK
                        } else {
                            value
                        };
                        self.regs[target as usize] = value;
                    }
                }
                Operation::Read(buffer) => {
                    if self.pointer == reg::FIFO_DATA {
                        self.fifo_reads += 1;
                        let frame = self.fifo.pop_front().unwrap_or_default();
                        for (i, byte) in buffer.iter_mut().enumerate() {
                            *byte = frame.get(i).copied().unwrap_or(0);
                        }
                    } else {
                        for (i, byte) in buffer.iter_mut().enumerate() {
                            *byte = self.regs[self.pointer.wrapping_add(i as u8) as usize];
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl BusRecovery for FakeMax30102 {
    async fn recover_bus(&mut self) -> Result<(), ErrorKind> {
        self.recoveries += 1;
        Ok(())
    }
}

/// STC31 command interpreter with a settable raw reading.
pub struct FakeStc31 {
    /// Raw gas ticks returned by the next measurement.
    pub raw: u16,
    pub part_id: u32,
    /// Every write payload in order.
    pub writes: Vec<Vec<u8>>,
    /// Number of upcoming transactions that fail with a NACK.
    pub fail_next: u8,
    /// Number of upcoming reads whose CRC byte is corrupted.
    pub corrupt_next: u8,
    pub measurements: u32,
    pub recoveries: u32,
    pending: Vec<u8>,
}

impl FakeStc31 {
    pub fn new() -> Self {
        Self {
            raw: 0x4000,
            part_id: STC31_PART_ID,
            writes: Vec::new(),
            fail_next: 0,
            corrupt_next: 0,
            measurements: 0,
            recoveries: 0,
            pending: Vec::new(),
        }
    }

    fn word(value: u16) -> [u8; 3] {
        let bytes = value.to_be_bytes();
        [bytes[0], bytes[1], checksum(&bytes)]
    }

    /// Opcodes of all writes so far.
    pub fn opcodes(&self) -> Vec<u16> {
        self.writes
            .iter()
            .filter(|w| w.len() >= 2)
            .map(|w| u16::from_be_bytes([w[0], w[1]]))
            .collect()
    }
}

impl ErrorType for FakeStc31 {
    type Error = ErrorKind;
}

impl I2c for FakeStc31 {
    async fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(NACK);
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    self.writes.push(bytes.to_vec());
                    if bytes.len() < 2 {
                        continue;
                    }
                    let opcode = u16::from_be_bytes([bytes[0], bytes[1]]);
                    if opcode == Command::MeasureGasConcentration as u16 {
                        self.measurements += 1;
                        self.pending = Self::word(self.raw).to_vec();
                    } else if opcode == Command::ReadProductIdentifier2 as u16 {
                        let [hi, lo] = [(self.part_id >> 16) as u16, self.part_id as u16];
                        self.pending = Self::word(hi)
                            .iter()
                            .chain(Self::word(lo).iter())
                            .copied()
                            .collect();
                    }
                }
                Operation::Read(buffer) => {
                    for (i, byte) in buffer.iter_mut().enumerate() {
                        *byte = self.pending.get(i).copied().unwrap_or(0xFF);
                    }
                    if self.corrupt_next > 0 {
                        self.corrupt_next -= 1;
                        if let Some(last) = buffer.last_mut() {
                            *last ^= 0xFF;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl BusRecovery for FakeStc31 {
    async fn recover_bus(&mut self) -> Result<(), ErrorKind> {
        self.recoveries += 1;
        Ok(())
    }
}
