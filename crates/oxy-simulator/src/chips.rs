//! Register-level models of the two sensors on a simulated I2C bus

use std::f64::consts::TAU;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use log::{debug, info, warn};

use oxy_core::checksum::{checksum, verify};
use oxy_core::sensors::BusRecovery;
use oxy_core::sensors::max30102::{self, MODE_CFG_RESET_MASK, reg};
use oxy_core::sensors::stc31::{self, Command, STC31_PART_ID, codec::GAS_OFFSET, codec::GAS_SCALE};

const NACK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

/// Seconds between two MAX30102 samples at the configured 100 Hz.
const PPG_SAMPLE_PERIOD: f64 = 0.01;

/// Synthetic photoplethysmogram: DC level plus a pulse-rate sine per channel.
#[derive(Debug, Clone, Copy)]
pub struct PpgWaveform {
    pub heart_rate_bpm: f64,
    pub red_dc: f64,
    pub red_ac: f64,
    pub infrared_dc: f64,
    pub infrared_ac: f64,
    /// Counts read while the LEDs are off.
    pub ambient: u32,
}

impl PpgWaveform {
    /// Waveform whose ratio of ratios is `ratio` at 2 % infrared perfusion.
    pub fn with_ratio(ratio: f64) -> Self {
        let infrared_dc = 130_000.0;
        let red_dc = 110_000.0;
        let infrared_perfusion = 0.02;
        Self {
            heart_rate_bpm: 72.0,
            red_dc,
            red_ac: ratio * infrared_perfusion * red_dc,
            infrared_dc,
            infrared_ac: infrared_perfusion * infrared_dc,
            ambient: 180,
        }
    }

    fn sample(&self, t: f64) -> (u32, u32) {
        let phase = (TAU * self.heart_rate_bpm / 60.0 * t).sin();
        (
            (self.red_dc + self.red_ac * phase) as u32,
            (self.infrared_dc + self.infrared_ac * phase) as u32,
        )
    }
}

pub struct Max30102Model {
    regs: [u8; 256],
    pointer: u8,
    samples: u64,
    waveform: PpgWaveform,
}

impl Max30102Model {
    pub fn new(waveform: PpgWaveform) -> Self {
        let mut model = Self {
            regs: [0u8; 256],
            pointer: 0,
            samples: 0,
            waveform,
        };
        model.power_on_reset();
        model
    }

    fn power_on_reset(&mut self) {
        self.regs = [0u8; 256];
        self.regs[reg::REV_ID as usize] = 0x03;
        self.regs[reg::PART_ID as usize] = max30102::PART_ID;
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&register, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = register;

        for (offset, &value) in data.iter().enumerate() {
            let target = register.wrapping_add(offset as u8);
            if target == reg::MODE_CFG && value & MODE_CFG_RESET_MASK != 0 {
                debug!("MAX30102 model: soft reset");
                self.power_on_reset();
                continue;
            }
            self.regs[target as usize] = value;
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        if self.pointer != reg::FIFO_DATA {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = self.regs[self.pointer.wrapping_add(i as u8) as usize];
            }
            return;
        }

        let t = self.samples as f64 * PPG_SAMPLE_PERIOD;
        self.samples += 1;

        let lit = |register: u8, value: u32, ambient: u32| {
            if self.regs[register as usize] == 0 {
                ambient
            } else {
                value
            }
        };
        let (red, infrared) = self.waveform.sample(t);
        let values = [
            lit(reg::LED1_PA, red, self.waveform.ambient),
            lit(reg::LED2_PA, infrared, self.waveform.ambient),
        ];

        for (chunk, value) in buffer.chunks_mut(3).zip(values) {
            let bytes = (value & 0x3FFFF).to_be_bytes();
            chunk.copy_from_slice(&bytes[1..1 + chunk.len()]);
        }
    }
}

pub struct Stc31Model {
    /// Concentration in vol% the next conversion will report.
    pub concentration: f64,
    /// Change of the concentration per conversion.
    pub drift: f64,
    /// Transactions that NACK before the chip responds, cleared by bus recovery.
    pub stuck: bool,
    pending: Vec<u8>,
}

impl Stc31Model {
    pub fn new(concentration: f64) -> Self {
        Self {
            concentration,
            drift: 0.0,
            stuck: false,
            pending: Vec::new(),
        }
    }

    fn word(value: u16) -> [u8; 3] {
        let bytes = value.to_be_bytes();
        [bytes[0], bytes[1], checksum(&bytes)]
    }

    fn raw(&self) -> u16 {
        (GAS_OFFSET as f64 + self.concentration * GAS_SCALE as f64 / 100.0)
            .clamp(0.0, u16::MAX as f64) as u16
    }

    fn write(&mut self, bytes: &[u8]) {
        let &[hi, lo, ref argument @ ..] = bytes else {
            warn!("STC31 model: short command {:02x?}", bytes);
            return;
        };
        let opcode = u16::from_be_bytes([hi, lo]);

        if let &[msb, lsb, crc] = argument {
            if !verify([msb, lsb], crc) {
                warn!("STC31 model: bad argument checksum for {:#06x}", opcode);
                return;
            }
        }

        if opcode == Command::ReadProductIdentifier2.opcode() {
            let mut frame = Vec::with_capacity(2 * stc31::codec::WORD_LEN);
            frame.extend(Self::word((STC31_PART_ID >> 16) as u16));
            frame.extend(Self::word(STC31_PART_ID as u16));
            self.pending = frame;
        } else if opcode == Command::MeasureGasConcentration.opcode() {
            self.pending = Self::word(self.raw()).to_vec();
            self.concentration = (self.concentration + self.drift).max(0.0);
        } else if opcode == Command::SetBinaryGas.opcode() {
            debug!("STC31 model: binary gas {:02x?}", argument);
        } else if opcode == Command::ForcedRecalibration.opcode() {
            debug!("STC31 model: forced recalibration {:02x?}", argument);
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.pending.get(i).copied().unwrap_or(0xFF);
        }
    }
}

/// Both sensors behind one bus, selected by address.
pub struct SimulatedBus {
    pub max30102: Max30102Model,
    pub stc31: Stc31Model,
}

impl ErrorType for SimulatedBus {
    type Error = ErrorKind;
}

impl I2c for SimulatedBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        match address {
            max30102::DEFAULT_ADDRESS => {
                for operation in operations.iter_mut() {
                    match operation {
                        Operation::Write(bytes) => self.max30102.write(bytes),
                        Operation::Read(buffer) => self.max30102.read(buffer),
                    }
                }
                Ok(())
            }
            stc31::DEFAULT_ADDRESS => {
                if self.stc31.stuck {
                    return Err(NACK);
                }
                for operation in operations.iter_mut() {
                    match operation {
                        Operation::Write(bytes) => self.stc31.write(bytes),
                        Operation::Read(buffer) => self.stc31.read(buffer),
                    }
                }
                Ok(())
            }
            _ => Err(NACK),
        }
    }
}

impl BusRecovery for SimulatedBus {
    async fn recover_bus(&mut self) -> Result<(), ErrorKind> {
        info!("Simulated bus: clocking out stuck devices");
        self.stc31.stuck = false;
        Ok(())
    }
}
