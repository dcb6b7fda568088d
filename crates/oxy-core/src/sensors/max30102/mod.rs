//! MAX30102 pulse-oximetry front end
//!
//! The driver owns its I2C device, configures the chip once in [`Max30102::init`]
//! and afterwards only toggles the LED amplitudes and reads single FIFO
//! samples.

pub mod codec;

use embedded_hal_async::i2c::I2c;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

pub use codec::{ChannelMap, FifoValues, Slot, decode_fifo};

use super::{BusRecovery, LedChannel, PpgSample, PulseOximeter};
use crate::error::SensorError;

pub(crate) const SENSOR: &str = "MAX30102";

/// 7-bit I2C address.
pub const DEFAULT_ADDRESS: u8 = 0x57;

pub const PART_ID: u8 = 0x15;

/// Register map
pub mod reg {
    pub const INT_STS1: u8 = 0x00;
    pub const INT_STS2: u8 = 0x01;
    pub const INT_EN1: u8 = 0x02;
    pub const INT_EN2: u8 = 0x03;
    pub const FIFO_WR: u8 = 0x04;
    pub const FIFO_OVF: u8 = 0x05;
    pub const FIFO_RD: u8 = 0x06;
    pub const FIFO_DATA: u8 = 0x07;
    pub const FIFO_CFG: u8 = 0x08;
    pub const MODE_CFG: u8 = 0x09;
    pub const SPO2_CFG: u8 = 0x0A;
    pub const LED1_PA: u8 = 0x0C;
    pub const LED2_PA: u8 = 0x0D;
    pub const LED3_PA: u8 = 0x0E;
    pub const PILOT_PA: u8 = 0x10;
    pub const MULTI_LED: u8 = 0x11;
    pub const TINT: u8 = 0x1F;
    pub const TFRAC: u8 = 0x20;
    pub const TEMP_CFG: u8 = 0x21;
    pub const PROX_INT: u8 = 0x30;
    pub const REV_ID: u8 = 0xFE;
    pub const PART_ID: u8 = 0xFF;
}

pub const FIFO_CFG_SMP_AVE_SHIFT: u8 = 5;
pub const FIFO_CFG_FIFO_FULL_SHIFT: u8 = 0;
pub const FIFO_CFG_ROLLOVER_EN_MASK: u8 = 1 << 4;

pub const MODE_CFG_SHDN_MASK: u8 = 1 << 7;
pub const MODE_CFG_RESET_MASK: u8 = 1 << 6;

pub const SPO2_ADC_RGE_SHIFT: u8 = 5;
pub const SPO2_SR_SHIFT: u8 = 2;
pub const SPO2_PW_SHIFT: u8 = 0;

/// Polls of MODE_CFG before a soft reset is declared stuck.
const RESET_POLL_LIMIT: u8 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    HeartRate = 2,
    Spo2 = 3,
    MultiLed = 7,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PulseWidth {
    Bits15 = 0,
    Bits16 = 1,
    Bits17 = 2,
    Bits18 = 3,
}

/// Chip configuration written once at initialization.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Max30102Config {
    pub mode: Mode,
    /// Slot selectors, only written to the chip in multi-LED mode.
    pub slots: [Slot; codec::NUM_SLOTS],
    /// Sample averaging exponent (0 = no averaging, 5 = 32 samples).
    pub sample_average: u8,
    pub fifo_rollover: bool,
    /// FIFO almost-full threshold, 0..=15.
    pub fifo_almost_full: u8,
    /// ADC full-scale range code, 0..=3.
    pub adc_range: u8,
    /// Sample rate code, 0..=7 (1 = 100 Hz).
    pub sample_rate: u8,
    pub pulse_width: PulseWidth,
    /// LED1 (red) and LED2 (infrared) amplitude while powered on.
    pub led_amplitude: [u8; 2],
}

impl Default for Max30102Config {
    fn default() -> Self {
        Self {
            mode: Mode::Spo2,
            slots: [Slot::Red, Slot::Infrared, Slot::Disabled, Slot::Disabled],
            sample_average: 0,
            fifo_rollover: true,
            fifo_almost_full: 15,
            adc_range: 2,
            sample_rate: 1,
            pulse_width: PulseWidth::Bits18,
            led_amplitude: [0x33, 0x33],
        }
    }
}

impl Max30102Config {
    pub const fn fifo_cfg(&self) -> u8 {
        let rollover = if self.fifo_rollover {
            FIFO_CFG_ROLLOVER_EN_MASK
        } else {
            0
        };
        ((self.sample_average & 0x07) << FIFO_CFG_SMP_AVE_SHIFT)
            | rollover
            | ((self.fifo_almost_full & 0x0F) << FIFO_CFG_FIFO_FULL_SHIFT)
    }

    pub const fn spo2_cfg(&self) -> u8 {
        ((self.adc_range & 0x03) << SPO2_ADC_RGE_SHIFT)
            | ((self.sample_rate & 0x07) << SPO2_SR_SHIFT)
            | ((self.pulse_width as u8) << SPO2_PW_SHIFT)
    }

    /// Slots the chip actually uses in the configured mode.
    pub const fn effective_slots(&self) -> [Slot; codec::NUM_SLOTS] {
        match self.mode {
            Mode::HeartRate => [Slot::Red, Slot::Disabled, Slot::Disabled, Slot::Disabled],
            Mode::Spo2 => [Slot::Red, Slot::Infrared, Slot::Disabled, Slot::Disabled],
            Mode::MultiLed => self.slots,
        }
    }

    /// MULTI_LED register pair: slot 2/1 and slot 4/3.
    pub const fn multi_led_regs(&self) -> [u8; 2] {
        let s = self.slots;
        [
            ((s[1] as u8) << 4) | s[0] as u8,
            ((s[3] as u8) << 4) | s[2] as u8,
        ]
    }
}

pub struct Max30102<I> {
    i2c: I,
    address: u8,
    config: Max30102Config,
    map: ChannelMap,
    ready: bool,
}

impl<I: I2c + BusRecovery> Max30102<I> {
    pub fn new(i2c: I, config: Max30102Config) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS, config)
    }

    pub fn with_address(i2c: I, address: u8, config: Max30102Config) -> Self {
        Self {
            i2c,
            address,
            config,
            map: ChannelMap::build(&config.effective_slots()),
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    /// Give the bus back, e.g. to shut the peripheral down.
    pub fn release(self) -> I {
        self.i2c
    }

    async fn read_reg(&mut self, register: u8, operation: &'static str) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut value)
            .await
            .map_err(|e| SensorError::bus(SENSOR, operation, e))?;
        Ok(value[0])
    }

    async fn write_reg(
        &mut self,
        register: u8,
        value: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[register, value])
            .await
            .map_err(|e| {
                error!("{}: {} failed: {:?}", SENSOR, operation, e);
                SensorError::bus(SENSOR, operation, e)
            })
    }

    /// Read the part id, recovering the bus once if the first read fails.
    async fn read_part_id(&mut self) -> Result<u8, SensorError> {
        match self.read_reg(reg::PART_ID, "read part id").await {
            Ok(id) => Ok(id),
            Err(e) => {
                error!("{}: could not get part id: {}", SENSOR, e);
                info!("{}: attempting to recover the bus", SENSOR);
                self.i2c.recover_bus().await.map_err(|kind| {
                    error!("{}: bus recovery failed: {:?}", SENSOR, kind);
                    SensorError::Bus {
                        sensor: SENSOR,
                        operation: "recover bus",
                        kind,
                    }
                })?;
                self.read_reg(reg::PART_ID, "read part id").await
            }
        }
    }

    /// Identify, reset and configure the chip, then build the channel map.
    ///
    /// Any failure here is fatal for this sensor: it stays not ready.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        self.ready = false;

        let part_id = self.read_part_id().await?;
        if part_id != PART_ID {
            error!("{}: got part id {:#04x}, expected {:#04x}", SENSOR, part_id, PART_ID);
            return Err(SensorError::PartIdMismatch {
                sensor: SENSOR,
                expected: u32::from(PART_ID),
                found: u32::from(part_id),
            });
        }

        self.write_reg(reg::MODE_CFG, MODE_CFG_RESET_MASK, "soft reset")
            .await?;

        let mut polls = 0u8;
        while self.read_reg(reg::MODE_CFG, "poll reset").await? & MODE_CFG_RESET_MASK != 0 {
            polls += 1;
            if polls >= RESET_POLL_LIMIT {
                error!("{}: reset bit still set after {} polls", SENSOR, polls);
                return Err(SensorError::ResetTimeout { sensor: SENSOR });
            }
        }

        let config = self.config;
        self.write_reg(reg::FIFO_CFG, config.fifo_cfg(), "write fifo config")
            .await?;
        self.write_reg(reg::MODE_CFG, config.mode as u8, "write mode config")
            .await?;
        self.write_reg(reg::SPO2_CFG, config.spo2_cfg(), "write spo2 config")
            .await?;

        // LEDs stay dark until a measurement powers them on
        for register in [reg::LED1_PA, reg::LED2_PA, reg::LED3_PA] {
            self.write_reg(register, 0x00, "write led amplitude").await?;
        }

        if config.mode == Mode::MultiLed {
            let [slots_21, slots_43] = config.multi_led_regs();
            self.write_reg(reg::MULTI_LED, slots_21, "write multi-led slots")
                .await?;
            self.write_reg(reg::MULTI_LED + 1, slots_43, "write multi-led slots")
                .await?;
        }

        self.map = ChannelMap::build(&config.effective_slots());
        for channel in LedChannel::ALL {
            if self.map.fifo_index(channel).is_none() {
                warn!("{}: {:?} channel has no FIFO slot", SENSOR, channel);
            }
        }

        self.ready = true;
        info!(
            "{}: ready, {} active channel(s), mode {:?}",
            SENSOR,
            self.map.active_channels(),
            config.mode
        );

        Ok(())
    }

    /// Read and decode one FIFO sample.
    pub async fn read_fifo(&mut self) -> Result<FifoValues, SensorError> {
        if !self.ready {
            return Err(SensorError::NotReady { sensor: SENSOR });
        }

        let len = self.map.active_channels() * codec::BYTES_PER_CHANNEL;
        let mut buffer = [0u8; codec::MAX_BYTES_PER_SAMPLE];
        self.i2c
            .write_read(self.address, &[reg::FIFO_DATA], &mut buffer[..len])
            .await
            .map_err(|e| SensorError::bus(SENSOR, "read fifo", e))?;

        decode_fifo(&buffer[..len], self.map.active_channels())
    }

    /// Value of `channel` in a freshly read FIFO sample.
    pub async fn read_channel(&mut self, channel: LedChannel) -> Result<u32, SensorError> {
        let values = self.read_fifo().await?;
        self.map.read_channel(&values, channel)
    }
}

impl<I: I2c + BusRecovery> PulseOximeter for Max30102<I> {
    async fn init(&mut self) -> Result<(), SensorError> {
        Max30102::init(self).await
    }

    async fn set_power(&mut self, on: bool) -> Result<(), SensorError> {
        if !self.ready {
            return Err(SensorError::NotReady { sensor: SENSOR });
        }

        let [red, infrared] = if on {
            self.config.led_amplitude
        } else {
            [0x00, 0x00]
        };

        self.write_reg(reg::LED1_PA, red, "set led power").await?;
        self.write_reg(reg::LED2_PA, infrared, "set led power").await?;
        debug!("{}: LEDs {}", SENSOR, if on { "on" } else { "off" });

        Ok(())
    }

    async fn fetch(&mut self) -> Result<PpgSample, SensorError> {
        let values = self.read_fifo().await?;

        Ok(PpgSample {
            red: self.map.read_channel(&values, LedChannel::Red)?,
            infrared: self.map.read_channel(&values, LedChannel::Infrared)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMax30102, block_on};

    fn frame(red: u32, infrared: u32) -> [u8; 6] {
        [
            (red >> 16) as u8,
            (red >> 8) as u8,
            red as u8,
            (infrared >> 16) as u8,
            (infrared >> 8) as u8,
            infrared as u8,
        ]
    }

    #[test]
    fn test_config_register_values() {
        let config = Max30102Config::default();

        // avg 1, rollover, almost full 15
        assert_eq!(config.fifo_cfg(), 0b0001_1111);
        // ADC range 2, 100 Hz, 18 bit
        assert_eq!(config.spo2_cfg(), 0b0100_0111);
    }

    #[test]
    fn test_multi_led_regs() {
        let config = Max30102Config {
            mode: Mode::MultiLed,
            slots: [Slot::Infrared, Slot::Red, Slot::Disabled, Slot::Red],
            ..Default::default()
        };

        assert_eq!(config.multi_led_regs(), [0x12, 0x10]);
    }

    #[test]
    fn test_init_configures_chip() {
        let mut sensor = Max30102::new(FakeMax30102::new(), Max30102Config::default());
        block_on(sensor.init()).unwrap();

        assert!(sensor.is_ready());
        assert_eq!(sensor.channel_map().active_channels(), 2);

        let bus = sensor.release();
        assert_eq!(bus.regs[reg::MODE_CFG as usize], Mode::Spo2 as u8);
        assert_eq!(bus.regs[reg::FIFO_CFG as usize], 0b0001_1111);
        assert_eq!(bus.regs[reg::LED1_PA as usize], 0);
        assert_eq!(bus.regs[reg::LED2_PA as usize], 0);
        assert_eq!(bus.recoveries, 0);
    }

    #[test]
    fn test_init_heart_rate_mode_has_single_channel() {
        let config = Max30102Config {
            mode: Mode::HeartRate,
            ..Default::default()
        };
        let mut sensor = Max30102::new(FakeMax30102::new(), config);
        block_on(sensor.init()).unwrap();

        assert_eq!(sensor.channel_map().active_channels(), 1);
        assert_eq!(sensor.channel_map().fifo_index(LedChannel::Infrared), None);
    }

    #[test]
    fn test_init_writes_multi_led_slots() {
        let config = Max30102Config {
            mode: Mode::MultiLed,
            slots: [Slot::Infrared, Slot::Red, Slot::Disabled, Slot::Disabled],
            ..Default::default()
        };
        let mut sensor = Max30102::new(FakeMax30102::new(), config);
        block_on(sensor.init()).unwrap();

        assert_eq!(sensor.channel_map().fifo_index(LedChannel::Red), Some(1));
        let bus = sensor.release();
        assert_eq!(bus.regs[reg::MULTI_LED as usize], 0x12);
        assert_eq!(bus.regs[reg::MULTI_LED as usize + 1], 0x00);
    }

    #[test]
    fn test_init_recovers_bus_once() {
        let mut bus = FakeMax30102::new();
        bus.fail_next = 1;
        let mut sensor = Max30102::new(bus, Max30102Config::default());

        block_on(sensor.init()).unwrap();
        assert_eq!(sensor.release().recoveries, 1);
    }

    #[test]
    fn test_init_fails_after_second_bus_error() {
        let mut bus = FakeMax30102::new();
        bus.fail_next = 2;
        let mut sensor = Max30102::new(bus, Max30102Config::default());

        let result = block_on(sensor.init());
        assert!(matches!(result, Err(SensorError::Bus { .. })));
        assert!(!sensor.is_ready());
    }

    #[test]
    fn test_init_rejects_wrong_part() {
        let mut bus = FakeMax30102::new();
        bus.regs[reg::PART_ID as usize] = 0x11;
        let mut sensor = Max30102::new(bus, Max30102Config::default());

        assert_eq!(
            block_on(sensor.init()),
            Err(SensorError::PartIdMismatch {
                sensor: SENSOR,
                expected: 0x15,
                found: 0x11,
            })
        );
        assert!(!sensor.is_ready());
    }

    #[test]
    fn test_init_reset_timeout() {
        let mut bus = FakeMax30102::new();
        bus.stuck_reset = true;
        let mut sensor = Max30102::new(bus, Max30102Config::default());

        assert_eq!(
            block_on(sensor.init()),
            Err(SensorError::ResetTimeout { sensor: SENSOR })
        );
    }

    #[test]
    fn test_power_on_writes_amplitude() {
        let mut sensor = Max30102::new(FakeMax30102::new(), Max30102Config::default());
        block_on(sensor.init()).unwrap();
        block_on(sensor.set_power(true)).unwrap();

        let bus = sensor.release();
        assert_eq!(bus.regs[reg::LED1_PA as usize], 0x33);
        assert_eq!(bus.regs[reg::LED2_PA as usize], 0x33);
    }

    #[test]
    fn test_power_off_clears_amplitude() {
        let mut sensor = Max30102::new(FakeMax30102::new(), Max30102Config::default());
        block_on(sensor.init()).unwrap();
        block_on(sensor.set_power(true)).unwrap();
        block_on(sensor.set_power(false)).unwrap();

        let bus = sensor.release();
        assert_eq!(bus.regs[reg::LED1_PA as usize], 0);
        assert_eq!(bus.regs[reg::LED2_PA as usize], 0);
    }

    #[test]
    fn test_fetch_resolves_channels() {
        let mut bus = FakeMax30102::new();
        bus.fifo.push_back(frame(0x01_2345, 0x02_3456).to_vec());
        let mut sensor = Max30102::new(bus, Max30102Config::default());
        block_on(sensor.init()).unwrap();

        let sample = block_on(sensor.fetch()).unwrap();
        assert_eq!(
            sample,
            PpgSample {
                red: 0x01_2345,
                infrared: 0x02_3456,
            }
        );
    }

    #[test]
    fn test_fetch_with_gapped_multi_led_slots() {
        let config = Max30102Config {
            mode: Mode::MultiLed,
            slots: [Slot::Disabled, Slot::Infrared, Slot::Disabled, Slot::Red],
            ..Default::default()
        };
        let mut bus = FakeMax30102::new();
        // FIFO order follows the enabled slots: infrared, then red
        bus.fifo.push_back(frame(0x02_0000, 0x01_0000).to_vec());
        let mut sensor = Max30102::new(bus, config);
        block_on(sensor.init()).unwrap();

        assert_eq!(
            block_on(sensor.fetch()),
            Ok(PpgSample {
                red: 0x01_0000,
                infrared: 0x02_0000,
            }),
            "both channels must resolve to their packed FIFO positions"
        );
    }

    #[test]
    fn test_fetch_fails_on_inactive_channel() {
        let config = Max30102Config {
            mode: Mode::HeartRate,
            ..Default::default()
        };
        let mut bus = FakeMax30102::new();
        bus.fifo.push_back(alloc::vec![0x00, 0x10, 0x00]);
        let mut sensor = Max30102::new(bus, config);
        block_on(sensor.init()).unwrap();

        assert_eq!(block_on(sensor.read_channel(LedChannel::Red)), Ok(0x1000));
        assert!(matches!(
            block_on(sensor.fetch()),
            Err(SensorError::ChannelInactive {
                channel: LedChannel::Infrared,
                ..
            })
        ));
    }

    #[test]
    fn test_fetch_before_init_fails() {
        let mut sensor = Max30102::new(FakeMax30102::new(), Max30102Config::default());
        assert_eq!(
            block_on(sensor.fetch()),
            Err(SensorError::NotReady { sensor: SENSOR })
        );
    }
}
