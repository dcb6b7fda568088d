//! Sensirion STC31 thermal-conductivity CO2 sensor
//!
//! The sensor converts on demand: a measure command starts a conversion and
//! the result can be read once the conversion latency has passed. The driver
//! waits that latency through the injected async delay.

pub mod codec;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info};

pub use codec::{
    BinaryGas, Command, build_command, build_command_with_arg, concentration_arg,
    parse_product_id, to_percentage, validate_response,
};

use super::{BusRecovery, GasSensor};
use crate::config::Co2Settings;
use crate::error::SensorError;

pub(crate) const SENSOR: &str = "STC31";

/// 7-bit I2C address.
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// Product number reported by the identifier command pair.
pub const STC31_PART_ID: u32 = 0x0801_0301;

pub struct Stc31<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    settings: Co2Settings,
    /// Last raw value that passed its checksum.
    last_raw: Option<u16>,
    ready: bool,
}

impl<I: I2c + BusRecovery, D: DelayNs> Stc31<I, D> {
    pub fn new(i2c: I, delay: D, settings: Co2Settings) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS, settings)
    }

    pub fn with_address(i2c: I, delay: D, address: u8, settings: Co2Settings) -> Self {
        Self {
            i2c,
            delay,
            address,
            settings,
            last_raw: None,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Most recent valid raw reading, untouched by failed reads.
    pub fn last_raw(&self) -> Option<u16> {
        self.last_raw
    }

    /// Give the bus and delay back.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    async fn write(&mut self, frame: &[u8], operation: &'static str) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, frame)
            .await
            .map_err(|e| {
                error!("{}: {} failed: {:?}", SENSOR, operation, e);
                SensorError::bus(SENSOR, operation, e)
            })
    }

    /// First half of the identifier read, with one bus recovery on failure.
    async fn request_product_id(&mut self) -> Result<(), SensorError> {
        let frame = build_command(Command::ReadProductIdentifier1);

        if self.write(&frame, "request product id").await.is_err() {
            info!("{}: attempting to recover the bus", SENSOR);
            self.i2c.recover_bus().await.map_err(|kind| {
                error!("{}: bus recovery failed: {:?}", SENSOR, kind);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation: "recover bus",
                    kind,
                }
            })?;
            self.write(&frame, "request product id").await.inspect_err(|_| {
                error!("{}: product identifier command failed after bus recovery", SENSOR)
            })?;
        }

        Ok(())
    }

    /// Identify the chip, select the binary gas and force-recalibrate.
    ///
    /// Any failure here is fatal for this sensor: it stays not ready.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        self.ready = false;

        self.request_product_id().await?;

        let mut response = [0u8; 2 * codec::WORD_LEN];
        self.i2c
            .write_read(
                self.address,
                &build_command(Command::ReadProductIdentifier2),
                &mut response,
            )
            .await
            .map_err(|e| {
                error!("{}: could not read product id: {:?}", SENSOR, e);
                SensorError::bus(SENSOR, "read product id", e)
            })?;

        let part_id = parse_product_id(&response)?;
        if part_id != STC31_PART_ID {
            error!("{}: got part id {:#010x}, expected {:#010x}", SENSOR, part_id, STC31_PART_ID);
            return Err(SensorError::PartIdMismatch {
                sensor: SENSOR,
                expected: STC31_PART_ID,
                found: part_id,
            });
        }

        let gas = self.settings.binary_gas;
        self.write(
            &build_command_with_arg(Command::SetBinaryGas, gas as u16),
            "set binary gas",
        )
        .await?;

        let reference = self.settings.frc_reference_percent;
        self.write(
            &build_command_with_arg(Command::ForcedRecalibration, concentration_arg(reference)),
            "forced recalibration",
        )
        .await?;

        self.ready = true;
        info!(
            "{}: ready, binary gas {:?}, recalibrated to {} vol%",
            SENSOR, gas, reference
        );

        Ok(())
    }

    /// Start a conversion, wait for it and read back the checked raw value.
    ///
    /// The value reflects the conversion the sensor had pending, which after
    /// a fresh request is the previous window.
    pub async fn measure(&mut self) -> Result<u16, SensorError> {
        if !self.ready {
            return Err(SensorError::NotReady { sensor: SENSOR });
        }

        self.write(
            &build_command(Command::MeasureGasConcentration),
            "start measurement",
        )
        .await?;

        self.delay
            .delay_ms(self.settings.conversion_latency_ms)
            .await;

        let mut response = [0u8; codec::WORD_LEN];
        self.i2c
            .read(self.address, &mut response)
            .await
            .map_err(|e| {
                error!("{}: could not fetch sample: {:?}", SENSOR, e);
                SensorError::bus(SENSOR, "fetch sample", e)
            })?;

        let raw = validate_response(&response).inspect_err(|e| {
            error!("{}: {}", SENSOR, e);
        })?;

        self.last_raw = Some(raw);
        debug!("{}: raw {:#06x} ({} vol%)", SENSOR, raw, to_percentage(raw));

        Ok(raw)
    }
}

impl<I: I2c + BusRecovery, D: DelayNs> GasSensor for Stc31<I, D> {
    async fn init(&mut self) -> Result<(), SensorError> {
        Stc31::init(self).await
    }

    async fn measure_raw(&mut self) -> Result<u16, SensorError> {
        self.measure().await
    }
}
