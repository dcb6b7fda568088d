//! Hardware initialization for the oxy device
//!
//! Both sensors share I2C0. The bus is wrapped so the drivers can ask for a
//! recovery when the first transfer at startup fails.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::i2c::{ErrorType, I2c as AsyncI2c, Operation};
use esp_hal::gpio::{Input, InputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, Error as I2cError, I2c};
use esp_hal::time::Rate;
use esp_hal::Async;
use log::{info, warn};
use static_cell::StaticCell;

use oxy_core::async_i2c_bus::AsyncI2cDevice;
use oxy_core::sensors::BusRecovery;

/// Sensor bus clock.
const I2C_FREQUENCY_KHZ: u32 = 400;

/// I2C0 master that recovers by resetting and reconfiguring the peripheral.
pub struct RecoverableI2c {
    i2c: I2c<'static, Async>,
    config: I2cConfig,
}

impl ErrorType for RecoverableI2c {
    type Error = I2cError;
}

impl AsyncI2c for RecoverableI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        AsyncI2c::transaction(&mut self.i2c, address, operations).await
    }
}

impl BusRecovery for RecoverableI2c {
    async fn recover_bus(&mut self) -> Result<(), ErrorKind> {
        warn!("Resetting I2C0 after a failed transfer");
        self.i2c.apply_config(&self.config).map_err(|e| {
            warn!("I2C0 reconfiguration failed: {:?}", e);
            ErrorKind::Other
        })
    }
}

/// Create the I2C0 master on SDA GPIO12 / SCL GPIO11.
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO12<'static>,
    scl: esp_hal::peripherals::GPIO11<'static>,
) -> Result<RecoverableI2c, esp_hal::i2c::master::ConfigError> {
    let config = I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ));
    let i2c = I2c::new(i2c0, config)?
        .with_sda(sda)
        .with_scl(scl)
        .into_async();

    Ok(RecoverableI2c { i2c, config })
}

/// Put the bus behind a static mutex and hand out one device per sensor.
///
/// Returns `(max30102, stc31)` handles. Must be called once.
pub fn share_i2c_bus(
    bus: RecoverableI2c,
) -> (
    AsyncI2cDevice<'static, RecoverableI2c>,
    AsyncI2cDevice<'static, RecoverableI2c>,
) {
    static I2C0_BUS: StaticCell<AsyncMutex<CriticalSectionRawMutex, RecoverableI2c>> =
        StaticCell::new();
    let bus = I2C0_BUS.init(AsyncMutex::new(bus));

    info!("Sensor bus ready at {} kHz", I2C_FREQUENCY_KHZ);
    (AsyncI2cDevice::new(bus), AsyncI2cDevice::new(bus))
}

/// Active-low push button with the internal pull-up enabled.
pub fn button_input(pin: impl esp_hal::gpio::InputPin + 'static) -> Input<'static> {
    Input::new(pin, InputConfig::default().with_pull(Pull::Up))
}
