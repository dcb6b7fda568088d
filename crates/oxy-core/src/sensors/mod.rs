//! Sensor codecs, drivers and the traits the measurement engines consume

pub mod max30102;
pub mod stc31;

use core::future::Future;
use embedded_hal::i2c::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::error::SensorError;

pub use max30102::Max30102;
pub use stc31::Stc31;

/// Logical LED channel of the pulse-oximetry front end.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedChannel {
    Red,
    Infrared,
}

impl LedChannel {
    pub const ALL: [Self; 2] = [Self::Red, Self::Infrared];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Infrared => 1,
        }
    }
}

/// Kind of a published measurement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    Spo2,
    Co2,
}

impl MeasurementKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Spo2 => "SpO2",
            Self::Co2 => "CO2",
        }
    }
}

/// One Red/Infrared pair read from the MAX30102 FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpgSample {
    pub red: u32,
    pub infrared: u32,
}

/// Pulse-oximetry front end as seen by the SpO2 engine.
pub trait PulseOximeter {
    /// Identify and configure the chip. LEDs are left off.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Switch the LED drivers on or off.
    fn set_power(&mut self, on: bool) -> impl Future<Output = Result<(), SensorError>>;

    /// Fetch one sample and resolve its Red and Infrared values.
    fn fetch(&mut self) -> impl Future<Output = Result<PpgSample, SensorError>>;
}

/// Gas concentration sensor as seen by the CO2 engine.
pub trait GasSensor {
    /// Identify and configure the chip.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Issue a measurement and return the validated raw ADC count.
    fn measure_raw(&mut self) -> impl Future<Output = Result<u16, SensorError>>;
}

/// One-shot bus recovery (clocking out a stuck slave) offered by the transport.
///
/// Drivers call this at most once, during initialization.
pub trait BusRecovery {
    fn recover_bus(&mut self) -> impl Future<Output = Result<(), ErrorKind>>;
}
