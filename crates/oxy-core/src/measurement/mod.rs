//! Measurement engines built on top of the sensor drivers

pub mod buffer;
pub mod co2;
pub mod spo2;
pub mod stats;

pub use buffer::MeasurementBuffer;
pub use co2::{Co2Engine, Co2State};
pub use spo2::{Spo2Engine, Spo2State};
pub use stats::{ChannelStats, Spo2ComputeError, Spo2Estimate, compute_spo2};
