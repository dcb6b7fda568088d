//! Hardware-independent core library for oxy-rs
//!
//! This crate contains all platform-agnostic logic for the oxy instrument:
//! the MAX30102 pulse-oximetry and STC31 CO2 protocol codecs and drivers,
//! the SpO2 and CO2 measurement engines, and the serialized task dispatcher
//! that the firmware and the simulator feed with button and timer events.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod async_i2c_bus;
pub mod checksum;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod measurement;
pub mod sensors;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SensorError;
