//! ESP32-S3 firmware-specific modules for oxy-rs
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: ESP32 peripheral initialization, the bus recovery hook and the
//! embassy tasks that turn buttons and timers into queued measurement tasks.

#![no_std]

pub mod hardware;
pub mod tasks;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::Delay;

use oxy_core::async_i2c_bus::AsyncI2cDevice;
use oxy_core::dispatch::{Dispatcher, MeasurementResult, RESULT_CHANNEL_CAPACITY};
use oxy_core::sensors::{Max30102, Stc31};

/// Handle to the shared sensor bus.
pub type SensorI2c = AsyncI2cDevice<'static, hardware::RecoverableI2c>;

pub type ResultSender =
    Sender<'static, CriticalSectionRawMutex, MeasurementResult, RESULT_CHANNEL_CAPACITY>;

pub type FirmwareDispatcher =
    Dispatcher<Max30102<SensorI2c>, Stc31<SensorI2c, Delay>, ResultSender, tasks::SignalTimers>;
