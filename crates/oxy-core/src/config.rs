//! Startup configuration for the measurement engines
//!
//! All values here are fixed once the engines are constructed. Nothing is
//! reconfigured at runtime.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::sensors::stc31::BinaryGas;

/// Interval between two SpO2 FIFO samples.
pub const SPO2_SAMPLING_INTERVAL_MS: u64 = 10;

/// Length of the stored SpO2 window.
pub const SPO2_WINDOW_SECS: u32 = 5;

/// Samples discarded while the LED output stabilizes.
pub const SPO2_WARMUP_SAMPLES: u16 = 100;

/// Samples stored per channel in one SpO2 window (5 s / 10 ms).
pub const SPO2_BUFFER_CAPACITY: usize =
    (SPO2_WINDOW_SECS as usize * 1000) / SPO2_SAMPLING_INTERVAL_MS as usize;

/// Cadence of the CO2 measurement tick.
pub const CO2_TICK_INTERVAL_MS: u64 = 1000;

/// Time the STC31 needs between the measure command and a valid read.
pub const STC31_CONVERSION_LATENCY_MS: u32 = 75;

/// Button debounce interval.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Empirical mapping from the ratio-of-ratios R to a saturation percentage:
/// `SpO2 = intercept - slope * R`.
///
/// Two pairs exist for this instrument and neither is the default. Callers
/// pick one explicitly.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Spo2Calibration {
    pub intercept: f32,
    pub slope: f32,
}

impl Spo2Calibration {
    /// Textbook linear approximation, `110 - 25 * R`.
    pub const LINEAR_110_25: Self = Self {
        intercept: 110.0,
        slope: 25.0,
    };

    /// Curve fitted against this front end, `101.72 - 6.4619 * R`.
    pub const FITTED_101_72: Self = Self {
        intercept: 101.72,
        slope: 6.4619,
    };

    #[inline]
    pub fn apply(&self, ratio: f32) -> f32 {
        self.intercept - self.slope * ratio
    }
}

/// SpO2 cycle settings.
///
/// Sampling interval and window length are fixed by [`SPO2_BUFFER_CAPACITY`]
/// and are not part of the settings. Only the warm-up count and the
/// calibration pair can be chosen.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Spo2Settings {
    pub warmup_samples: u16,
    pub calibration: Spo2Calibration,
}

impl Spo2Settings {
    /// Default warm-up with the given calibration pair.
    pub const fn with_calibration(calibration: Spo2Calibration) -> Self {
        Self {
            warmup_samples: SPO2_WARMUP_SAMPLES,
            calibration,
        }
    }

    pub const fn sampling_interval(&self) -> Duration {
        Duration::from_millis(SPO2_SAMPLING_INTERVAL_MS)
    }

    /// Window length the AC component is normalized by.
    pub const fn window_secs(&self) -> u32 {
        SPO2_WINDOW_SECS
    }

    /// One-shot timer that ends the measurement: warm-up time plus the window.
    pub const fn window_timer(&self) -> Duration {
        let warmup_ms = self.warmup_samples as u64 * SPO2_SAMPLING_INTERVAL_MS;
        Duration::from_millis(warmup_ms + SPO2_WINDOW_SECS as u64 * 1000)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Co2Settings {
    pub tick_interval_ms: u64,
    pub conversion_latency_ms: u32,
    pub binary_gas: BinaryGas,
    /// Reference concentration in vol% applied by forced recalibration,
    /// saturating at 100.
    pub frc_reference_percent: u16,
}

impl Default for Co2Settings {
    fn default() -> Self {
        Self {
            tick_interval_ms: CO2_TICK_INTERVAL_MS,
            conversion_latency_ms: STC31_CONVERSION_LATENCY_MS,
            binary_gas: BinaryGas::Co2InAir100,
            frc_reference_percent: 0,
        }
    }
}

impl Co2Settings {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
