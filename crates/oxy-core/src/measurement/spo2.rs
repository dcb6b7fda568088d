//! SpO2 measurement cycle
//!
//! One cycle powers the LEDs, discards the warm-up samples, stores one
//! window of Red/Infrared pairs and turns it into a saturation value when
//! the window timer fires. The engine itself holds no timers; the dispatch
//! layer feeds it sample ticks and the window-elapsed event.

use log::{debug, error, info, warn};

use super::buffer::MeasurementBuffer;
use super::stats::{Spo2ComputeError, compute_spo2};
use crate::config::{SPO2_BUFFER_CAPACITY, Spo2Settings};
use crate::error::SensorError;
use crate::sensors::PulseOximeter;

const ENGINE: &str = "SpO2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spo2State {
    Idle,
    /// LEDs on, samples fetched and thrown away.
    Priming { discarded: u16 },
    /// Samples go into the window buffer.
    Sampling,
    Computing,
}

pub struct Spo2Engine<P> {
    sensor: P,
    settings: Spo2Settings,
    state: Spo2State,
    buffer: MeasurementBuffer<SPO2_BUFFER_CAPACITY>,
    current: Option<f32>,
    ready: bool,
}

impl<P: PulseOximeter> Spo2Engine<P> {
    pub fn new(sensor: P, settings: Spo2Settings) -> Self {
        Self {
            sensor,
            settings,
            state: Spo2State::Idle,
            buffer: MeasurementBuffer::new(),
            current: None,
            ready: false,
        }
    }

    /// Initialize the front end. On failure the engine refuses to start.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        self.ready = false;
        self.sensor.init().await.inspect_err(|e| {
            error!("{}: sensor init failed: {}", ENGINE, e);
        })?;
        self.ready = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn state(&self) -> Spo2State {
        self.state
    }

    pub fn settings(&self) -> &Spo2Settings {
        &self.settings
    }

    /// Last published saturation, `None` before the first successful cycle.
    pub fn current_value(&self) -> Option<f32> {
        self.current
    }

    /// Samples stored in the current window.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn sensor(&self) -> &P {
        &self.sensor
    }

    /// Begin a cycle: clear the window and power the LEDs.
    ///
    /// Fails with [`SensorError::StateConflict`] while a cycle is running; the
    /// running cycle is left untouched.
    pub async fn start(&mut self) -> Result<(), SensorError> {
        if !self.ready {
            return Err(SensorError::NotReady { sensor: ENGINE });
        }
        if self.state != Spo2State::Idle {
            return Err(SensorError::StateConflict { sensor: ENGINE });
        }

        self.buffer.reset();
        self.sensor.set_power(true).await?;

        self.state = if self.settings.warmup_samples == 0 {
            Spo2State::Sampling
        } else {
            Spo2State::Priming { discarded: 0 }
        };
        info!("{}: measurement started", ENGINE);

        Ok(())
    }

    /// Fetch one sample. Warm-up samples are discarded, samples past the
    /// window capacity are dropped.
    pub async fn sample_tick(&mut self) {
        if !matches!(self.state, Spo2State::Priming { .. } | Spo2State::Sampling) {
            return;
        }

        let sample = match self.sensor.fetch().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("{}: skipping sample: {}", ENGINE, e);
                return;
            }
        };

        match self.state {
            Spo2State::Priming { discarded } => {
                let discarded = discarded + 1;
                self.state = if discarded >= self.settings.warmup_samples {
                    debug!("{}: warm-up done after {} samples", ENGINE, discarded);
                    Spo2State::Sampling
                } else {
                    Spo2State::Priming { discarded }
                };
            }
            Spo2State::Sampling => {
                if !self.buffer.push(sample) {
                    debug!("{}: window full, sample dropped", ENGINE);
                }
            }
            _ => {}
        }
    }

    /// Close the window: compute, power the LEDs off and return to idle.
    ///
    /// Returns `Ok(None)` when no cycle was running. The published value only
    /// changes on success.
    pub async fn finish(&mut self) -> Result<Option<f32>, Spo2ComputeError> {
        if self.state == Spo2State::Idle {
            return Ok(None);
        }

        self.state = Spo2State::Computing;
        let result = compute_spo2(
            self.buffer.red(),
            self.buffer.infrared(),
            f64::from(self.settings.window_secs()),
            self.settings.calibration,
        );
        let samples = self.buffer.len();
        self.buffer.reset();

        if let Err(e) = self.sensor.set_power(false).await {
            error!("{}: could not power LEDs off: {}", ENGINE, e);
        }
        self.state = Spo2State::Idle;

        let estimate = result?;
        info!(
            "{}: {} % from {} samples (R = {})",
            ENGINE, estimate.percent, samples, estimate.ratio
        );
        self.current = Some(estimate.percent);

        Ok(Some(estimate.percent))
    }
}
