//! Serialized measurement task dispatch
//!
//! Buttons and timers never touch a sensor. They only enqueue a
//! [`MeasurementTask`] on [`TASK_QUEUE`]; a single worker owns both engines
//! and runs the tasks one after another in [`Dispatcher::run`], so all sensor
//! I/O and engine state changes happen in one context.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use embassy_time::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SensorError;
use crate::measurement::{Co2Engine, Spo2Engine};
use crate::sensors::{GasSensor, MeasurementKind, PulseOximeter};

/// Queued tasks before producers start dropping.
pub const TASK_QUEUE_CAPACITY: usize = 16;

/// Published results buffered for the consumer.
pub const RESULT_CHANNEL_CAPACITY: usize = 4;

/// Work items produced by buttons and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementTask {
    Spo2Start,
    Spo2Sample,
    Spo2WindowElapsed,
    Co2Start,
    Co2Tick,
}

/// Front-panel buttons.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Spo2,
    Co2,
}

impl Button {
    pub const ALL: [Self; 2] = [Self::Spo2, Self::Co2];

    /// Task a debounced press of this button enqueues.
    pub const fn task(self) -> MeasurementTask {
        match self {
            Self::Spo2 => MeasurementTask::Spo2Start,
            Self::Co2 => MeasurementTask::Co2Start,
        }
    }
}

/// A finished measurement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MeasurementResult {
    pub kind: MeasurementKind,
    /// SpO2 saturation or CO2 volume fraction, in percent.
    pub percent: f32,
}

pub type TaskSender<'a> =
    Sender<'a, CriticalSectionRawMutex, MeasurementTask, TASK_QUEUE_CAPACITY>;
pub type TaskReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, MeasurementTask, TASK_QUEUE_CAPACITY>;

/// Global measurement task queue
pub static TASK_QUEUE: Channel<CriticalSectionRawMutex, MeasurementTask, TASK_QUEUE_CAPACITY> =
    Channel::new();

/// Global channel for published results
pub static RESULT_CHANNEL: Channel<
    CriticalSectionRawMutex,
    MeasurementResult,
    RESULT_CHANNEL_CAPACITY,
> = Channel::new();

pub fn get_task_sender() -> TaskSender<'static> {
    TASK_QUEUE.sender()
}

pub fn get_task_receiver() -> TaskReceiver<'static> {
    TASK_QUEUE.receiver()
}

pub fn get_result_sender()
-> Sender<'static, CriticalSectionRawMutex, MeasurementResult, RESULT_CHANNEL_CAPACITY> {
    RESULT_CHANNEL.sender()
}

pub fn get_result_receiver()
-> Receiver<'static, CriticalSectionRawMutex, MeasurementResult, RESULT_CHANNEL_CAPACITY> {
    RESULT_CHANNEL.receiver()
}

/// Enqueue without waiting, safe from interrupt and timer context.
///
/// Returns false when the queue was full and the task was dropped.
pub fn submit(sender: &TaskSender<'_>, task: MeasurementTask) -> bool {
    match sender.try_send(task) {
        Ok(()) => true,
        Err(TrySendError::Full(task)) => {
            warn!("Task queue full, dropping {:?}", task);
            false
        }
    }
}

/// Destination of published measurement results.
pub trait ResultSink {
    fn publish(&mut self, result: MeasurementResult);
}

impl<M: RawMutex, const N: usize> ResultSink for Sender<'_, M, MeasurementResult, N> {
    fn publish(&mut self, result: MeasurementResult) {
        if self.try_send(result).is_err() {
            warn!("Result channel full, dropping {:?}", result);
        }
    }
}

/// Sampling and window timers of the SpO2 cycle.
///
/// Implementations enqueue [`MeasurementTask::Spo2Sample`] every
/// `sampling_interval`, the first one immediately, and
/// [`MeasurementTask::Spo2WindowElapsed`] once after `window`.
pub trait Spo2Timers {
    fn start(&mut self, sampling_interval: Duration, window: Duration);

    fn stop_sampling(&mut self);
}

/// Owner of both engines; the only place sensor I/O happens.
pub struct Dispatcher<P, G, S, T> {
    spo2: Spo2Engine<P>,
    co2: Co2Engine<G>,
    sink: S,
    timers: T,
}

impl<P, G, S, T> Dispatcher<P, G, S, T>
where
    P: PulseOximeter,
    G: GasSensor,
    S: ResultSink,
    T: Spo2Timers,
{
    pub fn new(spo2: Spo2Engine<P>, co2: Co2Engine<G>, sink: S, timers: T) -> Self {
        Self {
            spo2,
            co2,
            sink,
            timers,
        }
    }

    /// Initialize both sensors. A failed sensor only disables its own
    /// measurement.
    pub async fn init(&mut self) {
        if let Err(e) = self.spo2.init().await {
            warn!("SpO2 measurements disabled: {}", e);
        }
        if let Err(e) = self.co2.init().await {
            warn!("CO2 measurements disabled: {}", e);
        }
    }

    pub fn spo2(&self) -> &Spo2Engine<P> {
        &self.spo2
    }

    pub fn co2(&self) -> &Co2Engine<G> {
        &self.co2
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn spo2_current_value(&self) -> Option<f32> {
        self.spo2.current_value()
    }

    pub fn co2_current_value(&self) -> Option<f32> {
        self.co2.current_value()
    }

    /// Run one task to completion.
    pub async fn handle(&mut self, task: MeasurementTask) {
        match task {
            MeasurementTask::Spo2Start => match self.spo2.start().await {
                Ok(()) => {
                    let settings = *self.spo2.settings();
                    self.timers
                        .start(settings.sampling_interval(), settings.window_timer());
                }
                Err(SensorError::StateConflict { .. }) => {
                    debug!("SpO2 measurement already running, ignoring start");
                }
                Err(e) => warn!("SpO2 start failed: {}", e),
            },
            MeasurementTask::Spo2Sample => self.spo2.sample_tick().await,
            MeasurementTask::Spo2WindowElapsed => {
                self.timers.stop_sampling();
                match self.spo2.finish().await {
                    Ok(Some(percent)) => self.sink.publish(MeasurementResult {
                        kind: MeasurementKind::Spo2,
                        percent,
                    }),
                    Ok(None) => {}
                    Err(e) => warn!("SpO2 measurement discarded: {}", e),
                }
            }
            MeasurementTask::Co2Start => match self.co2.start() {
                Ok(()) => {}
                Err(SensorError::StateConflict { .. }) => {
                    debug!("CO2 measurement already running, ignoring start");
                }
                Err(e) => warn!("CO2 start failed: {}", e),
            },
            MeasurementTask::Co2Tick => {
                if let Some(percent) = self.co2.tick().await {
                    self.sink.publish(MeasurementResult {
                        kind: MeasurementKind::Co2,
                        percent,
                    });
                }
            }
        }
    }

    /// Worker loop: take tasks off the queue in order, forever.
    pub async fn run(&mut self, receiver: TaskReceiver<'_>) -> ! {
        info!("Measurement dispatcher started");

        loop {
            let task = receiver.receive().await;
            self.handle(task).await;
        }
    }
}
