//! Desktop simulator for the oxy-rs measurement engines.
//!
//! Runs the real MAX30102 and STC31 drivers, both measurement engines and
//! the task dispatcher against register-level sensor models on a simulated
//! I2C bus. Time is simulated in 10 ms steps, so a full SpO2 cycle finishes
//! instantly.
//!
//! ```text
//! RUST_LOG=debug cargo run -p oxy-simulator -- 97 4.0
//! ```
//!
//! The optional arguments are the target saturation in percent and the CO2
//! concentration in vol% the simulated sensors produce.

mod chips;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use log::{error, info};

use oxy_core::async_i2c_bus::AsyncI2cDevice;
use oxy_core::config::{Co2Settings, Spo2Calibration, Spo2Settings};
use oxy_core::dispatch::{
    Button, Dispatcher, MeasurementTask, Spo2Timers, get_result_receiver, get_result_sender,
    get_task_receiver, get_task_sender, submit,
};
use oxy_core::measurement::{Co2Engine, Spo2Engine};
use oxy_core::sensors::max30102::Max30102Config;
use oxy_core::sensors::{Max30102, Stc31};

use chips::{Max30102Model, PpgWaveform, SimulatedBus, Stc31Model};

/// Simulation step, equal to the SpO2 sampling interval.
const STEP: Duration = Duration::from_millis(10);

/// Total simulated run time.
const RUN_TIME: Duration = Duration::from_secs(12);

/// Scripted button presses.
const PRESSES: [(Duration, Button); 4] = [
    (Duration::from_millis(200), Button::Spo2),
    (Duration::from_millis(700), Button::Co2),
    // Both ignored, their measurements are still running
    (Duration::from_millis(1500), Button::Spo2),
    (Duration::from_millis(1600), Button::Co2),
];

/// Inverse of the fitted calibration curve.
fn ratio_for(spo2_percent: f64) -> f64 {
    let calibration = Spo2Calibration::FITTED_101_72;
    (f64::from(calibration.intercept) - spo2_percent) / f64::from(calibration.slope)
}

/// The STC31 driver waits its conversion latency; in simulated time that is free.
struct SimDelay;

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

#[derive(Default)]
struct TimerState {
    sampling_interval: Option<Duration>,
    next_sample: Duration,
    window_deadline: Option<Duration>,
    now: Duration,
}

/// Deadline-based stand-in for the firmware's sampling and window timers.
#[derive(Clone, Default)]
struct SimTimers(Rc<RefCell<TimerState>>);

impl SimTimers {
    /// Tasks due at `now`.
    fn poll(&self, now: Duration) -> Vec<MeasurementTask> {
        let mut state = self.0.borrow_mut();
        state.now = now;
        let mut due = Vec::new();

        if let Some(interval) = state.sampling_interval {
            while state.next_sample <= now {
                due.push(MeasurementTask::Spo2Sample);
                state.next_sample += interval;
            }
        }
        if state.window_deadline.is_some_and(|deadline| deadline <= now) {
            state.window_deadline = None;
            due.push(MeasurementTask::Spo2WindowElapsed);
        }

        due
    }
}

impl Spo2Timers for SimTimers {
    fn start(&mut self, sampling_interval: embassy_time::Duration, window: embassy_time::Duration) {
        let mut state = self.0.borrow_mut();
        let now = state.now;
        state.sampling_interval = Some(Duration::from_micros(sampling_interval.as_micros()));
        state.next_sample = now;
        state.window_deadline = Some(now + Duration::from_micros(window.as_micros()));
    }

    fn stop_sampling(&mut self) {
        self.0.borrow_mut().sampling_interval = None;
    }
}

fn parse_arg(index: usize, default: f64) -> f64 {
    std::env::args()
        .nth(index)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(default)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let target_spo2 = parse_arg(1, 97.0);
    let co2_percent = parse_arg(2, 4.0);
    info!("Starting oxy-rs simulator");
    info!(
        "Simulated subject: SpO2 {} %, CO2 {} vol%",
        target_spo2, co2_percent
    );

    let mut stc31_model = Stc31Model::new(co2_percent);
    stc31_model.drift = 0.05;
    stc31_model.stuck = true;
    let bus = Mutex::<CriticalSectionRawMutex, _>::new(SimulatedBus {
        max30102: Max30102Model::new(PpgWaveform::with_ratio(ratio_for(target_spo2))),
        stc31: stc31_model,
    });

    let calibration = Spo2Calibration::FITTED_101_72;
    let co2_settings = Co2Settings::default();
    let spo2 = Spo2Engine::new(
        Max30102::new(AsyncI2cDevice::new(&bus), Max30102Config::default()),
        Spo2Settings::with_calibration(calibration),
    );
    let co2 = Co2Engine::new(Stc31::new(AsyncI2cDevice::new(&bus), SimDelay, co2_settings));

    let timers = SimTimers::default();
    let mut dispatcher = Dispatcher::new(spo2, co2, get_result_sender(), timers.clone());
    block_on(dispatcher.init());

    let tasks = get_task_sender();
    let task_receiver = get_task_receiver();
    let results = get_result_receiver();
    let co2_tick = co2_settings.tick_interval();
    let co2_tick = Duration::from_micros(co2_tick.as_micros());

    let mut now = Duration::ZERO;
    let mut next_co2_tick = co2_tick;
    let mut published = 0usize;

    while now <= RUN_TIME {
        for (at, button) in PRESSES {
            if at == now {
                info!("[{:>6} ms] {:?} button pressed", now.as_millis(), button);
                submit(&tasks, button.task());
            }
        }

        if now >= next_co2_tick {
            submit(&tasks, MeasurementTask::Co2Tick);
            next_co2_tick += co2_tick;
        }

        for task in timers.poll(now) {
            submit(&tasks, task);
        }

        while let Ok(task) = task_receiver.try_receive() {
            block_on(dispatcher.handle(task));
        }

        while let Ok(result) = results.try_receive() {
            published += 1;
            info!(
                "[{:>6} ms] {} = {:.2} %",
                now.as_millis(),
                result.kind.label(),
                result.percent
            );
        }

        now += STEP;
    }

    match dispatcher.spo2_current_value() {
        Some(value) => info!("Final SpO2: {:.2} % (target {} %)", value, target_spo2),
        None => error!("No SpO2 value was published"),
    }
    match dispatcher.co2_current_value() {
        Some(value) => info!("Final CO2: {:.2} vol%", value),
        None => error!("No CO2 value was published"),
    }
    info!("Simulator exiting after {} published result(s)", published);
}
