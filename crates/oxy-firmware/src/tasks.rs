//! Embassy tasks feeding the measurement task queue
//!
//! None of these tasks touch a sensor. They only enqueue work for the
//! dispatcher running in `main`.

use embassy_futures::select::{Either3, select3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_hal::gpio::Input;
use log::{debug, info, warn};

use oxy_core::config::DEBOUNCE;
use oxy_core::dispatch::{
    Button, MeasurementResult, MeasurementTask, RESULT_CHANNEL_CAPACITY, Spo2Timers, TaskSender,
    submit,
};

enum TimerCommand {
    Start { sampling: Duration, window: Duration },
    StopSampling,
}

static SPO2_TIMER_SIGNAL: Signal<CriticalSectionRawMutex, TimerCommand> = Signal::new();

/// [`Spo2Timers`] backed by [`spo2_timer_task`].
pub struct SignalTimers;

impl Spo2Timers for SignalTimers {
    fn start(&mut self, sampling_interval: Duration, window: Duration) {
        SPO2_TIMER_SIGNAL.signal(TimerCommand::Start {
            sampling: sampling_interval,
            window,
        });
    }

    fn stop_sampling(&mut self) {
        SPO2_TIMER_SIGNAL.signal(TimerCommand::StopSampling);
    }
}

/// Sampling ticker and window timer of the SpO2 cycle.
#[embassy_executor::task]
pub async fn spo2_timer_task(tasks: TaskSender<'static>) -> ! {
    loop {
        let TimerCommand::Start { sampling, window } = SPO2_TIMER_SIGNAL.wait().await else {
            continue;
        };

        debug!(
            "SpO2 timers armed: every {} ms for {} ms",
            sampling.as_millis(),
            window.as_millis()
        );
        let deadline = Instant::now() + window;
        let mut ticker = Ticker::every(sampling);
        submit(&tasks, MeasurementTask::Spo2Sample);

        loop {
            match select3(ticker.next(), Timer::at(deadline), SPO2_TIMER_SIGNAL.wait()).await {
                Either3::First(()) => {
                    submit(&tasks, MeasurementTask::Spo2Sample);
                }
                Either3::Second(()) => {
                    submit(&tasks, MeasurementTask::Spo2WindowElapsed);
                    break;
                }
                Either3::Third(TimerCommand::StopSampling) => break,
                Either3::Third(TimerCommand::Start { .. }) => {
                    warn!("SpO2 timers already running, start ignored");
                }
            }
        }
    }
}

/// Periodic CO2 tick, running from boot.
#[embassy_executor::task]
pub async fn co2_tick_task(tasks: TaskSender<'static>, interval: Duration) -> ! {
    let mut ticker = Ticker::every(interval);

    loop {
        ticker.next().await;
        submit(&tasks, MeasurementTask::Co2Tick);
    }
}

/// One front-panel button: enqueue on press, then ignore the pin for
/// [`DEBOUNCE`].
#[embassy_executor::task(pool_size = 2)]
pub async fn button_task(
    mut pin: Input<'static>,
    button: Button,
    tasks: TaskSender<'static>,
) -> ! {
    info!("{:?} button armed", button);

    loop {
        pin.wait_for_falling_edge().await;
        debug!("{:?} button pressed", button);
        submit(&tasks, button.task());
        Timer::after(DEBOUNCE).await;
    }
}

/// Log every published measurement over RTT.
#[embassy_executor::task]
pub async fn result_log_task(
    results: Receiver<'static, CriticalSectionRawMutex, MeasurementResult, RESULT_CHANNEL_CAPACITY>,
) -> ! {
    loop {
        let result = results.receive().await;
        info!("{}: {} %", result.kind.label(), result.percent);
    }
}
