//! CO2 measurement sequence
//!
//! The sensor returns the result of the conversion it had pending, so the
//! first reading after a request is stale. A request therefore takes two
//! periodic ticks: the first fetch primes the sensor and is discarded, the
//! second is published.

use log::{debug, error, info, warn};

use crate::error::SensorError;
use crate::sensors::GasSensor;
use crate::sensors::stc31::to_percentage;

const ENGINE: &str = "CO2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Co2State {
    Idle,
    /// Button pressed, nothing fetched yet.
    Requested,
    /// Priming reading taken.
    Started,
}

pub struct Co2Engine<G> {
    sensor: G,
    state: Co2State,
    current: Option<f32>,
    ready: bool,
}

impl<G: GasSensor> Co2Engine<G> {
    pub fn new(sensor: G) -> Self {
        Self {
            sensor,
            state: Co2State::Idle,
            current: None,
            ready: false,
        }
    }

    /// Initialize the sensor. On failure the engine refuses requests.
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

    pub fn state(&self) -> Co2State {
        self.state
    }

    /// Last published concentration in vol%.
    pub fn current_value(&self) -> Option<f32> {
        self.current
    }

    pub fn sensor(&self) -> &G {
        &self.sensor
    }

    /// Request a measurement. Rejected while one is already in flight.
    pub fn start(&mut self) -> Result<(), SensorError> {
        if !self.ready {
            return Err(SensorError::NotReady { sensor: ENGINE });
        }
        if self.state != Co2State::Idle {
            return Err(SensorError::StateConflict { sensor: ENGINE });
        }

        self.state = Co2State::Requested;
        debug!("{}: measurement requested", ENGINE);
        Ok(())
    }

    /// Advance the sequence by one periodic tick.
    ///
    /// Returns the concentration when this tick completed a measurement. A
    /// failed fetch leaves the state as it was, so the next tick retries the
    /// same step.
    pub async fn tick(&mut self) -> Option<f32> {
        match self.state {
            Co2State::Idle => None,
            Co2State::Requested => {
                match self.sensor.measure_raw().await {
                    Ok(raw) => {
                        debug!("{}: discarding priming reading {:#06x}", ENGINE, raw);
                        self.state = Co2State::Started;
                    }
                    Err(e) => warn!("{}: priming fetch failed, retrying: {}", ENGINE, e),
                }
                None
            }
            Co2State::Started => match self.sensor.measure_raw().await {
                Ok(raw) => {
                    let percent = to_percentage(raw);
                    info!("{}: {} vol%", ENGINE, percent);
                    self.current = Some(percent);
                    self.state = Co2State::Idle;
                    Some(percent)
                }
                Err(e) => {
                    warn!("{}: fetch failed, retrying: {}", ENGINE, e);
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::block_on;
    use alloc::collections::VecDeque;

    /// Gas sensor replaying scripted fetch results.
    struct ScriptedGas {
        results: VecDeque<Result<u16, SensorError>>,
        fetches: usize,
        fail_init: bool,
    }

    impl ScriptedGas {
        fn new(results: impl IntoIterator<Item = Result<u16, SensorError>>) -> Self {
            Self {
                results: results.into_iter().collect(),
                fetches: 0,
                fail_init: false,
            }
        }
    }

    impl GasSensor for ScriptedGas {
        async fn init(&mut self) -> Result<(), SensorError> {
            if self.fail_init {
                return Err(SensorError::NotReady { sensor: "test" });
            }
            Ok(())
        }

        async fn measure_raw(&mut self) -> Result<u16, SensorError> {
            self.fetches += 1;
            self.results.pop_front().unwrap_or(Ok(16384))
        }
    }

    fn engine(sensor: ScriptedGas) -> Co2Engine<ScriptedGas> {
        let mut engine = Co2Engine::new(sensor);
        block_on(engine.init()).unwrap();
        engine
    }

    const CHECKSUM_ERROR: SensorError = SensorError::Checksum {
        sensor: "test",
        computed: 0x92,
        received: 0x00,
    };

    #[test]
    fn test_request_takes_two_ticks() {
        let mut engine = engine(ScriptedGas::new([Ok(49152), Ok(32768)]));

        engine.start().unwrap();
        assert_eq!(engine.state(), Co2State::Requested);
        assert_eq!(engine.sensor().fetches, 0, "start does no I/O");

        assert_eq!(block_on(engine.tick()), None, "priming reading is discarded");
        assert_eq!(engine.state(), Co2State::Started);

        assert_eq!(block_on(engine.tick()), Some(50.0));
        assert_eq!(engine.state(), Co2State::Idle);
        assert_eq!(engine.current_value(), Some(50.0));

        assert_eq!(block_on(engine.tick()), None, "idle ticks do nothing");
        assert_eq!(engine.sensor().fetches, 2);
    }

    #[test]
    fn test_start_while_in_flight_is_rejected() {
        let mut engine = engine(ScriptedGas::new([]));
        engine.start().unwrap();
        block_on(engine.tick());

        assert_eq!(
            engine.start(),
            Err(SensorError::StateConflict { sensor: ENGINE })
        );
        assert_eq!(engine.state(), Co2State::Started);
    }

    #[test]
    fn test_failed_fetch_retries_same_step() {
        let mut engine = engine(ScriptedGas::new([
            Err(CHECKSUM_ERROR),
            Ok(16384),
            Err(CHECKSUM_ERROR),
            Ok(49152),
        ]));
        engine.start().unwrap();

        assert_eq!(block_on(engine.tick()), None);
        assert_eq!(engine.state(), Co2State::Requested);
        assert_eq!(block_on(engine.tick()), None);
        assert_eq!(engine.state(), Co2State::Started);

        assert_eq!(block_on(engine.tick()), None);
        assert_eq!(engine.state(), Co2State::Started);
        assert_eq!(engine.current_value(), None);

        assert_eq!(block_on(engine.tick()), Some(100.0));
        assert_eq!(engine.sensor().fetches, 4);
    }

    #[test]
    fn test_not_ready_rejects_requests() {
        let mut sensor = ScriptedGas::new([]);
        sensor.fail_init = true;
        let mut engine = Co2Engine::new(sensor);

        assert!(block_on(engine.init()).is_err());
        assert_eq!(engine.start(), Err(SensorError::NotReady { sensor: ENGINE }));
        assert_eq!(block_on(engine.tick()), None);
        assert_eq!(engine.sensor().fetches, 0);
    }
}
