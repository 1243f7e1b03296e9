//! Measurement acquisition
//!
//! The controller picks one [`MeasurementSource`] when a session starts:
//! the real load queried over SCPI, or a simulated load for test mode.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::profile::{Step, StepType, StopCondition};
use super::protocol::{CommandProtocol, ParseError, Quantity};
use super::transport::{Transport, TransportError};
use crate::config::SimulationConfig;

/// One V/I/P sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The link failed; treated as connection loss
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A reply could not be parsed; the tick is skipped
    #[error("Unparseable {quantity:?} reply: {source}")]
    Parse {
        quantity: Quantity,
        source: ParseError,
    },

    /// The simulated model diverged
    #[error("Simulation failure: {0}")]
    Simulation(String),
}

#[async_trait]
pub trait MeasurementSource: Send + Sync + fmt::Debug {
    /// Take one reading while `step` is active
    async fn read(&mut self, link: &mut dyn Transport, step: &Step) -> Result<Reading, ReadError>;

    /// Called after `step` has been applied to the load
    fn on_step_applied(&mut self, _step: &Step) {}

    /// Value compared against the step's stop threshold
    fn monitored_value(&self, reading: &Reading, condition: StopCondition) -> f64 {
        match condition {
            StopCondition::Voltage => reading.voltage,
            StopCondition::Current => reading.current,
        }
    }
}

/// Queries the instrument for voltage, current and power
#[derive(Debug)]
pub struct RealMeasurementSource {
    io_timeout: Duration,
}

impl RealMeasurementSource {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    async fn measure(
        &self,
        link: &mut dyn Transport,
        quantity: Quantity,
    ) -> Result<f64, ReadError> {
        let response = link
            .query(CommandProtocol::measure(quantity), self.io_timeout)
            .await?;
        CommandProtocol::parse_number(&response).map_err(|source| ReadError::Parse { quantity, source })
    }
}

#[async_trait]
impl MeasurementSource for RealMeasurementSource {
    async fn read(&mut self, link: &mut dyn Transport, _step: &Step) -> Result<Reading, ReadError> {
        let voltage = self.measure(link, Quantity::Voltage).await?;
        let current = self.measure(link, Quantity::Current).await?;
        let power = self.measure(link, Quantity::Power).await?;
        Ok(Reading {
            voltage,
            current,
            power,
        })
    }
}

/// Battery-like load model driven by the active step
///
/// Readings carry noise; stop conditions see the noise-free model.
#[derive(Debug)]
pub struct SimulatedMeasurementSource {
    config: SimulationConfig,
    rng: StdRng,
    voltage: f64,
    cv_current: f64,
    /// Noise-free current of the last tick
    model_current: f64,
}

impl SimulatedMeasurementSource {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            voltage: config.initial_voltage,
            cv_current: config.cv_current_start,
            model_current: 0.0,
            config,
            rng,
        }
    }

    /// Current model voltage
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.rng.gen_range(low..=high)
        } else {
            low
        }
    }

    fn noisy(&mut self, value: f64) -> f64 {
        let noise = self.config.noise;
        value * (1.0 + self.uniform(-noise, noise))
    }

    fn drop_jitter(&mut self) -> f64 {
        self.uniform(self.config.drop_jitter_min, self.config.drop_jitter_max)
    }

    fn advance(&mut self, step: &Step) -> Result<Reading, ReadError> {
        let resistance = self.config.resistance_factor;
        let target = step.value;

        let (mut current, mut power) = match step.step_type {
            StepType::CC => {
                let current = self.noisy(target);
                self.voltage -= current * resistance + self.drop_jitter();
                self.model_current = target;
                (current, self.voltage * current)
            },
            StepType::CP => {
                let power = self.noisy(target);
                let current = if self.voltage > 1.0 {
                    power / self.voltage
                } else {
                    0.0
                };
                self.voltage -= current * resistance * 0.5 + self.drop_jitter();
                self.model_current = if self.voltage > 1.0 {
                    target / self.voltage
                } else {
                    0.0
                };
                (current, power)
            },
            StepType::CV => {
                let jitter = self.config.cv_jitter;
                let settle = (target - self.voltage) * self.config.cv_settle_rate;
                self.voltage += settle + self.uniform(-jitter, jitter);
                self.cv_current = (self.cv_current * (1.0 - self.config.cv_current_decay))
                    .max(self.config.cv_current_floor);
                self.model_current = self.cv_current;
                let current = self.noisy(self.cv_current);
                (current, self.voltage * current)
            },
        };

        // Clamping would hide a diverged model
        if ![self.voltage, current, power, self.model_current]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ReadError::Simulation(format!(
                "non-finite model state V={} I={current} P={power}",
                self.voltage
            )));
        }

        self.voltage = self.voltage.max(0.0);
        if self.voltage < 1.0 {
            current = 0.0;
            power = 0.0;
            self.model_current = 0.0;
        }

        Ok(Reading {
            voltage: self.voltage,
            current,
            power,
        })
    }
}

#[async_trait]
impl MeasurementSource for SimulatedMeasurementSource {
    async fn read(&mut self, _link: &mut dyn Transport, step: &Step) -> Result<Reading, ReadError> {
        let reading = self.advance(step)?;
        debug!(
            "Simulated V={:.2} I={:.3} P={:.1}",
            reading.voltage, reading.current, reading.power
        );
        Ok(reading)
    }

    fn on_step_applied(&mut self, step: &Step) {
        if step.step_type == StepType::CV {
            self.cv_current = self.config.cv_current_start;
        }
    }

    fn monitored_value(&self, _reading: &Reading, condition: StopCondition) -> f64 {
        match condition {
            StopCondition::Voltage => self.voltage,
            StopCondition::Current => self.model_current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockTransport;

    const T: Duration = Duration::from_secs(1);

    fn cc(value: f64) -> Step {
        Step::new(StepType::CC, value, StopCondition::Voltage, 300.0)
    }

    async fn connected_mock() -> MockTransport {
        let mut mock = MockTransport::new();
        mock.connect("mock", 7000, T).await.unwrap();
        mock
    }

    #[tokio::test]
    async fn test_real_source_reads_three_quantities() {
        let mut mock = connected_mock().await;
        mock.set_response("MEASure:VOLTage?", "399.5V");
        mock.set_response("MEASure:CURRent?", "10.02A");
        mock.set_response("MEASure:POWer?", "4002.99W");

        let mut source = RealMeasurementSource::new(T);
        let reading = source.read(&mut mock, &cc(10.0)).await.unwrap();
        assert_eq!(reading.voltage, 399.5);
        assert_eq!(reading.current, 10.02);
        assert_eq!(reading.power, 4002.99);
        assert_eq!(source.monitored_value(&reading, StopCondition::Current), 10.02);
    }

    #[tokio::test]
    async fn test_real_source_parse_failure_is_distinct() {
        let mut mock = connected_mock().await;
        mock.set_response("MEASure:VOLTage?", "399.5");
        mock.set_response("MEASure:CURRent?", "abc");
        mock.set_response("MEASure:POWer?", "0");

        let mut source = RealMeasurementSource::new(T);
        let err = source.read(&mut mock, &cc(10.0)).await.unwrap_err();
        assert!(matches!(
            err,
            ReadError::Parse {
                quantity: Quantity::Current,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_real_source_transport_failure() {
        let mut mock = connected_mock().await;
        mock.fail_next(TransportError::Reset("gone".to_string()));

        let mut source = RealMeasurementSource::new(T);
        let err = source.read(&mut mock, &cc(10.0)).await.unwrap_err();
        assert_eq!(err, ReadError::Transport(TransportError::Reset("gone".to_string())));
    }

    #[tokio::test]
    async fn test_simulated_cc_drops_by_ir() {
        let mut link = MockTransport::new();
        let mut source = SimulatedMeasurementSource::new(SimulationConfig {
            resistance_factor: 1.0,
            ..SimulationConfig::deterministic()
        });

        let reading = source.read(&mut link, &cc(10.0)).await.unwrap();
        assert_eq!(reading.voltage, 390.0);
        assert_eq!(reading.current, 10.0);
        assert_eq!(reading.power, 3900.0);
        assert_eq!(source.monitored_value(&reading, StopCondition::Voltage), 390.0);
    }

    #[tokio::test]
    async fn test_simulated_cp_holds_power() {
        let mut link = MockTransport::new();
        let mut source = SimulatedMeasurementSource::new(SimulationConfig::deterministic());
        let step = Step::new(StepType::CP, 2000.0, StopCondition::Voltage, 320.0);

        let reading = source.read(&mut link, &step).await.unwrap();
        assert_eq!(reading.power, 2000.0);
        assert_eq!(reading.current, 5.0);
        assert!(reading.voltage < 400.0);
    }

    #[tokio::test]
    async fn test_simulated_cv_current_decays_and_rearms() {
        let mut link = MockTransport::new();
        let mut source = SimulatedMeasurementSource::new(SimulationConfig {
            cv_current_decay: 0.5,
            ..SimulationConfig::deterministic()
        });
        let step = Step::new(StepType::CV, 380.0, StopCondition::Current, 0.5);
        source.on_step_applied(&step);

        let first = source.read(&mut link, &step).await.unwrap();
        assert_eq!(first.current, 2.5);
        assert_eq!(first.voltage, 398.0);
        let second = source.read(&mut link, &step).await.unwrap();
        assert_eq!(second.current, 1.25);
        assert_eq!(source.monitored_value(&second, StopCondition::Current), 1.25);

        source.on_step_applied(&step);
        let rearmed = source.read(&mut link, &step).await.unwrap();
        assert_eq!(rearmed.current, 2.5);
    }

    #[tokio::test]
    async fn test_simulated_cv_current_floor() {
        let mut link = MockTransport::new();
        let mut source = SimulatedMeasurementSource::new(SimulationConfig {
            cv_current_decay: 0.9,
            ..SimulationConfig::deterministic()
        });
        let step = Step::new(StepType::CV, 380.0, StopCondition::Current, 0.0);
        for _ in 0..10 {
            source.read(&mut link, &step).await.unwrap();
        }
        let reading = source.read(&mut link, &step).await.unwrap();
        assert_eq!(reading.current, 0.01);
    }

    #[tokio::test]
    async fn test_simulated_flat_battery_draws_nothing() {
        let mut link = MockTransport::new();
        let mut source = SimulatedMeasurementSource::new(SimulationConfig {
            initial_voltage: 5.0,
            resistance_factor: 1.0,
            ..SimulationConfig::deterministic()
        });

        let reading = source.read(&mut link, &cc(10.0)).await.unwrap();
        assert_eq!(reading.voltage, 0.0);
        assert_eq!(reading.current, 0.0);
        assert_eq!(reading.power, 0.0);
    }

    #[tokio::test]
    async fn test_simulated_non_finite_state_fails() {
        let mut link = MockTransport::new();
        let mut source = SimulatedMeasurementSource::new(SimulationConfig::deterministic());
        let runaway = Step::new(StepType::CC, f64::INFINITY, StopCondition::Voltage, 0.0);

        let err = source.read(&mut link, &runaway).await.unwrap_err();
        assert!(matches!(err, ReadError::Simulation(_)));
    }

    #[tokio::test]
    async fn test_seeded_noise_is_reproducible() {
        let config = SimulationConfig {
            seed: Some(42),
            ..SimulationConfig::default()
        };
        let mut link = MockTransport::new();
        let mut a = SimulatedMeasurementSource::new(config.clone());
        let mut b = SimulatedMeasurementSource::new(config);

        for _ in 0..5 {
            let ra = a.read(&mut link, &cc(10.0)).await.unwrap();
            let rb = b.read(&mut link, &cc(10.0)).await.unwrap();
            assert_eq!(ra, rb);
            assert!((ra.current - 10.0).abs() <= 0.2 + 1e-9);
        }
    }
}
