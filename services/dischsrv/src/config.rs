//! Service configuration
//!
//! Layering: built-in defaults < YAML file < `DISCHSRV_*` environment
//! (nested keys separated by `__`, e.g. `DISCHSRV_INSTRUMENT__HOST`).

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DischSrvError, Result};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/dischsrv.yaml";
/// Environment variable prefix
pub const ENV_PREFIX: &str = "DISCHSRV_";

/// Electronic load endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub host: String,
    pub port: u16,
    /// Connect and per-query deadline
    pub io_timeout_ms: u64,
    /// Size of a single socket read
    pub read_buffer: usize,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.123".to_string(),
            port: 7000,
            io_timeout_ms: 5000,
            read_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Measurement tick period
    pub tick_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Fixed delay between attempts
    pub interval_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
        }
    }
}

/// Parameters of the simulated load used in test mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_voltage: f64,
    /// Ohmic drop per amp per tick
    pub resistance_factor: f64,
    pub cv_current_start: f64,
    /// Fractional CV current decay per tick
    pub cv_current_decay: f64,
    pub cv_current_floor: f64,
    /// Fraction the CV voltage closes on its target per tick
    pub cv_settle_rate: f64,
    /// Relative noise on the regulated quantity
    pub noise: f64,
    /// Extra CC/CP voltage drop per tick, drawn from `[min, max]`
    pub drop_jitter_min: f64,
    pub drop_jitter_max: f64,
    /// Symmetric CV voltage jitter
    pub cv_jitter: f64,
    /// RNG seed; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_voltage: 400.0,
            resistance_factor: 0.01,
            cv_current_start: 5.0,
            cv_current_decay: 0.05,
            cv_current_floor: 0.01,
            cv_settle_rate: 0.1,
            noise: 0.02,
            drop_jitter_min: 0.01,
            drop_jitter_max: 0.05,
            cv_jitter: 0.05,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Noise-free model, for reproducible runs
    pub fn deterministic() -> Self {
        Self {
            noise: 0.0,
            drop_jitter_min: 0.0,
            drop_jitter_max: 0.0,
            cv_jitter: 0.0,
            seed: Some(0),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("initial_voltage", self.initial_voltage),
            ("resistance_factor", self.resistance_factor),
            ("cv_current_start", self.cv_current_start),
            ("cv_current_decay", self.cv_current_decay),
            ("cv_current_floor", self.cv_current_floor),
            ("cv_settle_rate", self.cv_settle_rate),
            ("noise", self.noise),
            ("drop_jitter_min", self.drop_jitter_min),
            ("drop_jitter_max", self.drop_jitter_max),
            ("cv_jitter", self.cv_jitter),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(DischSrvError::config(format!(
                    "simulation.{name} must be finite and not negative, got {value}"
                )));
            }
        }
        if self.drop_jitter_min > self.drop_jitter_max {
            return Err(DischSrvError::config(
                "simulation.drop_jitter_min exceeds drop_jitter_max",
            ));
        }
        if self.cv_current_decay >= 1.0 {
            return Err(DischSrvError::config(
                "simulation.cv_current_decay must be below 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub report_directory: PathBuf,
    pub profiles_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            report_directory: PathBuf::from("reports"),
            profiles_file: PathBuf::from("profiles.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily rolling log directory; console only when absent
    pub directory: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            ansi: true,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DischargeConfig {
    pub instrument: InstrumentConfig,
    pub run: RunConfig,
    pub reconnect: ReconnectConfig,
    pub simulation: SimulationConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl DischargeConfig {
    /// Load configuration from defaults, the YAML file and the environment
    ///
    /// A missing file is not an error; the defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        Self::figment(path).extract::<Self>()?.validated()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instrument.host.trim().is_empty() {
            return Err(DischSrvError::config("instrument.host cannot be empty"));
        }
        if self.instrument.port == 0 {
            return Err(DischSrvError::config("instrument.port cannot be zero"));
        }
        if self.instrument.io_timeout_ms == 0 {
            return Err(DischSrvError::config(
                "instrument.io_timeout_ms must be greater than zero",
            ));
        }
        if self.instrument.read_buffer == 0 {
            return Err(DischSrvError::config(
                "instrument.read_buffer must be greater than zero",
            ));
        }
        if self.run.tick_interval_ms == 0 {
            return Err(DischSrvError::config(
                "run.tick_interval_ms must be greater than zero",
            ));
        }
        if self.reconnect.interval_ms == 0 {
            return Err(DischSrvError::config(
                "reconnect.interval_ms must be greater than zero",
            ));
        }
        self.simulation.validate()
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.instrument.io_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.run.tick_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect.interval_ms)
    }
}
