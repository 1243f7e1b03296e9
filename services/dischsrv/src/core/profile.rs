//! Discharge profiles
//!
//! A profile is an ordered list of steps. Each step drives the load in one
//! regulation mode until its stop condition is met.
//!
//! On disk profiles use a versioned raw schema ([`RawStep`]). Older files
//! carried a single `stop_voltage` field; [`migrate`] turns any raw step into
//! the current [`Step`] and is a no-op on steps it produced itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Current raw step schema version
pub const STEP_SCHEMA_VERSION: u32 = 2;

/// Stop threshold given to CV steps that predate explicit stop conditions
pub const LEGACY_CV_STOP_CURRENT: f64 = 0.1;

/// Profile errors, all detected before anything is sent to the load
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Profile '{0}' has no steps")]
    Empty(String),

    #[error("Unsupported step type '{0}'")]
    UnsupportedStepType(String),

    #[error("Unsupported stop condition '{0}'")]
    UnsupportedStopCondition(String),

    #[error("Unsupported step schema version {0}")]
    UnsupportedVersion(u32),

    #[error("Step {step}: set value {value} must be positive")]
    NonPositiveValue { step: usize, value: f64 },

    #[error("Step {step}: stop value {value} must be finite and not negative")]
    InvalidStopValue { step: usize, value: f64 },

    #[error("Profile '{0}' not found")]
    NotFound(String),

    #[error("Profile file error: {0}")]
    Io(String),

    #[error("Profile format error: {0}")]
    Format(String),
}

/// Regulation mode of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// Constant current
    CC,
    /// Constant power
    CP,
    /// Constant voltage
    CV,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::CC => "CC",
            StepType::CP => "CP",
            StepType::CV => "CV",
        }
    }

    /// Unit of the set value
    pub fn unit(&self) -> &'static str {
        match self {
            StepType::CC => "A",
            StepType::CP => "W",
            StepType::CV => "V",
        }
    }

    /// Case-insensitive parse of a step type name
    pub fn parse(raw: &str) -> Result<Self, ProfileError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CC" => Ok(StepType::CC),
            "CP" => Ok(StepType::CP),
            "CV" => Ok(StepType::CV),
            _ => Err(ProfileError::UnsupportedStepType(raw.to_string())),
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantity compared against a step's stop threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopCondition {
    Voltage,
    Current,
}

impl StopCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopCondition::Voltage => "voltage",
            StopCondition::Current => "current",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            StopCondition::Voltage => "V",
            StopCondition::Current => "A",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ProfileError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "voltage" => Ok(StopCondition::Voltage),
            "current" => Ok(StopCondition::Current),
            _ => Err(ProfileError::UnsupportedStopCondition(raw.to_string())),
        }
    }

    /// Conventional condition for a step type
    pub fn default_for(step_type: StepType) -> Self {
        match step_type {
            StepType::CV => StopCondition::Current,
            StepType::CC | StepType::CP => StopCondition::Voltage,
        }
    }
}

/// One discharge step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub step_type: StepType,
    /// Set value in the step type's unit (A, W or V)
    pub value: f64,
    pub stop_condition: StopCondition,
    /// Threshold; the step completes once the monitored value is at or below it
    pub stop_value: f64,
}

impl Step {
    pub fn new(
        step_type: StepType,
        value: f64,
        stop_condition: StopCondition,
        stop_value: f64,
    ) -> Self {
        Self {
            step_type,
            value,
            stop_condition,
            stop_value,
        }
    }

    /// Timeline label, e.g. `CC 10A -> 300V`
    pub fn label(&self) -> String {
        format!(
            "{} {}{} -> {}{}",
            self.step_type,
            self.value,
            self.step_type.unit(),
            self.stop_value,
            self.stop_condition.unit()
        )
    }

    /// Operator-facing description, e.g. `CC 10A until 300V`
    pub fn describe(&self) -> String {
        format!(
            "{} {}{} until {}{}",
            self.step_type,
            self.value,
            self.step_type.unit(),
            self.stop_value,
            self.stop_condition.unit()
        )
    }
}

/// Named, ordered list of steps
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Profile {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Check the profile can be executed
    ///
    /// A zero stop threshold is accepted; it is what legacy migration
    /// produces for CC/CP steps without a stop voltage.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.steps.is_empty() {
            return Err(ProfileError::Empty(self.name.clone()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if !step.value.is_finite() || step.value <= 0.0 {
                return Err(ProfileError::NonPositiveValue {
                    step: index,
                    value: step.value,
                });
            }
            if !step.stop_value.is_finite() || step.stop_value < 0.0 {
                return Err(ProfileError::InvalidStopValue {
                    step: index,
                    value: step.stop_value,
                });
            }
        }
        Ok(())
    }
}

/// On-disk step representation, any schema version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(rename = "type", default = "default_raw_type")]
    pub step_type: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_condition_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_condition_value: Option<f64>,
    /// Single stop field of the first schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_voltage: Option<f64>,
}

fn default_raw_type() -> String {
    "CC".to_string()
}

impl From<&Step> for RawStep {
    fn from(step: &Step) -> Self {
        Self {
            version: Some(STEP_SCHEMA_VERSION),
            step_type: step.step_type.as_str().to_string(),
            value: step.value,
            stop_condition_type: Some(step.stop_condition.as_str().to_string()),
            stop_condition_value: Some(step.stop_value),
            stop_voltage: None,
        }
    }
}

/// Convert a raw step of any schema version into a [`Step`]
///
/// Steps without an explicit stop condition get the conventional one for
/// their type: CV stops at 0.1 A, CC/CP at the legacy `stop_voltage` (or
/// 0 V when absent).
pub fn migrate(raw: &RawStep) -> Result<Step, ProfileError> {
    if let Some(version) = raw.version {
        if version > STEP_SCHEMA_VERSION {
            return Err(ProfileError::UnsupportedVersion(version));
        }
    }

    let step_type = StepType::parse(&raw.step_type)?;

    let (stop_condition, stop_value) = match raw.stop_condition_type.as_deref() {
        Some(kind) => {
            let condition = StopCondition::parse(kind)?;
            let value = raw.stop_condition_value.unwrap_or(match condition {
                StopCondition::Current => LEGACY_CV_STOP_CURRENT,
                StopCondition::Voltage => 0.0,
            });
            (condition, value)
        },
        None => match step_type {
            StepType::CV => {
                if raw.stop_voltage.is_some() {
                    warn!(
                        "Migrating legacy CV step: stop voltage replaced by {}A stop current",
                        LEGACY_CV_STOP_CURRENT
                    );
                }
                (StopCondition::Current, LEGACY_CV_STOP_CURRENT)
            },
            StepType::CC | StepType::CP => {
                (StopCondition::Voltage, raw.stop_voltage.unwrap_or(0.0))
            },
        },
    };

    Ok(Step::new(step_type, raw.value, stop_condition, stop_value))
}

/// Named profile collection backed by a JSON file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileLibrary {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileLibrary {
    /// Built-in profiles used when no file exists yet
    pub fn defaults() -> Self {
        let mut library = Self::default();
        library.insert(Profile::new(
            "Default CC",
            vec![
                Step::new(StepType::CC, 10.0, StopCondition::Voltage, 350.0),
                Step::new(StepType::CC, 5.0, StopCondition::Voltage, 300.0),
            ],
        ));
        library.insert(Profile::new(
            "Default CP",
            vec![Step::new(StepType::CP, 2000.0, StopCondition::Voltage, 320.0)],
        ));
        library.insert(Profile::new(
            "Default CV",
            vec![Step::new(StepType::CV, 380.0, StopCondition::Current, 0.5)],
        ));
        library
    }

    /// Parse a JSON document `{name: [raw steps]}`
    ///
    /// Returns the library and whether any step needed migration.
    pub fn from_json(json: &str) -> Result<(Self, bool), ProfileError> {
        let raw: BTreeMap<String, Vec<RawStep>> =
            serde_json::from_str(json).map_err(|e| ProfileError::Format(e.to_string()))?;

        let mut library = Self::default();
        let mut changed = false;
        for (name, raw_steps) in raw {
            let mut steps = Vec::with_capacity(raw_steps.len());
            for raw_step in &raw_steps {
                let step = migrate(raw_step)?;
                if RawStep::from(&step) != *raw_step {
                    info!("Migrated step in profile '{name}' to schema {STEP_SCHEMA_VERSION}");
                    changed = true;
                }
                steps.push(step);
            }
            library.insert(Profile::new(name, steps));
        }
        Ok((library, changed))
    }

    pub fn to_json(&self) -> Result<String, ProfileError> {
        let raw: BTreeMap<&str, Vec<RawStep>> = self
            .profiles
            .iter()
            .map(|(name, profile)| {
                let steps = profile.steps.iter().map(RawStep::from).collect::<Vec<_>>();
                (name.as_str(), steps)
            })
            .collect();
        serde_json::to_string_pretty(&raw).map_err(|e| ProfileError::Format(e.to_string()))
    }

    /// Load profiles, migrating old steps
    ///
    /// A missing file yields the defaults, which are written back. A file
    /// that needed migration is rewritten in the current schema.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        if !path.is_file() {
            warn!("Profiles file '{}' not found, creating defaults", path.display());
            let library = Self::defaults();
            library.save(path)?;
            return Ok(library);
        }

        let json = std::fs::read_to_string(path)
            .map_err(|e| ProfileError::Io(format!("{}: {e}", path.display())))?;
        let (library, changed) = Self::from_json(&json)?;
        info!("Loaded {} profiles from {}", library.len(), path.display());

        if changed {
            info!("Profile format updated, saving");
            library.save(path)?;
        }
        Ok(library)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProfileError::Io(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(path, self.to_json()?)
            .map_err(|e| ProfileError::Io(format!("{}: {e}", path.display())))?;
        info!("Profiles saved to {}", path.display());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Profile, ProfileError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    /// Add or replace a profile
    pub fn insert(&mut self, profile: Profile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn remove(&mut self, name: &str) -> Option<Profile> {
        self.profiles.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
