//! Session data model and the storage/report collaborator contracts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::profile::Profile;

/// Assigned by the persistence sink, strictly increasing
pub type SessionId = u64;

/// Comment recorded when the link drops mid-run
pub const CONNECTION_LOST_COMMENT: &str = "Connection Lost - Incomplete";

/// Whether a session drove the real load or the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    Real,
    Test,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Real => f.write_str("REAL"),
            SessionMode::Test => f.write_str("TEST"),
        }
    }
}

/// One logged measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    /// Seconds since the session baseline, never decreasing
    pub elapsed_s: f64,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

/// Session row as stored by the persistence sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub registration: String,
    pub profile_name: String,
    pub mode: SessionMode,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_energy_kwh: f64,
    pub comment: String,
}

/// When a step ran, in session elapsed seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTimelineEntry {
    /// 0 is the "Start" marker; profile step `i` is entry `i + 1`
    pub step_index: usize,
    pub label: String,
    pub start_s: f64,
    pub end_s: Option<f64>,
}

/// Ordered timeline with at most one open entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepTimeline {
    entries: Vec<StepTimelineEntry>,
}

impl StepTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the open entry at `at_s` and open a new one there
    pub fn open(&mut self, step_index: usize, label: impl Into<String>, at_s: f64) {
        self.close(at_s);
        self.entries.push(StepTimelineEntry {
            step_index,
            label: label.into(),
            start_s: at_s,
            end_s: None,
        });
    }

    /// Close the open entry, if any
    pub fn close(&mut self, at_s: f64) {
        if let Some(entry) = self.entries.last_mut() {
            if entry.end_s.is_none() {
                entry.end_s = Some(at_s.max(entry.start_s));
            }
        }
    }

    pub fn current(&self) -> Option<&StepTimelineEntry> {
        self.entries.last().filter(|entry| entry.end_s.is_none())
    }

    pub fn entries(&self) -> &[StepTimelineEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Min / average / max of one quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Spread {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl Spread {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }
        (count > 0).then(|| Spread {
            min,
            avg: sum / count as f64,
            max,
        })
    }
}

/// Report statistics over a session's samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionStats {
    pub start_voltage: f64,
    pub end_voltage: f64,
    pub duration_s: f64,
    pub voltage: Spread,
    pub current: Spread,
    pub power: Spread,
}

impl SessionStats {
    /// `None` when there are no samples
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        let first = samples.first()?;
        let last = samples.last()?;
        Some(Self {
            start_voltage: first.voltage,
            end_voltage: last.voltage,
            duration_s: last.elapsed_s,
            voltage: Spread::of(samples.iter().map(|s| s.voltage))?,
            current: Spread::of(samples.iter().map(|s| s.current))?,
            power: Spread::of(samples.iter().map(|s| s.power))?,
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Session {0} already finished")]
    AlreadyFinished(SessionId),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("Session {0} has no samples")]
    NoSamples(SessionId),

    #[error("Report I/O error: {0}")]
    Io(String),

    #[error("Report format error: {0}")]
    Format(String),
}

/// Session store
///
/// Failures are logged by the controller and never stop a run, except when
/// creating the session.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn start_session(
        &self,
        registration: &str,
        profile_name: &str,
        mode: SessionMode,
    ) -> Result<SessionId, PersistenceError>;

    async fn log_sample(&self, sample: &Sample) -> Result<(), PersistenceError>;

    async fn finish_session(
        &self,
        id: SessionId,
        total_energy_kwh: f64,
        comment: &str,
    ) -> Result<(), PersistenceError>;

    async fn get_session_data(
        &self,
        id: SessionId,
    ) -> Result<(Vec<Sample>, SessionSummary), PersistenceError>;
}

/// Everything a certificate is built from
#[derive(Debug, Clone, Copy)]
pub struct Certificate<'a> {
    pub summary: &'a SessionSummary,
    pub samples: &'a [Sample],
    pub profile: &'a Profile,
    pub timeline: &'a [StepTimelineEntry],
    pub instrument_idn: Option<&'a str>,
}

/// Certificate generator, called once per finished session that asked for one
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn generate_certificate(
        &self,
        certificate: Certificate<'_>,
    ) -> Result<PathBuf, ReportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(elapsed_s: f64, voltage: f64, current: f64) -> Sample {
        Sample {
            session_id: 1,
            timestamp: Utc::now(),
            elapsed_s,
            voltage,
            current,
            power: voltage * current,
        }
    }

    #[test]
    fn test_timeline_keeps_one_open_entry() {
        let mut timeline = StepTimeline::new();
        timeline.open(0, "Start", 0.0);
        timeline.open(1, "CC 10A -> 350V", 0.0);
        timeline.open(2, "CC 5A -> 300V", 42.0);

        let entries = timeline.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].end_s, Some(0.0));
        assert_eq!(entries[1].end_s, Some(42.0));
        assert_eq!(timeline.current().map(|e| e.step_index), Some(2));

        timeline.close(50.0);
        timeline.close(60.0);
        assert!(timeline.current().is_none());
        assert_eq!(timeline.entries()[2].end_s, Some(50.0));
    }

    #[test]
    fn test_session_stats() {
        assert!(SessionStats::from_samples(&[]).is_none());

        let samples = [
            sample(1.0, 400.0, 10.0),
            sample(2.0, 350.0, 10.0),
            sample(3.0, 300.0, 4.0),
        ];
        let stats = SessionStats::from_samples(&samples).unwrap();
        assert_eq!(stats.start_voltage, 400.0);
        assert_eq!(stats.end_voltage, 300.0);
        assert_eq!(stats.duration_s, 3.0);
        assert_eq!(stats.voltage.min, 300.0);
        assert_eq!(stats.voltage.avg, 350.0);
        assert_eq!(stats.current.max, 10.0);
        assert_eq!(stats.power.min, 1200.0);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(SessionMode::Test.to_string(), "TEST");
        assert_eq!(SessionMode::Real.to_string(), "REAL");
    }
}
