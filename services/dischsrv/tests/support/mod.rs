//! Test Support Utilities
//!
//! Controller fixtures and a fake SCPI instrument on a local TCP port.

#![allow(dead_code)]

pub mod fake_instrument;

pub use fake_instrument::FakeInstrument;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dischsrv::config::SimulationConfig;
use dischsrv::core::profile::{Profile, Step, StepType, StopCondition};
use dischsrv::core::session::{Certificate, ReportError, ReportSink, SessionId};
use dischsrv::core::transport::MockTransport;
use dischsrv::runtime::reconnect::ReconnectPolicy;
use dischsrv::{ControllerSettings, DischargeController, MemoryStore};

pub const IDN: &str = "NGI,N69200,SIM0001,1.0";

/// Report sink that only records what it was asked to certify
#[derive(Debug, Default)]
pub struct RecordingReports {
    pub calls: Mutex<Vec<(SessionId, usize)>>,
}

impl RecordingReports {
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ReportSink for RecordingReports {
    async fn generate_certificate(
        &self,
        certificate: Certificate<'_>,
    ) -> Result<PathBuf, ReportError> {
        self.calls
            .lock()
            .push((certificate.summary.id, certificate.samples.len()));
        Ok(PathBuf::from(format!(
            "{}_session_{}.csv",
            certificate.summary.registration, certificate.summary.id
        )))
    }
}

pub struct Fixture {
    pub controller: DischargeController,
    pub store: Arc<MemoryStore>,
    pub reports: Arc<RecordingReports>,
}

pub fn settings(host: &str, port: u16) -> ControllerSettings {
    ControllerSettings {
        host: host.to_string(),
        port,
        io_timeout: Duration::from_secs(1),
        simulation: SimulationConfig {
            resistance_factor: 1.0,
            ..SimulationConfig::deterministic()
        },
        reconnect: ReconnectPolicy {
            enabled: true,
            interval: Duration::from_secs(5),
        },
    }
}

/// Mock that answers identification and steady current/power readings
pub fn scripted_mock() -> MockTransport {
    let mock = MockTransport::new();
    mock.set_response("*IDN?", IDN);
    mock.set_response("MEASure:CURRent?", "10.0A");
    mock.set_response("MEASure:POWer?", "4000.0W");
    mock
}

pub fn fixture(mock: &MockTransport) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let reports = Arc::new(RecordingReports::default());
    let controller = DischargeController::new(
        settings("127.0.0.1", 7000),
        Box::new(mock.clone()),
        store.clone(),
        reports.clone(),
    );
    Fixture {
        controller,
        store,
        reports,
    }
}

pub fn cc_profile(stop_voltage: f64) -> Profile {
    Profile::new(
        "CC to cutoff",
        vec![Step::new(StepType::CC, 10.0, StopCondition::Voltage, stop_voltage)],
    )
}

pub fn two_step_profile() -> Profile {
    Profile::new(
        "CC then CP",
        vec![
            Step::new(StepType::CC, 10.0, StopCondition::Voltage, 350.0),
            Step::new(StepType::CP, 2000.0, StopCondition::Voltage, 300.0),
        ],
    )
}
