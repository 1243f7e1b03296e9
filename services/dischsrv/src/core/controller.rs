//! Discharge controller
//!
//! Owns the link to the load and drives one profile run at a time.
//!
//! ```text
//!            start_discharge
//!   Idle ─────────────────────► Running ◄──────► Paused
//!    ▲                           │   │  pause/resume │
//!    │        stop / last step   │   │               │
//!    └──────── Completing ◄──────┘   │               │
//!                                    ▼               ▼
//!                              Aborted (link loss, step or model fault)
//! ```
//!
//! Every abort path first sends a best-effort `INPut:STATe 0`.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::energy::EnergyAccumulator;
use super::evaluator::StepEvaluator;
use super::measurement::{
    MeasurementSource, ReadError, RealMeasurementSource, SimulatedMeasurementSource,
};
use super::profile::{Profile, Step};
use super::protocol::{CommandProtocol, Quantity, FUNCTION_QUERY, IDN_QUERY, INPUT_STATE_QUERY};
use super::session::{
    Certificate, PersistenceSink, ReportSink, Sample, SessionId, SessionMode, SessionSummary,
    StepTimeline, StepTimelineEntry, CONNECTION_LOST_COMMENT,
};
use super::transport::{ConnectionState, Transport, TransportError};
use crate::config::{DischargeConfig, SimulationConfig};
use crate::error::{DischSrvError, Result};
use crate::runtime::reconnect::{
    InterruptedRun, ReconnectPolicy, ReconnectStats, ReconnectSupervisor,
};

/// Controller run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Paused,
    /// Finalizing the session
    Completing,
    /// Last run ended on a fault
    Aborted,
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, nothing done
    Inactive,
    /// Sample logged, step still active
    Sampled,
    /// Sample logged and the next step applied
    Advanced,
    /// Sample logged and the last step finished
    Completed,
    /// Reading unusable, tick skipped
    Skipped,
    /// Run aborted on a step or model fault
    Aborted,
    /// Link lost, run aborted
    ConnectionLost,
}

/// Load state as reported by the instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentStatus {
    pub enabled: bool,
    pub function: String,
}

/// Link and timing settings used by the controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub host: String,
    pub port: u16,
    pub io_timeout: Duration,
    pub simulation: SimulationConfig,
    pub reconnect: ReconnectPolicy,
}

impl From<&DischargeConfig> for ControllerSettings {
    fn from(config: &DischargeConfig) -> Self {
        Self {
            host: config.instrument.host.clone(),
            port: config.instrument.port,
            io_timeout: config.io_timeout(),
            simulation: config.simulation.clone(),
            reconnect: ReconnectPolicy {
                enabled: config.reconnect.enabled,
                interval: config.reconnect_interval(),
            },
        }
    }
}

/// Per-session working state
#[derive(Debug)]
struct ActiveRun {
    session_id: SessionId,
    profile: Profile,
    registration: String,
    mode: SessionMode,
    comment: String,
    current_step: usize,
    baseline: Instant,
    samples: Vec<Sample>,
    timeline: StepTimeline,
    source: Box<dyn MeasurementSource>,
}

impl ActiveRun {
    fn elapsed_s(&self) -> f64 {
        Instant::now().duration_since(self.baseline).as_secs_f64()
    }

    /// End time for the open timeline entry: the last sample, else now
    fn closing_elapsed_s(&self) -> f64 {
        self.samples
            .last()
            .map(|s| s.elapsed_s)
            .unwrap_or_else(|| self.elapsed_s())
    }

    fn active_step(&self) -> Option<Step> {
        self.profile.steps.get(self.current_step).copied()
    }
}

pub struct DischargeController {
    settings: ControllerSettings,
    transport: Box<dyn Transport>,
    persistence: Arc<dyn PersistenceSink>,
    reports: Arc<dyn ReportSink>,
    connection: ConnectionState,
    test_mode: bool,
    state: ControllerState,
    run: Option<ActiveRun>,
    energy: EnergyAccumulator,
    reconnect: ReconnectSupervisor,
    last_idn: Option<String>,
    last_report: Option<PathBuf>,
}

impl DischargeController {
    pub fn new(
        settings: ControllerSettings,
        transport: Box<dyn Transport>,
        persistence: Arc<dyn PersistenceSink>,
        reports: Arc<dyn ReportSink>,
    ) -> Self {
        let reconnect = ReconnectSupervisor::new(settings.reconnect.clone());
        Self {
            settings,
            transport,
            persistence,
            reports,
            connection: ConnectionState::Disconnected,
            test_mode: false,
            state: ControllerState::Idle,
            run: None,
            energy: EnergyAccumulator::new(),
            reconnect,
            last_idn: None,
            last_report: None,
        }
    }

    // ---- accessors -------------------------------------------------------

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ControllerState::Running | ControllerState::Paused)
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Index of the active step; equals the step count once a run completed
    pub fn current_step(&self) -> Option<usize> {
        self.run.as_ref().map(|run| run.current_step)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.run.as_ref().map(|run| run.session_id)
    }

    pub fn samples(&self) -> &[Sample] {
        self.run.as_ref().map(|run| run.samples.as_slice()).unwrap_or(&[])
    }

    pub fn timeline(&self) -> &[StepTimelineEntry] {
        self.run
            .as_ref()
            .map(|run| run.timeline.entries())
            .unwrap_or(&[])
    }

    pub fn total_energy_kwh(&self) -> f64 {
        self.energy.total_kwh()
    }

    pub fn last_idn(&self) -> Option<&str> {
        self.last_idn.as_deref()
    }

    pub fn last_report(&self) -> Option<&PathBuf> {
        self.last_report.as_ref()
    }

    pub fn resume_available(&self) -> bool {
        self.reconnect.resume_available()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    pub fn reconnect_stats(&self) -> &ReconnectStats {
        self.reconnect.stats()
    }

    /// Delay of a reconnect attempt waiting to be scheduled
    pub fn take_reconnect_request(&mut self) -> Option<Duration> {
        self.reconnect.take_schedule_request()
    }

    /// One-line progress summary, e.g. `Step 1/2 - CC 10A until 350V`
    pub fn status_line(&self) -> String {
        match (&self.run, self.state) {
            (Some(run), ControllerState::Running | ControllerState::Paused) => {
                let total = run.profile.steps.len();
                let step = run
                    .active_step()
                    .map(|step| step.describe())
                    .unwrap_or_default();
                let paused = if self.state == ControllerState::Paused {
                    " (paused)"
                } else {
                    ""
                };
                format!("Step {}/{} - {step}{paused}", run.current_step + 1, total)
            },
            (_, ControllerState::Aborted) => "Aborted".to_string(),
            (_, ControllerState::Completing) => "Completing".to_string(),
            _ if self.reconnect.resume_available() => {
                "Reconnected - resume available".to_string()
            },
            _ if self.reconnect.is_pending() => "Reconnecting".to_string(),
            _ => "Idle".to_string(),
        }
    }

    // ---- link ------------------------------------------------------------

    /// Switch between the real load and the simulator
    pub async fn set_test_mode(&mut self, enabled: bool) -> Result<()> {
        if self.is_running() {
            return Err(DischSrvError::state(
                "Cannot change test mode while a discharge is running",
            ));
        }
        if enabled != self.test_mode {
            self.disconnect().await;
            self.test_mode = enabled;
            info!("Test mode {}", if enabled { "enabled" } else { "disabled" });
        }
        Ok(())
    }

    /// Connect to the load, or to the simulator in test mode
    pub async fn connect(&mut self) -> Result<()> {
        if self.test_mode {
            self.connection = ConnectionState::ConnectedTestMode;
            info!("Connected in test mode");
            return Ok(());
        }

        match self.open_link().await {
            Ok(idn) => {
                info!("Connected to {idn}");
                self.reconnect.mark_connected();
                Ok(())
            },
            Err(e) => {
                warn!("Connection failed: {e}");
                self.reconnect.schedule();
                Err(e.into())
            },
        }
    }

    /// Open the socket and identify the instrument
    async fn open_link(&mut self) -> std::result::Result<String, TransportError> {
        let timeout = self.settings.io_timeout;
        self.transport
            .connect(&self.settings.host, self.settings.port, timeout)
            .await?;

        match self.transport.query(IDN_QUERY, timeout).await {
            Ok(idn) => {
                self.connection = ConnectionState::Connected;
                self.last_idn = Some(idn.clone());
                Ok(idn)
            },
            Err(e) => {
                self.transport.close().await;
                self.connection = ConnectionState::Disconnected;
                Err(e)
            },
        }
    }

    /// Stop any run without a report, disable the output and close the link
    pub async fn disconnect(&mut self) {
        if self.is_running() {
            self.stop(false, Some("Disconnected by operator")).await;
        }
        self.reconnect.cancel();
        if self.connection == ConnectionState::Connected {
            self.output_off_best_effort().await;
            self.transport.close().await;
        }
        self.connection = ConnectionState::Disconnected;
        info!("Disconnected");
    }

    // ---- commands --------------------------------------------------------

    /// Send a command to the load; skipped in test mode
    async fn send_command(&mut self, line: &str) -> std::result::Result<(), TransportError> {
        if self.test_mode {
            debug!("[test mode] {line}");
            return Ok(());
        }
        self.transport.send(line).await
    }

    async fn output_off_best_effort(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            return;
        }
        if let Err(e) = self.send_command(&CommandProtocol::input_state(false)).await {
            warn!("Failed to disable input: {e}");
        }
    }

    // ---- run lifecycle ---------------------------------------------------

    /// Start a profile run
    pub async fn start_discharge(
        &mut self,
        profile: &Profile,
        registration: &str,
        mode: SessionMode,
        comment: &str,
    ) -> Result<SessionId> {
        self.begin_run(profile.clone(), registration, mode, comment, 0)
            .await
    }

    async fn begin_run(
        &mut self,
        profile: Profile,
        registration: &str,
        mode: SessionMode,
        comment: &str,
        first_step: usize,
    ) -> Result<SessionId> {
        if self.is_running() {
            return Err(DischSrvError::state("A discharge is already running"));
        }
        let required = match mode {
            SessionMode::Real => ConnectionState::Connected,
            SessionMode::Test => ConnectionState::ConnectedTestMode,
        };
        if self.connection != required {
            return Err(DischSrvError::state(format!(
                "{mode} discharge requires {required:?}, link is {:?}",
                self.connection
            )));
        }
        profile.validate()?;
        let registration = registration.trim().to_uppercase();
        if registration.is_empty() {
            return Err(DischSrvError::state("Registration number is required"));
        }

        let session_id = self
            .persistence
            .start_session(&registration, &profile.name, mode)
            .await?;

        let source: Box<dyn MeasurementSource> = match mode {
            SessionMode::Real => Box::new(RealMeasurementSource::new(self.settings.io_timeout)),
            SessionMode::Test => Box::new(SimulatedMeasurementSource::new(
                self.settings.simulation.clone(),
            )),
        };

        let now = Instant::now();
        self.energy.reset();
        self.energy.refresh(now);
        self.last_report = None;

        let mut timeline = StepTimeline::new();
        timeline.open(0, "Start", 0.0);
        let profile_name = profile.name.clone();
        self.run = Some(ActiveRun {
            session_id,
            profile,
            registration: registration.clone(),
            mode,
            comment: comment.to_string(),
            current_step: first_step,
            baseline: now,
            samples: Vec::new(),
            timeline,
            source,
        });

        self.state = ControllerState::Running;
        if let Err(e) = self.send_command(&CommandProtocol::input_state(true)).await {
            error!("Failed to enable input: {e}");
            self.handle_connection_loss(&e).await;
            return Err(e.into());
        }
        info!(
            "Discharge started: session {session_id}, {registration}, profile '{profile_name}' ({mode})"
        );

        self.apply_step(first_step).await?;
        Ok(session_id)
    }

    /// Program step `index` into the load, or finish the run past the end
    pub async fn apply_step(&mut self, index: usize) -> Result<()> {
        let Some(run) = self.run.as_mut() else {
            return Err(DischSrvError::state("No active run"));
        };
        run.current_step = index;

        let Some(step) = run.profile.steps.get(index).copied() else {
            info!("Profile '{}' complete", run.profile.name);
            self.stop(true, None).await;
            return Ok(());
        };

        let commands = [
            CommandProtocol::function(step.step_type),
            CommandProtocol::level(step.step_type, step.value),
        ];
        for command in &commands {
            if let Err(e) = self.send_command(command).await {
                error!("Failed to apply step {}: {e}", index + 1);
                self.handle_connection_loss(&e).await;
                return Err(e.into());
            }
        }

        if let Some(run) = self.run.as_mut() {
            run.source.on_step_applied(&step);
            let at = run.elapsed_s();
            run.timeline.open(index + 1, step.label(), at);
            info!(
                "Step {}/{}: {}",
                index + 1,
                run.profile.steps.len(),
                step.describe()
            );
        }
        Ok(())
    }

    /// Take one measurement and advance the profile if the step is done
    pub async fn tick(&mut self) -> TickOutcome {
        if self.state != ControllerState::Running {
            return TickOutcome::Inactive;
        }
        let Some(run) = self.run.as_mut() else {
            return TickOutcome::Inactive;
        };
        let Some(step) = run.active_step() else {
            return TickOutcome::Inactive;
        };

        let reading = match run.source.read(self.transport.as_mut(), &step).await {
            Ok(reading) => reading,
            Err(ReadError::Parse { quantity, source }) => {
                warn!("Skipping tick, unparseable {quantity:?} reading: {source}");
                return TickOutcome::Skipped;
            },
            Err(ReadError::Simulation(reason)) => {
                error!("Simulation failure: {reason}");
                self.abort_run(&format!("Aborted: simulation failure: {reason}"))
                    .await;
                return TickOutcome::Aborted;
            },
            Err(ReadError::Transport(e)) => {
                self.handle_connection_loss(&e).await;
                return TickOutcome::ConnectionLost;
            },
        };

        let now = Instant::now();
        let elapsed_s = now.duration_since(run.baseline).as_secs_f64();
        self.energy.record(reading.power, now);

        let sample = Sample {
            session_id: run.session_id,
            timestamp: Utc::now(),
            elapsed_s,
            voltage: reading.voltage,
            current: reading.current,
            power: reading.power,
        };
        run.samples.push(sample.clone());
        let monitored = run.source.monitored_value(&reading, step.stop_condition);
        let index = run.current_step;

        if let Err(e) = self.persistence.log_sample(&sample).await {
            warn!("Failed to log sample: {e}");
        }

        if !StepEvaluator::is_step_complete(&step, monitored) {
            return TickOutcome::Sampled;
        }

        info!(
            "Step {} complete: {} {monitored:.3} <= {}",
            index + 1,
            step.stop_condition.as_str(),
            step.stop_value
        );
        if self.apply_step(index + 1).await.is_err() {
            return match self.connection {
                ConnectionState::Disconnected => TickOutcome::ConnectionLost,
                _ => TickOutcome::Aborted,
            };
        }
        if self.is_running() {
            TickOutcome::Advanced
        } else {
            TickOutcome::Completed
        }
    }

    pub async fn pause(&mut self) -> Result<()> {
        if self.state != ControllerState::Running {
            return Err(DischSrvError::state("Discharge is not running"));
        }
        if let Err(e) = self.send_command(&CommandProtocol::input_state(false)).await {
            self.handle_connection_loss(&e).await;
            return Err(e.into());
        }
        self.state = ControllerState::Paused;
        info!("Discharge paused");
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<()> {
        if self.state != ControllerState::Paused {
            return Err(DischSrvError::state("Discharge is not paused"));
        }
        if let Err(e) = self.send_command(&CommandProtocol::input_state(true)).await {
            self.handle_connection_loss(&e).await;
            return Err(e.into());
        }
        // The paused interval must not count as one tick
        self.energy.refresh(Instant::now());
        self.state = ControllerState::Running;
        info!("Discharge resumed");
        Ok(())
    }

    /// Finish the run
    ///
    /// `comment` overrides the one given at start. Returns the certificate
    /// path when one was generated. No-op unless running.
    pub async fn stop(&mut self, generate_report: bool, comment: Option<&str>) -> Option<PathBuf> {
        if !self.is_running() {
            return None;
        }
        self.state = ControllerState::Completing;
        info!("Stopping discharge");

        if let Some(run) = self.run.as_mut() {
            let end = run.closing_elapsed_s();
            run.timeline.close(end);
            if let Some(comment) = comment {
                run.comment = comment.to_string();
            }
        }
        self.output_off_best_effort().await;

        let Some(run) = self.run.as_ref() else {
            self.state = ControllerState::Idle;
            return None;
        };
        let session_id = run.session_id;
        let total = self.energy.total_kwh();
        if let Err(e) = self
            .persistence
            .finish_session(session_id, total, &run.comment)
            .await
        {
            warn!("Failed to finish session {session_id}: {e}");
        }
        info!("Session {session_id} finished: {total:.4} kWh");

        let report = if generate_report && !run.samples.is_empty() {
            self.generate_report().await
        } else {
            None
        };
        self.state = ControllerState::Idle;
        report
    }

    async fn generate_report(&mut self) -> Option<PathBuf> {
        let run = self.run.as_ref()?;

        let (samples, summary) = match self.persistence.get_session_data(run.session_id).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Session data unavailable ({e}), reporting from memory");
                (run.samples.clone(), self.summary_from_memory(run))
            },
        };

        let certificate = Certificate {
            summary: &summary,
            samples: &samples,
            profile: &run.profile,
            timeline: run.timeline.entries(),
            instrument_idn: self.last_idn.as_deref(),
        };
        match self.reports.generate_certificate(certificate).await {
            Ok(path) => {
                info!("Certificate saved to {}", path.display());
                self.last_report = Some(path.clone());
                Some(path)
            },
            Err(e) => {
                error!("Failed certificate generation: {e}");
                None
            },
        }
    }

    fn summary_from_memory(&self, run: &ActiveRun) -> SessionSummary {
        let now = Utc::now();
        let start = chrono::Duration::from_std(Instant::now().duration_since(run.baseline))
            .map(|elapsed| now - elapsed)
            .unwrap_or(now);
        SessionSummary {
            id: run.session_id,
            registration: run.registration.clone(),
            profile_name: run.profile.name.clone(),
            mode: run.mode,
            start_time: start,
            end_time: Some(now),
            total_energy_kwh: self.energy.total_kwh(),
            comment: run.comment.clone(),
        }
    }

    /// Fault exit: output off, session closed with `comment`, no report
    async fn abort_run(&mut self, comment: &str) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let end = run.closing_elapsed_s();
        run.timeline.close(end);
        let session_id = run.session_id;

        self.output_off_best_effort().await;

        let total = self.energy.total_kwh();
        if let Err(e) = self
            .persistence
            .finish_session(session_id, total, comment)
            .await
        {
            warn!("Failed to finish session {session_id}: {e}");
        }
        self.state = ControllerState::Aborted;
        error!("Session {session_id} aborted: {comment}");
    }

    async fn drop_link(&mut self) {
        self.transport.close().await;
        self.connection = ConnectionState::Disconnected;
        if !self.test_mode {
            self.reconnect.schedule();
        }
    }

    /// Abort the run as incomplete and start reconnecting
    ///
    /// Every transport error on a live link lands here, whether it came from
    /// a reading or a command.
    async fn handle_connection_loss(&mut self, error: &TransportError) {
        if self.test_mode {
            return;
        }
        error!("Connection lost: {error}");

        if self.is_running() {
            if let Some(run) = self.run.as_ref() {
                self.reconnect.set_interrupted(InterruptedRun {
                    profile: run.profile.clone(),
                    registration: run.registration.clone(),
                    mode: run.mode,
                    step_index: run.current_step,
                    comment: run.comment.clone(),
                });
            }
            self.abort_run(CONNECTION_LOST_COMMENT).await;
        }
        self.drop_link().await;
    }

    // ---- reconnect -------------------------------------------------------

    /// One reconnect attempt; returns whether the link is up
    pub async fn attempt_reconnect(&mut self) -> bool {
        if self.connection == ConnectionState::Connected {
            self.reconnect.mark_connected();
            return true;
        }
        self.reconnect.begin_attempt();
        match self.open_link().await {
            Ok(idn) => {
                info!("Reconnected to {idn}");
                self.reconnect.record_success();
                true
            },
            Err(e) => {
                self.reconnect.record_failure(&e.to_string());
                false
            },
        }
    }

    /// Continue an interrupted run after the operator confirmed it
    ///
    /// Opens a new session starting at the interrupted step, with its own
    /// elapsed baseline and energy total.
    pub async fn resume_after_reconnect(&mut self) -> Result<SessionId> {
        if self.is_running() {
            return Err(DischSrvError::state("A discharge is already running"));
        }
        if self.connection != ConnectionState::Connected {
            return Err(DischSrvError::state("Instrument is not connected"));
        }
        let Some(interrupted) = self.reconnect.take_resume() else {
            return Err(DischSrvError::state("Nothing to resume"));
        };
        info!(
            "Resuming '{}' for {} at step {}",
            interrupted.profile.name,
            interrupted.registration,
            interrupted.step_index + 1
        );
        self.begin_run(
            interrupted.profile,
            &interrupted.registration,
            interrupted.mode,
            &interrupted.comment,
            interrupted.step_index,
        )
        .await
    }

    /// Drop the resume offer
    pub fn decline_resume(&mut self) {
        self.reconnect.discard_resume();
    }

    /// Stop reconnecting and drop any resume offer
    pub fn cancel_reconnect(&mut self) {
        self.reconnect.cancel();
    }

    // ---- instrument queries ---------------------------------------------

    /// Current output state and regulation function
    pub async fn poll_status(&mut self) -> Result<InstrumentStatus> {
        match self.connection {
            ConnectionState::Disconnected => {
                Err(DischSrvError::state("Instrument is not connected"))
            },
            ConnectionState::ConnectedTestMode => Ok(InstrumentStatus {
                enabled: self.state == ControllerState::Running,
                function: self
                    .run
                    .as_ref()
                    .filter(|_| self.is_running())
                    .and_then(ActiveRun::active_step)
                    .map(|step| step.step_type.to_string())
                    .unwrap_or_else(|| "CC".to_string()),
            }),
            ConnectionState::Connected => {
                let timeout = self.settings.io_timeout;
                let state = self.query_or_lose(INPUT_STATE_QUERY, timeout).await?;
                let function = self.query_or_lose(FUNCTION_QUERY, timeout).await?;
                Ok(InstrumentStatus {
                    enabled: CommandProtocol::parse_input_state(&state)?,
                    function: CommandProtocol::parse_function_code(&function)?,
                })
            },
        }
    }

    async fn query_or_lose(&mut self, line: &str, timeout: Duration) -> Result<String> {
        match self.transport.query(line, timeout).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.handle_connection_loss(&e).await;
                Err(e.into())
            },
        }
    }

    /// Identification, one reading of each quantity and the output state
    pub async fn verify_instrument(&mut self) -> Result<Vec<(String, String)>> {
        if self.test_mode {
            return Err(DischSrvError::state(
                "In test mode; real instrument not queried",
            ));
        }
        if self.is_running() {
            return Err(DischSrvError::state(
                "Cannot verify while a discharge is running",
            ));
        }
        if self.connection != ConnectionState::Connected {
            self.connect().await?;
        }

        let timeout = self.settings.io_timeout;
        let queries = [
            IDN_QUERY,
            Quantity::Voltage.query(),
            Quantity::Current.query(),
            Quantity::Power.query(),
            INPUT_STATE_QUERY,
        ];
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let response = self.query_or_lose(query, timeout).await?;
            results.push((query.to_string(), response));
        }
        Ok(results)
    }
}
