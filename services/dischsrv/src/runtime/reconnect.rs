//! Reconnection supervision
//!
//! Fixed-interval, unlimited reconnect attempts after a link loss. The
//! supervisor never sleeps itself: it raises a schedule request that the
//! service turns into a deferred task on its scheduler, so attempts never
//! overlap a tick.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::profile::Profile;
use crate::core::session::SessionMode;

/// Reconnection policy configuration
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Whether lost links are retried at all
    pub enabled: bool,
    /// Delay before every attempt
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(5),
        }
    }
}

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// Link up or no loss being handled
    Idle,
    /// An attempt is waiting on the scheduler
    Scheduled,
    /// An attempt is in flight
    Attempting,
}

/// Reconnection statistics tracking
#[derive(Debug, Default, Clone)]
pub struct ReconnectStats {
    pub total_attempts: u64,
    pub successful_reconnects: u64,
    pub failed_reconnects: u64,
    pub last_attempt: Option<Instant>,
    pub last_connected: Option<Instant>,
}

/// Run that was cut short by a link loss
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptedRun {
    pub profile: Profile,
    pub registration: String,
    pub mode: SessionMode,
    /// Step that was active when the link dropped
    pub step_index: usize,
    pub comment: String,
}

#[derive(Debug)]
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
    state: ReconnectState,
    stats: ReconnectStats,
    /// Delay of an attempt not yet handed to the scheduler
    request: Option<Duration>,
    interrupted: Option<InterruptedRun>,
    resume_available: bool,
}

impl ReconnectSupervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ReconnectState::Idle,
            stats: ReconnectStats::default(),
            request: None,
            interrupted: None,
            resume_available: false,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn stats(&self) -> &ReconnectStats {
        &self.stats
    }

    /// Whether an attempt is scheduled or running
    pub fn is_pending(&self) -> bool {
        self.state != ReconnectState::Idle
    }

    /// Request an attempt after the configured interval
    ///
    /// Returns `false` when auto-reconnect is disabled. A second call while
    /// an attempt is outstanding is ignored.
    pub fn schedule(&mut self) -> bool {
        if !self.policy.enabled {
            debug!("Auto-reconnect disabled, not scheduling");
            return false;
        }
        if self.state != ReconnectState::Idle {
            return true;
        }
        self.state = ReconnectState::Scheduled;
        self.request = Some(self.policy.interval);
        info!("Reconnect scheduled in {:?}", self.policy.interval);
        true
    }

    /// Hand the pending request to the scheduler
    pub fn take_schedule_request(&mut self) -> Option<Duration> {
        self.request.take()
    }

    /// Remember the run to offer for resume once the link is back
    pub fn set_interrupted(&mut self, run: InterruptedRun) {
        self.interrupted = Some(run);
        self.resume_available = false;
    }

    pub fn begin_attempt(&mut self) {
        self.state = ReconnectState::Attempting;
        self.stats.total_attempts += 1;
        self.stats.last_attempt = Some(Instant::now());
        info!("Reconnection attempt {}", self.stats.total_attempts);
    }

    /// Attempt succeeded; offer resume if a run was interrupted
    pub fn record_success(&mut self) {
        self.state = ReconnectState::Idle;
        self.request = None;
        self.stats.successful_reconnects += 1;
        self.stats.last_connected = Some(Instant::now());
        if self.interrupted.is_some() {
            self.resume_available = true;
            info!("Reconnected; interrupted run can be resumed after confirmation");
        } else {
            info!("Reconnected");
        }
    }

    /// Attempt failed; try again after the same interval
    pub fn record_failure(&mut self, reason: &str) {
        self.stats.failed_reconnects += 1;
        warn!(
            "Reconnection attempt {} failed: {reason}",
            self.stats.total_attempts
        );
        self.state = ReconnectState::Idle;
        self.schedule();
    }

    /// Mark the link as up outside of an attempt (manual connect)
    pub fn mark_connected(&mut self) {
        self.state = ReconnectState::Idle;
        self.request = None;
        self.stats.last_connected = Some(Instant::now());
        if self.interrupted.is_some() {
            self.resume_available = true;
        }
    }

    /// Stop reconnecting and forget any interrupted run
    pub fn cancel(&mut self) {
        if self.is_pending() {
            debug!("Reconnect cancelled");
        }
        self.state = ReconnectState::Idle;
        self.request = None;
        self.discard_resume();
    }

    pub fn resume_available(&self) -> bool {
        self.resume_available
    }

    pub fn interrupted(&self) -> Option<&InterruptedRun> {
        self.interrupted.as_ref()
    }

    /// Consume the interrupted run, only once resume is available
    pub fn take_resume(&mut self) -> Option<InterruptedRun> {
        if !self.resume_available {
            return None;
        }
        self.resume_available = false;
        self.interrupted.take()
    }

    pub fn discard_resume(&mut self) {
        self.resume_available = false;
        self.interrupted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::{Step, StepType, StopCondition};

    fn interrupted() -> InterruptedRun {
        InterruptedRun {
            profile: Profile::new(
                "Default CC",
                vec![Step::new(StepType::CC, 10.0, StopCondition::Voltage, 300.0)],
            ),
            registration: "AB123".to_string(),
            mode: SessionMode::Real,
            step_index: 0,
            comment: String::new(),
        }
    }

    #[test]
    fn test_schedule_raises_single_request() {
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy {
            enabled: true,
            interval: Duration::from_secs(5),
        });

        assert!(supervisor.schedule());
        assert!(supervisor.schedule());
        assert_eq!(supervisor.take_schedule_request(), Some(Duration::from_secs(5)));
        assert_eq!(supervisor.take_schedule_request(), None);
        assert_eq!(supervisor.state(), ReconnectState::Scheduled);
    }

    #[test]
    fn test_disabled_policy_never_schedules() {
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy {
            enabled: false,
            interval: Duration::from_secs(5),
        });
        assert!(!supervisor.schedule());
        assert!(!supervisor.is_pending());
        assert_eq!(supervisor.take_schedule_request(), None);
    }

    #[tokio::test]
    async fn test_failure_reschedules_indefinitely() {
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy::default());
        supervisor.schedule();

        for _ in 0..10 {
            assert!(supervisor.take_schedule_request().is_some());
            supervisor.begin_attempt();
            supervisor.record_failure("refused");
        }
        assert_eq!(supervisor.stats().failed_reconnects, 10);
        assert_eq!(supervisor.take_schedule_request(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_success_offers_resume_only_for_interrupted_run() {
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy::default());
        supervisor.schedule();
        supervisor.begin_attempt();
        supervisor.record_success();
        assert!(!supervisor.resume_available());

        supervisor.set_interrupted(interrupted());
        supervisor.schedule();
        assert!(supervisor.take_resume().is_none());
        supervisor.begin_attempt();
        supervisor.record_success();
        assert!(supervisor.resume_available());
        assert_eq!(supervisor.stats().successful_reconnects, 2);

        let run = supervisor.take_resume().unwrap();
        assert_eq!(run.registration, "AB123");
        assert!(!supervisor.resume_available());
    }

    #[test]
    fn test_cancel_clears_everything() {
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy::default());
        supervisor.set_interrupted(interrupted());
        supervisor.schedule();
        supervisor.cancel();
        assert!(!supervisor.is_pending());
        assert!(supervisor.take_schedule_request().is_none());
        assert!(supervisor.interrupted().is_none());
    }
}
