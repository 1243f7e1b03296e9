//! Discharge service event loop
//!
//! One task owns the controller. Ticks and reconnect attempts are deferred
//! tasks on a [`Scheduler`], operator commands arrive over a channel, and
//! everything is handled in turn, so no two controller operations overlap.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scheduler::{Scheduler, TaskHandle};
use crate::core::controller::{ControllerState, DischargeController, TickOutcome};
use crate::error::Result;

/// Deferred work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Tick,
    Reconnect,
}

/// Operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Pause,
    Resume,
    TogglePause,
    Stop { generate_report: bool },
    /// Resume the run interrupted by a link loss
    ConfirmResume,
    DeclineResume,
    /// Stop without a report and leave the loop
    Shutdown,
}

pub struct DischargeService {
    controller: DischargeController,
    scheduler: Scheduler<Task>,
    tick_interval: Duration,
    tick_handle: Option<TaskHandle>,
    reconnect_handle: Option<TaskHandle>,
}

impl DischargeService {
    pub fn new(controller: DischargeController, tick_interval: Duration) -> Self {
        Self {
            controller,
            scheduler: Scheduler::new(),
            tick_interval,
            tick_handle: None,
            reconnect_handle: None,
        }
    }

    pub fn controller(&self) -> &DischargeController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut DischargeController {
        &mut self.controller
    }

    pub fn into_controller(self) -> DischargeController {
        self.controller
    }

    /// Drive the controller until the run is over
    ///
    /// Returns once nothing is running, no reconnect is outstanding and no
    /// resume offer is waiting, or on shutdown. Cancelling `shutdown` stops
    /// the run with a report.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<OperatorCommand>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("Discharge service loop started");
        let mut commands_open = true;

        loop {
            self.sync_schedule();
            if self.is_finished(commands_open) {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    self.controller.stop(true, None).await;
                    break;
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if self.handle_command(command).await {
                            break;
                        }
                    },
                    None => {
                        debug!("Operator channel closed");
                        commands_open = false;
                    },
                },
                task = self.scheduler.next() => self.run_task(task).await,
            }
        }

        self.cancel_all();
        info!("Discharge service loop stopped: {}", self.controller.status_line());
        Ok(())
    }

    fn is_finished(&self, commands_open: bool) -> bool {
        if self.controller.is_running() || self.controller.reconnect_pending() {
            return false;
        }
        !(self.controller.resume_available() && commands_open)
    }

    /// Align scheduled tasks with the controller state
    fn sync_schedule(&mut self) {
        if let Some(delay) = self.controller.take_reconnect_request() {
            if let Some(handle) = self.reconnect_handle.take() {
                self.scheduler.cancel(handle);
            }
            self.reconnect_handle = Some(self.scheduler.schedule_once(delay, Task::Reconnect));
        } else if !self.controller.reconnect_pending() {
            if let Some(handle) = self.reconnect_handle.take() {
                self.scheduler.cancel(handle);
            }
        }

        if self.controller.state() == ControllerState::Running {
            // Next tick only once the previous one has finished
            if self.tick_handle.is_none() {
                self.tick_handle = Some(
                    self.scheduler
                        .schedule_once(self.tick_interval, Task::Tick),
                );
            }
        } else if let Some(handle) = self.tick_handle.take() {
            self.scheduler.cancel(handle);
        }
    }

    fn cancel_all(&mut self) {
        for handle in [self.tick_handle.take(), self.reconnect_handle.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel(handle);
        }
    }

    async fn run_task(&mut self, task: Task) {
        match task {
            Task::Tick => {
                self.tick_handle = None;
                let outcome = self.controller.tick().await;
                debug!("Tick: {outcome:?}");
                match outcome {
                    TickOutcome::Sampled | TickOutcome::Advanced => {
                        info!("{}", self.controller.status_line());
                    },
                    TickOutcome::Completed => {
                        info!(
                            "Discharge complete, {:.4} kWh",
                            self.controller.total_energy_kwh()
                        );
                    },
                    _ => {},
                }
            },
            Task::Reconnect => {
                self.reconnect_handle = None;
                if self.controller.attempt_reconnect().await && self.controller.resume_available()
                {
                    info!("Link restored. Confirm to resume the interrupted discharge");
                }
            },
        }
    }

    /// Returns `true` when the loop should exit
    async fn handle_command(&mut self, command: OperatorCommand) -> bool {
        debug!("Operator command: {command:?}");
        let result = match command {
            OperatorCommand::Pause => self.controller.pause().await,
            OperatorCommand::Resume => self.controller.resume().await,
            OperatorCommand::TogglePause => match self.controller.state() {
                ControllerState::Paused => self.controller.resume().await,
                _ => self.controller.pause().await,
            },
            OperatorCommand::Stop { generate_report } => {
                if self.controller.is_running() {
                    self.controller.stop(generate_report, None).await;
                } else {
                    self.controller.cancel_reconnect();
                }
                Ok(())
            },
            OperatorCommand::ConfirmResume => self
                .controller
                .resume_after_reconnect()
                .await
                .map(|id| info!("Resumed as session {id}")),
            OperatorCommand::DeclineResume => {
                self.controller.decline_resume();
                Ok(())
            },
            OperatorCommand::Shutdown => {
                self.controller.stop(false, None).await;
                self.controller.cancel_reconnect();
                return true;
            },
        };
        if let Err(e) = result {
            warn!("Command {command:?} failed: {e}");
        }
        false
    }
}

