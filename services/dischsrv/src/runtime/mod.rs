//! Event loop, deferred tasks and reconnect supervision

pub mod reconnect;
pub mod scheduler;
pub mod service;

pub use reconnect::{ReconnectPolicy, ReconnectSupervisor};
pub use scheduler::{Scheduler, TaskHandle};
pub use service::{DischargeService, OperatorCommand};
