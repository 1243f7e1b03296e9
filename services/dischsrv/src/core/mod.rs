//! Discharge core: instrument link, profiles and the run controller

pub mod controller;
pub mod energy;
pub mod evaluator;
pub mod measurement;
pub mod profile;
pub mod protocol;
pub mod session;
pub mod transport;

pub use controller::{ControllerSettings, ControllerState, DischargeController, TickOutcome};
pub use profile::{Profile, ProfileLibrary, Step, StepType, StopCondition};
pub use session::{PersistenceSink, ReportSink, SessionId, SessionMode};
