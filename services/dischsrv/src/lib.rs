//! Discharge Service Library (dischsrv)
//!
//! Drives an SCPI electronic load over TCP through multi-step discharge
//! profiles (constant current, power or voltage), samples voltage, current
//! and power once per tick, integrates energy and writes a certificate when
//! a session ends.
//!
//! # Architecture
//!
//! - **`core`**: transport, SCPI protocol, profiles, measurement sources and
//!   the discharge controller state machine
//! - **`runtime`**: the single-task service loop, its deferred task scheduler
//!   and reconnect supervision
//! - **`storage`**: session store and CSV certificates
//! - **`config`**: layered YAML / environment configuration
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ DischargeService│───►│   Controller    │───►│   Transport     │
//! │ (tick/reconnect)│    │ (state machine) │    │ (TCP / mock)    │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!          ▲                       │                       │
//!          │                       ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ Operator input  │    │ Persistence /   │    │  Electronic     │
//! │ (stdin, Ctrl-C) │    │ Report sinks    │    │  load (SCPI)    │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod runtime;
pub mod storage;

pub use config::DischargeConfig;
pub use core::controller::{ControllerSettings, ControllerState, DischargeController, TickOutcome};
pub use error::{DischSrvError, Result};
pub use runtime::service::{DischargeService, OperatorCommand};
pub use storage::{CsvReportSink, MemoryStore};
