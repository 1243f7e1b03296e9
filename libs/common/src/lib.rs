//! Shared library for the discharge workspace
//!
//! Provides functions shared by the services:
//! - logging bootstrap (console + daily rolling file)

pub mod logging;

pub use logging::{init_logging, LogConfig, LoggingError};
