//! Transport Layer Module
//!
//! Separates socket handling from the SCPI command layer.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   DischargeController / CommandProtocol  │
//! └──────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌──────────────────────────────────────────┐
//! │         Transport Interface (Trait)      │
//! │   connect(), send(), query(), close()    │
//! └──────────────────────────────────────────┘
//!            │                      │
//!            ▼                      ▼
//!     ┌─────────────┐       ┌─────────────┐
//!     │     TCP     │       │    Mock     │
//!     │  Transport  │       │  Transport  │
//!     └─────────────┘       └─────────────┘
//! ```
//!
//! The mock is compiled into the library so dry runs and integration tests
//! can script instrument replies.

pub mod mock;
pub mod tcp;
pub mod traits;

pub use mock::MockTransport;
pub use tcp::TcpTransport;
pub use traits::{ConnectionState, Transport, TransportError, TransportStats};
