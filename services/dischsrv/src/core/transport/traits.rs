//! Transport Layer Traits
//!
//! Line-oriented transport used to talk SCPI to the electronic load.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Transport layer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Deadline elapsed before the operation completed
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Peer closed the socket or an I/O error broke it
    #[error("Connection reset: {0}")]
    Reset(String),

    /// No live socket
    #[error("Not connected: {0}")]
    NotConnected(String),
}

/// Connection state of the controller's link to the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link
    Disconnected,
    /// Live socket to the instrument
    Connected,
    /// Simulated link, no socket
    ConnectedTestMode,
}

/// Transport statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Number of connection attempts
    pub connection_attempts: u64,
    /// Number of successful connections
    pub successful_connections: u64,
    /// Number of failed connections
    pub failed_connections: u64,
    /// Number of disconnections
    pub disconnections: u64,
    /// Last successful connection time
    pub last_connection: Option<SystemTime>,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_attempt(&mut self) {
        self.connection_attempts += 1;
    }

    pub fn record_successful_connection(&mut self) {
        self.successful_connections += 1;
        self.last_connection = Some(SystemTime::now());
    }

    pub fn record_failed_connection(&mut self) {
        self.failed_connections += 1;
    }

    pub fn record_disconnection(&mut self) {
        self.disconnections += 1;
    }

    pub fn record_bytes_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }
}

/// Newline-terminated command transport
///
/// Implementations own at most one live socket and never retry internally;
/// the caller decides what a failure means for the run.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Open the socket, replacing any previous one
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Send one command line (terminator appended)
    async fn send(&mut self, line: &str) -> Result<(), TransportError>;

    /// Send one command line and read a single response line
    async fn query(&mut self, line: &str, timeout: Duration) -> Result<String, TransportError>;

    /// Drop the socket; calling it twice is harmless
    async fn close(&mut self);

    /// Whether a socket is currently held
    fn is_connected(&self) -> bool;

    /// Snapshot of the transport counters
    fn stats(&self) -> TransportStats;
}

/// Allows `Box<dyn Transport>` to be used where `Transport` is required
#[async_trait]
impl Transport for Box<dyn Transport> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.as_mut().connect(host, port, timeout).await
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        self.as_mut().send(line).await
    }

    async fn query(&mut self, line: &str, timeout: Duration) -> Result<String, TransportError> {
        self.as_mut().query(line, timeout).await
    }

    async fn close(&mut self) {
        self.as_mut().close().await
    }

    fn is_connected(&self) -> bool {
        self.as_ref().is_connected()
    }

    fn stats(&self) -> TransportStats {
        self.as_ref().stats()
    }
}
