//! TCP Transport Implementation
//!
//! SCPI over a raw TCP socket. Responses are read up to the newline
//! terminator; anything received after it is kept for the next query.
//! A timed out exchange drops the socket, so the caller reconnects before
//! the next command.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::traits::{Transport, TransportError, TransportStats};

/// Default size of a single socket read
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// TCP transport implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    /// Bytes received after the last consumed terminator
    pending: Vec<u8>,
    read_buffer_size: usize,
    /// Deadline applied to sends, taken from the last connect
    io_timeout: Duration,
    peer: String,
    stats: TransportStats,
}

impl TcpTransport {
    pub fn new(read_buffer_size: usize) -> Self {
        Self {
            stream: None,
            pending: Vec::new(),
            read_buffer_size: read_buffer_size.max(1),
            io_timeout: Duration::from_secs(5),
            peer: String::new(),
            stats: TransportStats::new(),
        }
    }

    /// Drop the socket after a fatal I/O condition
    fn drop_stream(&mut self) {
        if self.stream.take().is_some() {
            self.stats.record_disconnection();
        }
        self.pending.clear();
    }

    /// Pop one complete line from the pending buffer
    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim_end_matches(['\n', '\r']).trim().to_string())
    }

    async fn read_line(&mut self, deadline: Instant) -> Result<String, TransportError> {
        let mut buffer = vec![0u8; self.read_buffer_size];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(TransportError::NotConnected(format!(
                    "no socket to {}",
                    self.peer
                )));
            };

            match timeout_at(deadline, stream.read(&mut buffer)).await {
                Ok(Ok(0)) => {
                    warn!("TCP connection closed by peer {}", self.peer);
                    self.drop_stream();
                    return Err(TransportError::Reset(
                        "Connection closed by peer".to_string(),
                    ));
                },
                Ok(Ok(n)) => {
                    self.stats.record_bytes_received(n);
                    self.pending.extend_from_slice(&buffer[..n]);
                },
                Ok(Err(e)) => {
                    let msg = format!("Failed to receive from {}: {e}", self.peer);
                    warn!("{msg}");
                    self.drop_stream();
                    return Err(TransportError::Reset(msg));
                },
                Err(_) => {
                    // A late reply would be read as the answer to the next query
                    warn!("No response from {}, dropping the socket", self.peer);
                    self.drop_stream();
                    return Err(TransportError::Timeout(format!(
                        "No response from {}",
                        self.peer
                    )));
                },
            }
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_READ_BUFFER)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &str {
        "TCP Transport"
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<(), TransportError> {
        self.close().await;
        self.stats.record_connection_attempt();

        let addr = format!("{host}:{port}");
        debug!("Connecting to TCP endpoint: {addr}");

        match timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY: {e}");
                }
                self.stream = Some(stream);
                self.io_timeout = connect_timeout;
                self.peer = addr;
                self.stats.record_successful_connection();
                info!("Connected to {}", self.peer);
                Ok(())
            },
            Ok(Err(e)) => {
                self.stats.record_failed_connection();
                Err(TransportError::NotConnected(format!(
                    "Failed to connect to {addr}: {e}"
                )))
            },
            Err(_) => {
                self.stats.record_failed_connection();
                Err(TransportError::Timeout(format!(
                    "Connection to {addr} timed out"
                )))
            },
        }
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected(format!(
                "cannot send '{line}'"
            )));
        };

        let frame = format!("{line}\n");
        match timeout(self.io_timeout, stream.write_all(frame.as_bytes())).await {
            Ok(Ok(())) => {
                self.stats.record_bytes_sent(frame.len());
                debug!(direction = "send", "{line}");
                Ok(())
            },
            Ok(Err(e)) => {
                let msg = format!("Failed to send '{line}': {e}");
                warn!("{msg}");
                self.drop_stream();
                Err(TransportError::Reset(msg))
            },
            Err(_) => {
                // The frame may be half written
                self.drop_stream();
                Err(TransportError::Timeout(format!("Sending '{line}'")))
            },
        }
    }

    async fn query(&mut self, line: &str, timeout: Duration) -> Result<String, TransportError> {
        let deadline = Instant::now() + timeout;
        self.send(line).await?;
        let response = self.read_line(deadline).await?;
        debug!(direction = "recv", "{line} -> {response}");
        Ok(response)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error during TCP shutdown: {e}");
            }
            self.stats.record_disconnection();
            info!("Disconnected from {}", self.peer);
        }
        self.pending.clear();
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
