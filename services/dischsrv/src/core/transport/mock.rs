//! Mock Transport for Testing
//!
//! Scripted SCPI responses without a socket. Clones share state, so a test
//! can keep a handle while the controller owns the boxed transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::{Transport, TransportError, TransportStats};

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    /// One-shot responses per command, consumed in order
    queued: HashMap<String, VecDeque<String>>,
    /// Fallback response per command once the queue is empty
    sticky: HashMap<String, String>,
    /// Every line sent or queried, in order
    sent: Vec<String>,
    fail_connect: bool,
    /// One-shot failure armed for a specific command
    fail_on: HashMap<String, TransportError>,
    /// Failure for the next send or query, whatever it is
    fail_next: Option<TransportError>,
    stats: TransportStats,
}

/// Mock transport implementation
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response for `command`
    pub fn push_response(&self, command: &str, response: &str) {
        self.state
            .lock()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
    }

    /// Answer `command` with `response` whenever nothing is queued
    pub fn set_response(&self, command: &str, response: &str) {
        self.state
            .lock()
            .sticky
            .insert(command.to_string(), response.to_string());
    }

    /// Every line written so far
    pub fn sent_lines(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    pub fn set_connect_failure(&self, should_fail: bool) {
        self.state.lock().fail_connect = should_fail;
    }

    /// Fail the next send/query with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Fail the next send/query of `command` with `error`
    pub fn fail_on(&self, command: &str, error: TransportError) {
        self.state
            .lock()
            .fail_on
            .insert(command.to_string(), error);
    }

    /// Simulate the peer dropping the link
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.stats.record_disconnection();
        }
    }

    fn write_line(state: &mut MockState, line: &str) -> Result<(), TransportError> {
        if !state.connected {
            return Err(TransportError::NotConnected(format!("cannot send '{line}'")));
        }
        state.sent.push(line.to_string());

        let failure = state.fail_next.take().or_else(|| state.fail_on.remove(line));
        if let Some(error) = failure {
            if matches!(error, TransportError::Reset(_)) {
                state.connected = false;
                state.stats.record_disconnection();
            }
            return Err(error);
        }

        state.stats.record_bytes_sent(line.len() + 1);
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "Mock Transport"
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.stats.record_connection_attempt();
        if state.fail_connect {
            state.stats.record_failed_connection();
            return Err(TransportError::NotConnected(format!(
                "Mock connection to {host}:{port} refused"
            )));
        }
        state.connected = true;
        state.stats.record_successful_connection();
        debug!("Mock transport connected to {host}:{port}");
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::write_line(&mut state, line)?;
        debug!(direction = "send", "{line}");
        Ok(())
    }

    async fn query(&mut self, line: &str, _timeout: Duration) -> Result<String, TransportError> {
        let mut state = self.state.lock();
        Self::write_line(&mut state, line)?;

        let queued = state.queued.get_mut(line).and_then(VecDeque::pop_front);
        let response = match queued {
            Some(response) => response,
            None => state.sticky.get(line).cloned().ok_or_else(|| {
                TransportError::Timeout(format!("No response scripted for '{line}'"))
            })?,
        };

        state.stats.record_bytes_received(response.len() + 1);
        debug!(direction = "recv", "{line} -> {response}");
        Ok(response)
    }

    async fn close(&mut self) {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.stats.record_disconnection();
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn stats(&self) -> TransportStats {
        self.state.lock().stats.clone()
    }
}
