//! In-process session store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::session::{
    PersistenceError, PersistenceSink, Sample, SessionId, SessionMode, SessionSummary,
};

#[derive(Debug)]
struct StoredSession {
    summary: SessionSummary,
    samples: Vec<Sample>,
}

#[derive(Debug, Default)]
struct Inner {
    last_id: SessionId,
    sessions: BTreeMap<SessionId, StoredSession>,
}

/// Memory store implementation
///
/// Session ids start at 1 and only grow.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn sample_count(&self, id: SessionId) -> usize {
        self.inner
            .lock()
            .sessions
            .get(&id)
            .map_or(0, |session| session.samples.len())
    }

    /// All session rows, oldest first
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.inner
            .lock()
            .sessions
            .values()
            .map(|session| session.summary.clone())
            .collect()
    }
}

#[async_trait]
impl PersistenceSink for MemoryStore {
    async fn start_session(
        &self,
        registration: &str,
        profile_name: &str,
        mode: SessionMode,
    ) -> Result<SessionId, PersistenceError> {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = inner.last_id;
        inner.sessions.insert(
            id,
            StoredSession {
                summary: SessionSummary {
                    id,
                    registration: registration.to_string(),
                    profile_name: profile_name.to_string(),
                    mode,
                    start_time: Utc::now(),
                    end_time: None,
                    total_energy_kwh: 0.0,
                    comment: String::new(),
                },
                samples: Vec::new(),
            },
        );
        debug!("Session {id} created for {registration}");
        Ok(id)
    }

    async fn log_sample(&self, sample: &Sample) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&sample.session_id)
            .ok_or(PersistenceError::SessionNotFound(sample.session_id))?;
        if session.summary.end_time.is_some() {
            return Err(PersistenceError::AlreadyFinished(sample.session_id));
        }
        session.samples.push(sample.clone());
        Ok(())
    }

    async fn finish_session(
        &self,
        id: SessionId,
        total_energy_kwh: f64,
        comment: &str,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(PersistenceError::SessionNotFound(id))?;
        if session.summary.end_time.is_some() {
            return Err(PersistenceError::AlreadyFinished(id));
        }
        session.summary.end_time = Some(Utc::now());
        session.summary.total_energy_kwh = total_energy_kwh;
        session.summary.comment = comment.to_string();
        Ok(())
    }

    async fn get_session_data(
        &self,
        id: SessionId,
    ) -> Result<(Vec<Sample>, SessionSummary), PersistenceError> {
        let inner = self.inner.lock();
        let session = inner
            .sessions
            .get(&id)
            .ok_or(PersistenceError::SessionNotFound(id))?;
        Ok((session.samples.clone(), session.summary.clone()))
    }
}
