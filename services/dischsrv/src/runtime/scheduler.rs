//! Single-threaded deferred task queue
//!
//! Tasks are plain values. The owner awaits [`Scheduler::next`] and runs
//! each task to completion before asking for the next one, so nothing
//! scheduled here ever runs concurrently.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Identifies a scheduled task for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    /// Ordered by deadline, then by scheduling order
    queue: BTreeMap<(Instant, u64), T>,
    deadlines: HashMap<u64, Instant>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`
    pub fn schedule_once(&mut self, delay: Duration, task: T) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = Instant::now() + delay;
        self.queue.insert((deadline, id), task);
        self.deadlines.insert(id, deadline);
        TaskHandle(id)
    }

    /// Drop a task that has not run yet
    ///
    /// Returns `false` if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(deadline) => self.queue.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }

    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Wait for the earliest task and remove it
    ///
    /// Pends forever while empty. Cancel-safe: dropping the future before
    /// it resolves leaves the queue untouched.
    pub async fn next(&mut self) -> T {
        loop {
            let Some(deadline) = self.next_deadline() else {
                return std::future::pending().await;
            };
            sleep_until(deadline).await;

            if let Some(((_, id), task)) = self.queue.pop_first() {
                self.deadlines.remove(&id);
                return task;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once(Duration::from_secs(5), "reconnect");
        scheduler.schedule_once(Duration::from_secs(1), "tick");
        scheduler.schedule_once(Duration::from_secs(1), "second tick");

        let start = Instant::now();
        assert_eq!(scheduler.next().await, "tick");
        assert_eq!(scheduler.next().await, "second tick");
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(scheduler.next().await, "reconnect");
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let mut scheduler = Scheduler::new();
        let tick = scheduler.schedule_once(Duration::from_secs(1), 1);
        scheduler.schedule_once(Duration::from_secs(2), 2);

        assert!(scheduler.is_scheduled(tick));
        assert!(scheduler.cancel(tick));
        assert!(!scheduler.cancel(tick));
        assert_eq!(scheduler.next().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_scheduler_pends() {
        let mut scheduler: Scheduler<u8> = Scheduler::new();
        let waited = tokio::time::timeout(Duration::from_secs(60), scheduler.next()).await;
        assert!(waited.is_err());
    }
}
