//! Single-slot scheduled tasks.
//!
//! A [`TaskSlot`] holds at most one pending tokio task. Scheduling a new task
//! aborts whatever is still pending, so only the latest request inside the
//! delay window ever runs. The same slot type backs the debounced saves and
//! the two delayed auto-advance steps.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Delay before persisting timer state while running.
pub const TIMER_SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Delay before persisting note/tag edits.
pub const DRAFT_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Delay before persisting a recomputed streak.
pub const STREAK_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Delay between a natural completion and the move to the next phase.
pub const AUTO_ADVANCE_DELAY: Duration = Duration::from_secs(1);

/// Delay between the move to the next phase and its automatic start.
pub const AUTO_START_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// TaskSlot
// ============================================================================

/// A cancel-then-reschedule slot for one delayed task.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TaskSlot {
    /// Label used in logs
    name: &'static str,
    /// Delay applied to every scheduled task
    delay: Duration,
    /// Pending task, if any
    pending: Option<JoinHandle<()>>,
}

impl TaskSlot {
    /// Creates an empty slot.
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay,
            pending: None,
        }
    }

    /// Returns the delay applied to scheduled tasks.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `task` after the slot's delay, replacing any pending task.
    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            task.await;
        }));
    }

    /// Aborts the pending task, if any.
    ///
    /// Returns true if a task was still waiting.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                debug!("Cancelled pending '{}' task", self.name);
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Returns true if a scheduled task has not finished yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
