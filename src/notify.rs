//! Completion notification side channel.
//!
//! Sounds and desktop notifications live outside this crate. The controller
//! invokes a [`CompletionNotifier`] exactly once per natural phase completion
//! and never for skip or reset.

use std::sync::Mutex;

use crate::types::TimerMode;

/// Receives natural phase completions.
pub trait CompletionNotifier: Send + Sync {
    /// Called once when a phase of `mode` reaches zero.
    fn notify_completion(&self, mode: TimerMode);
}

/// Notifier that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl CompletionNotifier for NoopNotifier {
    fn notify_completion(&self, _mode: TimerMode) {}
}

/// Mock notifier for testing.
#[derive(Debug, Default)]
pub struct MockNotifier {
    calls: Mutex<Vec<TimerMode>>,
}

impl MockNotifier {
    /// Creates a mock with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Modes passed to each notification, in order.
    #[must_use]
    pub fn get_calls(&self) -> Vec<TimerMode> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Forgets recorded notifications.
    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl CompletionNotifier for MockNotifier {
    fn notify_completion(&self, mode: TimerMode) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mock = MockNotifier::new();
        assert_eq!(mock.call_count(), 0);

        mock.notify_completion(TimerMode::Focus);
        mock.notify_completion(TimerMode::ShortBreak);

        assert_eq!(mock.call_count(), 2);
        assert_eq!(
            mock.get_calls(),
            vec![TimerMode::Focus, TimerMode::ShortBreak]
        );

        mock.clear_calls();
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_noop_notifier() {
        NoopNotifier.notify_completion(TimerMode::LongBreak);
    }
}
