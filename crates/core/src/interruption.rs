//! Interruption Detector
//!
//! Flags a human submit that lands while an autonomous generation is still
//! outstanding. The flag is advisory: it never changes scheduling or
//! transcript order, and it expires on its own after a fixed window.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Default time an interruption stays visible.
pub const DEFAULT_INTERRUPTION_WINDOW: Duration = Duration::from_millis(2000);

/// Snapshot of the interruption signal.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptionEvent {
    pub occurred: bool,
    /// Milliseconds until the signal clears. Zero when not raised.
    pub remaining_ms: u64,
    #[serde(skip)]
    pub expires_at: Option<Instant>,
}

#[derive(Debug)]
pub struct InterruptionDetector {
    window: Duration,
    expires_at: Option<Instant>,
    total: u32,
}

impl Default for InterruptionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_INTERRUPTION_WINDOW)
    }
}

impl InterruptionDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            expires_at: None,
            total: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Observes a human submit. Returns true when it counts as an interruption,
    /// in which case the signal is (re)armed until `now + window`.
    pub fn observe_submit(&mut self, generating: bool, now: Instant) -> bool {
        if !generating {
            return false;
        }
        self.total += 1;
        self.expires_at = Some(now + self.window);
        info!(total = self.total, "Human interrupted an in-flight turn");
        true
    }

    /// Whether the signal is raised at `now`.
    pub fn is_active(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now < at)
    }

    /// Clears the signal if its window has passed. Returns true if it was
    /// cleared by this call.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) if now >= at => {
                self.expires_at = None;
                true
            }
            _ => false,
        }
    }

    /// Interruptions observed over the whole session.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn snapshot(&self, now: Instant) -> InterruptionEvent {
        match self.expires_at {
            Some(at) if now < at => InterruptionEvent {
                occurred: true,
                remaining_ms: (at - now).as_millis() as u64,
                expires_at: Some(at),
            },
            _ => InterruptionEvent {
                occurred: false,
                remaining_ms: 0,
                expires_at: None,
            },
        }
    }
}
