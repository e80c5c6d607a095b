//! Sources of focus and idle events.
//!
//! A watcher samples or reads whatever tells it which window has focus and
//! how long the user has been inactive, and feeds that to a
//! [`FocusEvents`] receiver through an [`IdleGate`].

mod line;
#[cfg(target_os = "linux")]
mod x11;

pub use line::LineWatcher;
#[cfg(target_os = "linux")]
pub use x11::X11Watcher;

use chrono::Duration;
use gone_core::{FocusEvents, FocusTarget};

use crate::shutdown::Shutdown;

/// A blocking source of focus events.
pub trait Watcher: Send {
    /// Delivers events until `shutdown` is triggered or the source ends.
    ///
    /// Runs on a dedicated thread; implementations may block.
    fn collect(
        &mut self,
        events: &dyn FocusEvents,
        idle_threshold: Duration,
        shutdown: &Shutdown,
    ) -> anyhow::Result<()>;
}

/// Turns raw observations into recorder events.
///
/// Emits one `snooze` when inactivity first reaches the threshold and one
/// `wakeup` when it ends, and only emits `update` when the focused target
/// actually changes.
#[derive(Debug)]
pub struct IdleGate {
    threshold: Duration,
    current: Option<FocusTarget>,
    idle: bool,
}

impl IdleGate {
    pub const fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            current: None,
            idle: false,
        }
    }

    pub const fn is_idle(&self) -> bool {
        self.idle
    }

    /// Feeds one sample of focus and inactivity.
    ///
    /// Inactivity is handled first, so a user coming back to a different
    /// window produces `wakeup` before `update`.
    pub fn observe(
        &mut self,
        events: &dyn FocusEvents,
        target: Option<FocusTarget>,
        inactive_for: Duration,
    ) {
        self.idle_for(events, inactive_for);
        if let Some(target) = target {
            self.focus(events, target);
        }
    }

    /// The user has been inactive for `inactive_for`.
    pub fn idle_for(&mut self, events: &dyn FocusEvents, inactive_for: Duration) {
        if inactive_for < self.threshold {
            self.active(events);
        } else if !self.idle {
            self.idle = true;
            events.snooze(inactive_for);
        }
    }

    /// The user is active.
    pub fn active(&mut self, events: &dyn FocusEvents) {
        if self.idle {
            self.idle = false;
            events.wakeup();
        }
    }

    /// `target` has focus.
    pub fn focus(&mut self, events: &dyn FocusEvents, target: FocusTarget) {
        if self.current.as_ref() == Some(&target) {
            return;
        }
        self.current = Some(target.clone());
        events.update(target);
    }
}
