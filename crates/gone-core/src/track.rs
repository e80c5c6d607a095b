//! Per-target time accumulation.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::report::format_duration;

/// Accumulated time for one [`FocusTarget`](crate::FocusTarget).
///
/// `spent` and `idle` never decrease and never go negative, and `seen`
/// never moves backwards. The mutators below are the only way the recorder
/// changes a track, so they enforce those rules even when the wall clock
/// jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    /// Last activation, or last return from idle.
    pub seen: DateTime<Utc>,
    /// Total engaged time.
    pub spent: Duration,
    /// Total idle time attributed to this target.
    pub idle: Duration,
}

impl Track {
    /// A fresh track first observed at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            seen: now,
            spent: Duration::zero(),
            idle: Duration::zero(),
        }
    }

    /// Time elapsed since `seen`, or zero if the clock went backwards.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.seen).max(Duration::zero())
    }

    /// Credits the time since `seen` as engaged time.
    ///
    /// `seen` itself is left alone; callers re-base it with [`Track::touch`].
    pub fn settle(&mut self, now: DateTime<Utc>) {
        self.spent += self.elapsed(now);
    }

    /// Adds an idle interval. Negative intervals are ignored.
    pub fn add_idle(&mut self, idle: Duration) {
        self.idle += idle.max(Duration::zero());
    }

    /// Moves `seen` forward to `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.seen = self.seen.max(now);
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.seen.format("%Y/%m/%d %H:%M:%S"),
            format_duration(self.spent)
        )
    }
}
