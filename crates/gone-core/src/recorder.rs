//! Event-driven focus recorder.
//!
//! The recorder is the only writer of tracks. It keeps a cursor saying which
//! target is current and whether the user is idle, and on every event it
//! settles elapsed time into the store before moving the cursor.
//!
//! # Event ordering
//!
//! Watchers must deliver [`wakeup`](Recorder::wakeup) strictly before the
//! [`update`](Recorder::update) that reports the window the user came back
//! to. An update received while snoozed only moves the cursor; it never
//! ends the idle interval on its own.
//!
//! # Locking
//!
//! Every operation holds the cursor lock for its whole read-modify-write
//! cycle against the store, so a periodic [`flush`](Recorder::flush), a
//! retention [`sweep`](Recorder::sweep) and a focus change can never
//! interleave on the same track.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::report::{Report, format_duration, generate_report};
use crate::{Clock, FocusTarget, StoreError, SystemClock, Track, TrackStore};

/// Receiver of focus and idle notifications from a watcher.
pub trait FocusEvents: Send + Sync {
    /// The focused target is now `target`.
    fn update(&self, target: FocusTarget);

    /// The user has been inactive for `idle`.
    fn snooze(&self, idle: Duration);

    /// The user is active again.
    fn wakeup(&self);
}

/// Where the recorder currently attributes time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cursor {
    /// Nothing has been focused yet.
    #[default]
    NoTarget,
    /// `target` is focused and the user is engaged.
    Active(FocusTarget),
    /// `target` is focused but the user is away.
    Snoozed(FocusTarget),
}

impl Cursor {
    pub const fn target(&self) -> Option<&FocusTarget> {
        match self {
            Self::NoTarget => None,
            Self::Active(target) | Self::Snoozed(target) => Some(target),
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Snoozed(_))
    }
}

/// Attributes wall-clock time to focus targets.
pub struct Recorder<S: ?Sized, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    cursor: Mutex<Cursor>,
}

impl<S: TrackStore + ?Sized> Recorder<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: TrackStore + ?Sized, C: Clock> Recorder<S, C> {
    pub const fn with_clock(store: Arc<S>, clock: C) -> Self {
        Self {
            store,
            clock,
            cursor: Mutex::new(Cursor::NoTarget),
        }
    }

    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    pub fn cursor(&self) -> Cursor {
        self.lock().clone()
    }

    pub fn current(&self) -> Option<FocusTarget> {
        self.lock().target().cloned()
    }

    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    /// Records that `target` gained focus.
    ///
    /// When engaged, the time since the current track was last seen is
    /// credited to it first. The new target's `seen` is then re-based to
    /// now, so repeated updates for one target never count time twice.
    pub fn update(&self, target: FocusTarget) {
        let mut cursor = self.lock();
        let now = self.clock.now();
        self.switch(&mut cursor, target, now);
    }

    /// Records that the user has been idle for `idle`.
    ///
    /// Only the first call of an idle interval counts; the interval length
    /// is attributed once to the current target. Spent time is not settled
    /// here, the next [`wakeup`](Recorder::wakeup) re-bases `seen` instead.
    pub fn snooze(&self, idle: Duration) {
        let mut cursor = self.lock();
        let Cursor::Active(current) = &*cursor else {
            return;
        };
        let current = current.clone();
        info!(idle = %format_duration(idle), %current, "away from keyboard");

        match self.store.get(&current) {
            Ok(mut track) => {
                track.add_idle(idle);
                self.persist(&current, &track);
            }
            Err(err) => warn!(%current, error = %err, "failed to load track, idle time lost"),
        }

        *cursor = Cursor::Snoozed(current);
    }

    /// Records that the user is back.
    ///
    /// The current track's `seen` moves to now so the idle interval is never
    /// credited as spent time.
    pub fn wakeup(&self) {
        let mut cursor = self.lock();
        let Cursor::Snoozed(current) = &*cursor else {
            return;
        };
        let current = current.clone();
        let now = self.clock.now();
        info!(%current, "back to keyboard");

        match self.store.get(&current) {
            Ok(mut track) => {
                track.touch(now);
                self.persist(&current, &track);
            }
            Err(err) => warn!(%current, error = %err, "failed to load track on wakeup"),
        }

        *cursor = Cursor::Active(current);
    }

    /// Settles the current target's elapsed time into the store without
    /// changing focus. Equivalent to `update(current)` done atomically.
    pub fn flush(&self) {
        let mut cursor = self.lock();
        let Some(target) = cursor.target().cloned() else {
            return;
        };
        let now = self.clock.now();
        self.switch(&mut cursor, target, now);
    }

    /// Deletes tracks last seen more than `retention` ago, or that
    /// collected more than `retention` of idle time. Returns the number
    /// removed.
    ///
    /// The current target is never deleted. The cursor lock is held for the
    /// whole walk, so focus cannot move onto a track while it is judged.
    pub fn sweep(&self, retention: Duration) -> usize {
        let cursor = self.lock();
        let keep = cursor.target();
        // Out of calendar range means nothing is old enough.
        let cutoff = self.clock.now().checked_sub_signed(retention);
        let mut removed = 0;

        for target in self.store.keys() {
            if keep == Some(&target) {
                continue;
            }
            let track = match self.store.get(&target) {
                Ok(track) => track,
                Err(err) => {
                    warn!(%target, error = %err, "skipping unreadable track in sweep");
                    continue;
                }
            };
            let expired = cutoff.is_some_and(|cutoff| track.seen < cutoff);
            if !expired && track.idle <= retention {
                continue;
            }
            match self.store.delete(&target) {
                Ok(true) => {
                    info!(%target, seen = %track.seen, "dropping stale track");
                    removed += 1;
                }
                Ok(false) => {}
                Err(err) => warn!(%target, error = %err, "failed to drop stale track"),
            }
        }

        drop(cursor);
        removed
    }

    /// Builds a report of the store, tagged with the current idle state.
    pub fn report(&self) -> Report {
        let snoozed = self.is_idle();
        let mut report = generate_report(&*self.store, self.clock.now());
        report.snoozed = snoozed;
        report
    }

    fn switch(&self, cursor: &mut Cursor, target: FocusTarget, now: DateTime<Utc>) {
        let mut carried = None;

        if let Cursor::Active(current) = &*cursor {
            match self.store.get(current) {
                Ok(mut track) => {
                    track.settle(now);
                    if *current == target {
                        carried = Some(track);
                    } else {
                        debug!(%current, spent = %format_duration(track.spent), "leaving");
                        self.persist(current, &track);
                    }
                }
                Err(err) => {
                    warn!(%current, error = %err, "failed to load track, elapsed time lost");
                }
            }
        }

        let track = match carried {
            Some(track) => Some(track),
            None => self.load_or_create(&target, now),
        };
        if let Some(mut track) = track {
            track.touch(now);
            self.persist(&target, &track);
        }

        *cursor = if cursor.is_idle() {
            Cursor::Snoozed(target)
        } else {
            Cursor::Active(target)
        };
    }

    fn load_or_create(&self, target: &FocusTarget, now: DateTime<Utc>) -> Option<Track> {
        match self.store.get(target) {
            Ok(track) => Some(track),
            Err(StoreError::NotFound(_)) => {
                debug!(%target, "first sighting");
                Some(Track::new(now))
            }
            Err(err) => {
                warn!(%target, error = %err, "failed to load track, not overwriting");
                None
            }
        }
    }

    fn persist(&self, target: &FocusTarget, track: &Track) {
        if let Err(err) = self.store.put(target, track) {
            warn!(%target, error = %err, "failed to store track, update lost");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: TrackStore + ?Sized, C: Clock> FocusEvents for Recorder<S, C> {
    fn update(&self, target: FocusTarget) {
        Self::update(self, target);
    }

    fn snooze(&self, idle: Duration) {
        Self::snooze(self, idle);
    }

    fn wakeup(&self) {
        Self::wakeup(self);
    }
}
