//! The keyed store the recorder writes tracks into.
//!
//! [`TrackStore`] is the seam between accounting and persistence. The
//! durable implementation lives in `gone-db`; [`MemoryStore`] backs tests
//! and anything else that does not need to survive a restart.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::{FocusTarget, Track};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No track has been stored for this target yet.
    #[error("no track stored for {0}")]
    NotFound(FocusTarget),
    /// Reading or appending to the underlying files failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored value could not be encoded or decoded.
    #[error("track codec error: {0}")]
    Codec(String),
    /// The on-disk data is inconsistent.
    #[error("corrupt store: {0}")]
    Corrupt(String),
    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Sealed segments folded into the merged segment.
    pub segments_merged: usize,
    /// Live records copied into the merged segment.
    pub live_records: usize,
    /// Bytes of superseded or deleted frames dropped.
    pub bytes_reclaimed: u64,
}

/// Durable keyed storage of tracks.
///
/// All operations take `&self`; implementations are shared between the
/// recorder, the maintenance tasks and report generation, and must tolerate
/// [`compact`](TrackStore::compact) running concurrently with everything
/// else without losing the latest value of any key.
pub trait TrackStore: Send + Sync {
    /// Stores `track` under `target`, replacing any previous value.
    fn put(&self, target: &FocusTarget, track: &Track) -> Result<(), StoreError>;

    /// Returns the stored track, or [`StoreError::NotFound`].
    fn get(&self, target: &FocusTarget) -> Result<Track, StoreError>;

    /// Whether a track exists for `target`, without decoding it.
    fn has(&self, target: &FocusTarget) -> bool;

    /// All targets currently stored, in target order.
    ///
    /// The iterator walks a snapshot taken at call time. Call again for a
    /// fresh sequence.
    fn keys(&self) -> Keys;

    /// Removes the track for `target`. Returns whether one existed.
    fn delete(&self, target: &FocusTarget) -> Result<bool, StoreError>;

    /// Reclaims space taken by superseded values.
    fn compact(&self) -> Result<CompactionStats, StoreError>;
}

/// Iterator over a snapshot of store keys.
#[derive(Debug)]
pub struct Keys {
    inner: std::vec::IntoIter<FocusTarget>,
}

impl Keys {
    pub fn new(targets: Vec<FocusTarget>) -> Self {
        Self {
            inner: targets.into_iter(),
        }
    }
}

impl Iterator for Keys {
    type Item = FocusTarget;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Keys {}

/// In-memory [`TrackStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tracks: Mutex<BTreeMap<FocusTarget, Track>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tracks(&self) -> MutexGuard<'_, BTreeMap<FocusTarget, Track>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TrackStore for MemoryStore {
    fn put(&self, target: &FocusTarget, track: &Track) -> Result<(), StoreError> {
        self.tracks().insert(target.clone(), *track);
        Ok(())
    }

    fn get(&self, target: &FocusTarget) -> Result<Track, StoreError> {
        self.tracks()
            .get(target)
            .copied()
            .ok_or_else(|| StoreError::NotFound(target.clone()))
    }

    fn has(&self, target: &FocusTarget) -> bool {
        self.tracks().contains_key(target)
    }

    fn keys(&self) -> Keys {
        Keys::new(self.tracks().keys().cloned().collect())
    }

    fn delete(&self, target: &FocusTarget) -> Result<bool, StoreError> {
        Ok(self.tracks().remove(target).is_some())
    }

    fn compact(&self) -> Result<CompactionStats, StoreError> {
        Ok(CompactionStats::default())
    }
}
