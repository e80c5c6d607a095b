//! Storage layer for the gone time tracker.
//!
//! [`LogStore`] is a small log-structured key/value store in the style of
//! Bitcask, specialised for [`Track`] values keyed by [`FocusTarget`].
//!
//! # Layout
//!
//! A store is a directory holding:
//! - `LOCK`, held with an exclusive advisory lock while the store is open
//! - numbered segment files (`0000000001.seg`, ...), each an append-only
//!   sequence of frames (see the `codec` module for the byte formats)
//!
//! Exactly one segment, the one with the highest id, receives appends.
//! Once it grows past [`StoreOptions::max_segment_bytes`] it is sealed and
//! a new one is started.
//!
//! # Index
//!
//! The latest location of every live key is kept in memory. Opening the
//! store rebuilds it by replaying segments in id order, so the last frame
//! written for a key wins and delete frames remove it.
//!
//! # Compaction
//!
//! [`TrackStore::compact`] folds every sealed segment into a single merged
//! segment that holds only live values. The copy runs without holding the
//! index lock; writes made meanwhile go to a newer segment and are never
//! overwritten when the index is repointed.
//!
//! # Thread Safety
//!
//! `LogStore` is `Send + Sync`. The index and file handles sit behind one
//! mutex, so reads and writes are serialised; compaction takes that mutex
//! only briefly at the start and at the end.

mod codec;
mod segment;

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use fs2::FileExt;
use gone_core::{CompactionStats, FocusTarget, Keys, StoreError, Track, TrackStore};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{KIND_DELETE, KIND_PUT};
use crate::segment::{Location, Segment};

/// Default segment size before rotation (10 MiB).
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 10 << 20;

const LOCK_FILE: &str = "LOCK";

/// Errors opening a store.
#[derive(Debug, Error)]
pub enum DbError {
    /// Another process holds the store.
    #[error("store at {0} is locked by another process")]
    Locked(PathBuf),
    /// An error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A segment contains an unreadable frame.
    #[error("corrupt segment {segment} at offset {offset}: {message}")]
    Corrupt {
        segment: u64,
        offset: u64,
        message: String,
    },
}

/// Tuning knobs for [`LogStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Size at which the active segment is sealed.
    pub max_segment_bytes: u64,
    /// Whether every append is flushed to disk before returning.
    pub sync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            sync_writes: true,
        }
    }
}

/// Durable [`TrackStore`] backed by an append-only segmented log.
///
/// See the [module documentation](self) for the on-disk format.
#[derive(Debug)]
pub struct LogStore {
    dir: PathBuf,
    options: StoreOptions,
    state: Mutex<State>,
    compaction: Mutex<()>,
    _lock: File,
}

#[derive(Debug)]
struct State {
    keydir: BTreeMap<FocusTarget, Location>,
    active: Segment,
    sealed: BTreeMap<u64, Segment>,
    next_id: u64,
    closed: bool,
}

impl State {
    fn segment(&self, id: u64) -> Option<&Segment> {
        if self.active.id == id {
            Some(&self.active)
        } else {
            self.sealed.get(&id)
        }
    }

    /// Seals the active segment and starts a new one with `id`.
    fn rotate(&mut self, dir: &Path, id: u64) -> io::Result<()> {
        let fresh = Segment::create(dir, id)?;
        let old = std::mem::replace(&mut self.active, fresh);
        old.file.sync_all()?;
        self.sealed.insert(old.id, Segment::open(dir, old.id, false)?);
        Ok(())
    }
}

impl LogStore {
    /// Opens the store in `dir`, creating it if necessary.
    pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> Result<Self, DbError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| DbError::Locked(dir.clone()))?;

        let stale = segment::remove_temp_files(&dir)?;
        if stale > 0 {
            warn!(dir = %dir.display(), stale, "removed leftovers of an interrupted compaction");
        }

        let ids = segment::list_segments(&dir)?;
        let mut keydir = BTreeMap::new();
        for (index, &id) in ids.iter().enumerate() {
            let newest = index + 1 == ids.len();
            replay(&dir, id, newest, &mut keydir)?;
        }

        let (active, sealed, next_id) = match ids.split_last() {
            Some((&last, rest)) => {
                let active = Segment::open(&dir, last, true)?;
                let mut sealed = BTreeMap::new();
                for &id in rest {
                    sealed.insert(id, Segment::open(&dir, id, false)?);
                }
                (active, sealed, last + 1)
            }
            None => (Segment::create(&dir, 1)?, BTreeMap::new(), 2),
        };

        info!(
            dir = %dir.display(),
            keys = keydir.len(),
            segments = sealed.len() + 1,
            "opened track store"
        );

        Ok(Self {
            dir,
            options,
            state: Mutex::new(State {
                keydir,
                active,
                sealed,
                next_id,
                closed: false,
            }),
            compaction: Mutex::new(()),
            _lock: lock,
        })
    }

    /// Directory holding the store files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of segment files currently in use.
    pub fn segment_count(&self) -> usize {
        let state = self.state();
        state.sealed.len() + 1
    }

    /// Flushes the active segment and refuses further operations.
    ///
    /// The directory lock is released when the store is dropped.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.active.file.sync_all()?;
        info!(dir = %self.dir.display(), "closed track store");
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self.state();
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state)
    }

    fn append(&self, state: &mut State, frame: &[u8]) -> Result<Location, StoreError> {
        let frame_len = frame.len() as u64;
        if state.active.len > 0 && state.active.len + frame_len > self.options.max_segment_bytes {
            let id = state.next_id;
            state.rotate(&self.dir, id)?;
            state.next_id += 1;
            debug!(segment = id, "rotated active segment");
        }
        Ok(state.active.append(frame, self.options.sync_writes)?)
    }
}

/// Replays one segment into `keydir`.
fn replay(
    dir: &Path,
    id: u64,
    newest: bool,
    keydir: &mut BTreeMap<FocusTarget, Location>,
) -> Result<(), DbError> {
    let path = segment::segment_path(dir, id);
    let bytes = fs::read(&path)?;
    let scan = segment::scan(&bytes).map_err(|(offset, message)| DbError::Corrupt {
        segment: id,
        offset,
        message,
    })?;

    for &(offset, len, frame) in &scan.frames {
        let target = codec::decode_key(frame.key).map_err(|err| DbError::Corrupt {
            segment: id,
            offset,
            message: err.to_string(),
        })?;
        match frame.kind {
            KIND_PUT => {
                keydir.insert(
                    target,
                    Location {
                        segment: id,
                        offset,
                        len,
                    },
                );
            }
            _ => {
                keydir.remove(&target);
            }
        }
    }

    if scan.trailing > 0 {
        if !newest {
            return Err(DbError::Corrupt {
                segment: id,
                offset: scan.valid_len,
                message: format!("{} bytes of partial frame in a sealed segment", scan.trailing),
            });
        }
        warn!(
            segment = id,
            bytes = scan.trailing,
            "truncating partial frame left by an interrupted write"
        );
        OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_len(scan.valid_len)?;
    }
    Ok(())
}

impl TrackStore for LogStore {
    fn put(&self, target: &FocusTarget, track: &Track) -> Result<(), StoreError> {
        let key = codec::encode_key(target)?;
        let value = codec::encode_track(track)?;
        let frame = codec::encode_frame(KIND_PUT, &key, &value)?;

        let mut state = self.open_state()?;
        let location = self.append(&mut state, &frame)?;
        state.keydir.insert(target.clone(), location);
        Ok(())
    }

    fn get(&self, target: &FocusTarget) -> Result<Track, StoreError> {
        let state = self.open_state()?;
        let location = *state
            .keydir
            .get(target)
            .ok_or_else(|| StoreError::NotFound(target.clone()))?;
        let segment = state.segment(location.segment).ok_or_else(|| {
            StoreError::Corrupt(format!("index points at missing segment {}", location.segment))
        })?;
        let raw = segment.read(location)?;
        drop(state);

        let frame = codec::decode_frame(&raw).map_err(StoreError::Corrupt)?;
        if frame.kind != KIND_PUT {
            return Err(StoreError::Corrupt(format!(
                "index points at a delete frame for {target}"
            )));
        }
        codec::decode_track(frame.value)
    }

    fn has(&self, target: &FocusTarget) -> bool {
        self.state().keydir.contains_key(target)
    }

    fn keys(&self) -> Keys {
        Keys::new(self.state().keydir.keys().cloned().collect())
    }

    fn delete(&self, target: &FocusTarget) -> Result<bool, StoreError> {
        let key = codec::encode_key(target)?;
        let frame = codec::encode_frame(KIND_DELETE, &key, &[])?;

        let mut state = self.open_state()?;
        if !state.keydir.contains_key(target) {
            return Ok(false);
        }
        self.append(&mut state, &frame)?;
        state.keydir.remove(target);
        Ok(true)
    }

    fn compact(&self) -> Result<CompactionStats, StoreError> {
        self.compact_removing(|path| fs::remove_file(path))
    }
}

impl LogStore {
    /// Runs one compaction, deleting folded segments through `remove`.
    fn compact_removing(
        &self,
        remove: impl FnMut(&Path) -> io::Result<()>,
    ) -> Result<CompactionStats, StoreError> {
        let _running = match self.compaction.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("compaction already running");
                return Ok(CompactionStats::default());
            }
        };

        // Seal everything written so far and snapshot the live locations.
        let (merge_id, live, victims) = {
            let mut state = self.open_state()?;
            if state.sealed.is_empty() && state.active.len == 0 {
                return Ok(CompactionStats::default());
            }
            let merge_id = state.next_id;
            let active_id = merge_id + 1;
            state.rotate(&self.dir, active_id)?;
            state.next_id = active_id + 1;

            let live: Vec<(FocusTarget, Location)> = state
                .keydir
                .iter()
                .filter(|(_, location)| location.segment != active_id)
                .map(|(target, location)| (target.clone(), *location))
                .collect();
            // Ascending by id, the order they must be deleted in.
            let victims: Vec<(u64, PathBuf, u64)> = state
                .sealed
                .values()
                .map(|segment| (segment.id, segment.path.clone(), segment.len))
                .collect();
            (merge_id, live, victims)
        };

        let (moved, merged_len) = match self.write_merged(merge_id, &live, &victims) {
            Ok(result) => result,
            Err(err) => {
                let _ = fs::remove_file(segment::temp_path(&self.dir, merge_id));
                return Err(err);
            }
        };

        let merged = if moved.is_empty() {
            None
        } else {
            Some(Segment::open(&self.dir, merge_id, false)?)
        };

        let mut state = self.state();
        if let Some(merged) = merged {
            state.sealed.insert(merge_id, merged);
        }
        let mut repointed = 0;
        for ((target, old), new) in live.iter().zip(&moved) {
            if state.keydir.get(target) == Some(old) {
                state.keydir.insert(target.clone(), *new);
                repointed += 1;
            }
        }
        let (retired, victim_bytes) = retire(&mut state.sealed, &victims, remove);
        drop(state);

        let stats = CompactionStats {
            segments_merged: retired,
            live_records: repointed,
            bytes_reclaimed: victim_bytes.saturating_sub(merged_len),
        };
        info!(
            segments = stats.segments_merged,
            records = stats.live_records,
            reclaimed = stats.bytes_reclaimed,
            "compacted track store"
        );
        Ok(stats)
    }

    /// Copies the live frames into a new segment `merge_id`.
    ///
    /// Runs without the state lock. Reads go through fresh file handles so
    /// they never disturb the cursors used by [`TrackStore::get`].
    fn write_merged(
        &self,
        merge_id: u64,
        live: &[(FocusTarget, Location)],
        victims: &[(u64, PathBuf, u64)],
    ) -> Result<(Vec<Location>, u64), StoreError> {
        if live.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let mut readers: HashMap<u64, File> = HashMap::new();
        for (id, path, _) in victims {
            readers.insert(*id, File::open(path)?);
        }

        let temp = segment::temp_path(&self.dir, merge_id);
        let mut out = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&temp)?;
        let mut moved = Vec::with_capacity(live.len());
        let mut offset = 0u64;
        for (target, location) in live {
            let reader = readers.get(&location.segment).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "{target} points at unknown segment {}",
                    location.segment
                ))
            })?;
            let frame = segment::read_at(reader, *location)?;
            io::Write::write_all(&mut out, &frame)?;
            moved.push(Location {
                segment: merge_id,
                offset,
                len: location.len,
            });
            offset += u64::from(location.len);
        }
        out.sync_all()?;
        drop(out);
        fs::rename(&temp, segment::segment_path(&self.dir, merge_id))?;

        Ok((moved, offset))
    }
}

/// Deletes folded segments oldest first and stops at the first failure.
///
/// A segment that cannot be deleted stays sealed along with every newer
/// one. Replay then still meets any delete frame that shadows its puts, and
/// the next compaction folds them again. Returns how many segments went and
/// their total size.
fn retire(
    sealed: &mut BTreeMap<u64, Segment>,
    victims: &[(u64, PathBuf, u64)],
    mut remove: impl FnMut(&Path) -> io::Result<()>,
) -> (usize, u64) {
    let mut retired = 0;
    let mut bytes = 0;
    for (id, path, len) in victims {
        match remove(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    segment = id,
                    kept = victims.len() - retired,
                    error = %err,
                    "failed to remove compacted segment, keeping it and newer ones"
                );
                break;
            }
        }
        sealed.remove(id);
        retired += 1;
        bytes += len;
    }
    (retired, bytes)
}

impl Drop for LogStore {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close track store cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn track(spent_secs: i64) -> Track {
        let mut track = Track::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        track.spent = Duration::seconds(spent_secs);
        track
    }

    fn target(n: usize) -> FocusTarget {
        FocusTarget::new(format!("class-{}", n % 3), format!("window {n}"))
    }

    fn small_segments() -> StoreOptions {
        StoreOptions {
            max_segment_bytes: 256,
            sync_writes: false,
        }
    }

    #[test]
    fn put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();
        let mut expected = track(30);
        expected.idle = Duration::milliseconds(1500);

        store.put(&target(1), &expected).unwrap();

        assert!(store.has(&target(1)));
        assert_eq!(store.get(&target(1)).unwrap(), expected);
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();

        assert!(!store.has(&target(1)));
        assert!(store.get(&target(1)).unwrap_err().is_not_found());
    }

    #[test]
    fn last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();

        for secs in 1..=5 {
            store.put(&target(1), &track(secs)).unwrap();
        }

        assert_eq!(store.get(&target(1)).unwrap(), track(5));
        assert_eq!(store.keys().count(), 1);
    }

    #[test]
    fn reopen_restores_index() {
        let dir = TempDir::new().unwrap();
        {
            let store = LogStore::open(dir.path(), small_segments()).unwrap();
            for n in 0..20 {
                store.put(&target(n), &track(n as i64)).unwrap();
            }
            store.put(&target(3), &track(300)).unwrap();
            assert!(store.delete(&target(4)).unwrap());
            assert!(store.segment_count() > 1);
        }

        let store = LogStore::open(dir.path(), small_segments()).unwrap();

        assert_eq!(store.keys().count(), 19);
        assert_eq!(store.get(&target(3)).unwrap(), track(300));
        assert_eq!(store.get(&target(7)).unwrap(), track(7));
        assert!(!store.has(&target(4)));
    }

    #[test]
    fn keys_are_sorted_and_restartable() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();
        store.put(&FocusTarget::new("b", "x"), &track(1)).unwrap();
        store.put(&FocusTarget::new("a", "y"), &track(1)).unwrap();

        let first: Vec<_> = store.keys().collect();
        let second: Vec<_> = store.keys().collect();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![FocusTarget::new("a", "y"), FocusTarget::new("b", "x")]
        );
    }

    #[test]
    fn delete_missing_key_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();

        assert!(!store.delete(&target(1)).unwrap());
        let len = fs::metadata(segment::segment_path(dir.path(), 1)).unwrap().len();
        assert_eq!(len, 0);
    }

    #[test]
    fn put_then_compact_then_get() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();
        store.put(&target(1), &track(10)).unwrap();

        store.compact().unwrap();

        assert_eq!(store.get(&target(1)).unwrap(), track(10));
    }

    #[test]
    fn compaction_drops_superseded_frames() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), small_segments()).unwrap();
        for secs in 0..50 {
            store.put(&target(secs as usize % 2), &track(secs)).unwrap();
        }
        store.put(&target(9), &track(9)).unwrap();
        store.delete(&target(9)).unwrap();
        let before = store.segment_count();

        let stats = store.compact().unwrap();

        assert_eq!(stats.segments_merged, before);
        assert_eq!(stats.live_records, 2);
        assert!(stats.bytes_reclaimed > 0);
        // merged segment plus the fresh active one
        assert_eq!(store.segment_count(), 2);
        assert_eq!(store.get(&target(0)).unwrap(), track(48));
        assert_eq!(store.get(&target(1)).unwrap(), track(49));
        assert!(!store.has(&target(9)));
    }

    #[test]
    fn compacted_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LogStore::open(dir.path(), small_segments()).unwrap();
            for n in 0..10 {
                store.put(&target(n), &track(n as i64)).unwrap();
            }
            store.compact().unwrap();
            store.put(&target(2), &track(200)).unwrap();
            store.delete(&target(5)).unwrap();
        }

        let store = LogStore::open(dir.path(), small_segments()).unwrap();

        assert_eq!(store.keys().count(), 9);
        assert_eq!(store.get(&target(2)).unwrap(), track(200));
        assert_eq!(store.get(&target(8)).unwrap(), track(8));
        assert!(!store.has(&target(5)));
    }

    #[test]
    fn compacting_empty_store_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();

        assert_eq!(store.compact().unwrap(), CompactionStats::default());
        assert_eq!(store.segment_count(), 1);
    }

    #[test]
    fn compaction_concurrent_with_writes_keeps_latest_values() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LogStore::open(dir.path(), small_segments()).unwrap());
        for n in 0..8 {
            store.put(&target(n), &track(0)).unwrap();
        }

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 1..=200 {
                    for n in 0..8 {
                        store.put(&target(n), &track(round)).unwrap();
                        assert_eq!(store.get(&target(n)).unwrap(), track(round));
                    }
                }
            })
        };
        let compactor = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..20 {
                    store.compact().unwrap();
                }
            })
        };
        writer.join().unwrap();
        compactor.join().unwrap();
        store.compact().unwrap();

        for n in 0..8 {
            assert_eq!(store.get(&target(n)).unwrap(), track(200));
        }
        drop(store);

        let reopened = LogStore::open(dir.path(), small_segments()).unwrap();
        for n in 0..8 {
            assert_eq!(reopened.get(&target(n)).unwrap(), track(200));
        }
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();
            store.put(&target(1), &track(10)).unwrap();
        }
        let path = segment::segment_path(dir.path(), 1);
        let good_len = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        io::Write::write_all(&mut file, &[0, 0, 0, 40, KIND_PUT, 0]).unwrap();
        drop(file);

        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();

        assert_eq!(store.get(&target(1)).unwrap(), track(10));
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        store.put(&target(2), &track(20)).unwrap();
        drop(store);
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();
        assert_eq!(store.get(&target(2)).unwrap(), track(20));
    }

    #[test]
    fn garbage_in_sealed_segment_is_corrupt() {
        let dir = TempDir::new().unwrap();
        {
            let store = LogStore::open(dir.path(), small_segments()).unwrap();
            for n in 0..10 {
                store.put(&target(n), &track(1)).unwrap();
            }
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(segment::segment_path(dir.path(), 1))
            .unwrap();
        io::Write::write_all(&mut file, &[0, 0, 0, 40]).unwrap();
        drop(file);

        let result = LogStore::open(dir.path(), small_segments());

        assert!(matches!(result, Err(DbError::Corrupt { segment: 1, .. })));
    }

    #[test]
    fn second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let _store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();

        let second = LogStore::open(dir.path(), StoreOptions::default());

        assert!(matches!(second, Err(DbError::Locked(_))));
    }

    #[test]
    fn closed_store_rejects_operations() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();
        store.close().unwrap();

        assert!(matches!(
            store.put(&target(1), &track(1)),
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.get(&target(1)), Err(StoreError::Closed)));
        store.close().unwrap();
    }

    #[test]
    fn interrupted_compaction_output_is_discarded() {
        let dir = TempDir::new().unwrap();
        {
            let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();
            store.put(&target(1), &track(1)).unwrap();
        }
        fs::write(segment::temp_path(dir.path(), 5), b"half a merge").unwrap();

        let store = LogStore::open(dir.path(), StoreOptions::default()).unwrap();

        assert!(!segment::temp_path(dir.path(), 5).exists());
        assert_eq!(store.get(&target(1)).unwrap(), track(1));
    }

    #[test]
    fn segment_that_cannot_be_removed_stays_with_newer_ones() {
        let dir = TempDir::new().unwrap();
        let options = StoreOptions {
            max_segment_bytes: 1,
            sync_writes: false,
        };
        {
            let store = LogStore::open(dir.path(), options).unwrap();
            // One frame per segment: put in 1, delete in 2, put in 3.
            store.put(&target(1), &track(1)).unwrap();
            store.delete(&target(1)).unwrap();
            store.put(&target(2), &track(2)).unwrap();
            let stuck = segment::segment_path(dir.path(), 1);

            let stats = store
                .compact_removing(|path| {
                    if path == stuck.as_path() {
                        Err(io::Error::from(io::ErrorKind::PermissionDenied))
                    } else {
                        fs::remove_file(path)
                    }
                })
                .unwrap();

            assert_eq!(stats.segments_merged, 0);
            assert_eq!(stats.live_records, 1);
            // 1..=3 kept, merged 4, active 5
            assert_eq!(store.segment_count(), 5);
            assert!(segment::segment_path(dir.path(), 2).exists());
        }

        let store = LogStore::open(dir.path(), options).unwrap();
        assert!(!store.has(&target(1)));
        assert_eq!(store.get(&target(2)).unwrap(), track(2));

        let stats = store.compact().unwrap();

        // the leftovers, the first merge and the empty active segment
        assert_eq!(stats.segments_merged, 5);
        assert_eq!(store.segment_count(), 2);
        for id in 1..=3 {
            assert!(!segment::segment_path(dir.path(), id).exists());
        }
        assert!(!store.has(&target(1)));
        assert_eq!(store.get(&target(2)).unwrap(), track(2));
    }
}
