//! Core domain logic for the gone time tracker.
//!
//! This crate contains:
//! - Focus targets and the tracks accumulated for them
//! - The [`TrackStore`] seam and an in-memory implementation
//! - The [`Recorder`] state machine that turns focus and idle events into
//!   tracks
//! - Report aggregation over a store

mod clock;
mod recorder;
pub mod report;
mod store;
mod target;
mod track;

pub use clock::{Clock, ManualClock, SystemClock};
pub use recorder::{Cursor, FocusEvents, Recorder};
pub use report::{Class, Record, Report, format_duration, generate_report, render_text};
pub use store::{CompactionStats, Keys, MemoryStore, StoreError, TrackStore};
pub use target::FocusTarget;
pub use track::Track;
