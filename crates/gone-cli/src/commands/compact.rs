//! Compact command: merge a week's segments once.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use gone_core::TrackStore;

use super::open_store;
use crate::Config;
use crate::period::{self, Week};

pub fn run<W: Write>(writer: &mut W, config: &Config, week: Week, today: NaiveDate) -> Result<()> {
    let dir = period::week_dir(&config.data_dir, week, today);
    if !dir.exists() {
        bail!("no store at {}", dir.display());
    }

    let store = open_store(&dir, config, "is `gone track` running? stop it first")?;
    let before = store.segment_count();
    let stats = store.compact().context("compaction failed")?;
    let after = store.segment_count();
    store.close().context("failed to close track store")?;

    writeln!(writer, "Compacted {}", dir.display())?;
    writeln!(writer, "Segments:        {before} -> {after}")?;
    writeln!(writer, "Merged:          {}", stats.segments_merged)?;
    writeln!(writer, "Live records:    {}", stats.live_records)?;
    writeln!(writer, "Bytes reclaimed: {}", stats.bytes_reclaimed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone, Utc};
    use gone_core::{FocusTarget, Track};
    use gone_db::{LogStore, StoreOptions};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
    }

    #[test]
    fn compacts_superseded_frames() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("2024-w10");
        let options = StoreOptions {
            max_segment_bytes: 1,
            sync_writes: false,
        };
        let target = FocusTarget::new("xterm", "vim");
        {
            let store = LogStore::open(&dir, options).unwrap();
            let mut track = Track::new(Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap());
            for minutes in 1..=3 {
                track.spent = Duration::minutes(minutes);
                store.put(&target, &track).unwrap();
            }
            assert_eq!(store.segment_count(), 3);
        }
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };

        let mut out = Vec::new();
        run(&mut out, &config, Week::This, today()).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Segments:        3 -> 2"), "{out}");
        assert!(out.contains("Merged:          3"), "{out}");
        assert!(out.contains("Live records:    1"), "{out}");

        let store = LogStore::open(&dir, options).unwrap();
        assert_eq!(store.get(&target).unwrap().spent, Duration::minutes(3));
    }

    #[test]
    fn missing_week_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };

        let err = run(&mut Vec::new(), &config, Week::Last, today()).unwrap_err();

        assert!(err.to_string().contains("2024-w09"));
    }
}
