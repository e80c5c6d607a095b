//! Report command: print a week's totals.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use gone_core::{MemoryStore, Report, generate_report, render_text};
use gone_db::{DbError, LogStore};
use tracing::info;

use crate::Config;
use crate::period::{self, Week};
use crate::writer::{REPORT_FILE, read_report};

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    week: Week,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let today = now.with_timezone(&Local).date_naive();
    let dir = period::week_dir(&config.data_dir, week, today);
    let report = load(&dir, config, now)?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &report).context("failed to write JSON")?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", render_text(&report))?;
    }
    Ok(())
}

/// Builds the report from the store, or from the tracker's last
/// `report.json` while a tracker holds the store.
fn load(dir: &Path, config: &Config, now: DateTime<Utc>) -> Result<Report> {
    if !dir.exists() {
        return Ok(generate_report(&MemoryStore::new(), now));
    }

    match LogStore::open(dir, config.store_options()) {
        Ok(store) => {
            let report = generate_report(&store, now);
            store.close().context("failed to close track store")?;
            Ok(report)
        }
        Err(DbError::Locked(_)) => {
            let path = dir.join(REPORT_FILE);
            info!(path = %path.display(), "store in use by a running tracker, reading its report");
            read_report(&path).context("store is in use and the tracker has not written a report yet")
        }
        Err(err) => Err(err).with_context(|| format!("failed to open store {}", dir.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use gone_core::{FocusTarget, Track, TrackStore};
    use gone_db::StoreOptions;
    use insta::assert_snapshot;

    use crate::writer::ReportWriter;

    /// Wednesday noon, inside ISO week 2024-w10 in every time zone.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()
    }

    fn config(root: &Path) -> Config {
        Config {
            data_dir: root.to_path_buf(),
            ..Config::default()
        }
    }

    fn seed(dir: &Path) {
        let store = LogStore::open(dir, StoreOptions::default()).unwrap();
        for (category, label, minutes) in [("xterm", "vim", 50), ("Firefox", "Inbox", 10)] {
            let mut track = Track::new(now());
            track.spent = Duration::minutes(minutes);
            store
                .put(&FocusTarget::new(category, label), &track)
                .unwrap();
        }
        store.close().unwrap();
    }

    fn output(config: &Config, week: Week, json: bool) -> String {
        let mut out = Vec::new();
        run(&mut out, config, week, json, now()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_report_for_this_week() {
        let temp = tempfile::tempdir().unwrap();
        seed(&temp.path().join("2024-w10"));

        assert_snapshot!(output(&config(temp.path()), Week::This, false), @r"
        TIME REPORT: 2024-03-06 12:00 UTC

        BY CLASS
        ────────
        xterm                      50m 0s   83.3%
        Firefox                    10m 0s   16.7%

        BY WINDOW
        ─────────
        xterm                    vim                                50m 0s  idle 0s
        Firefox                  Inbox                              10m 0s  idle 0s

        SUMMARY
        ───────
        Total tracked:  1h 0m
        Idle:           0s
        Status:         active
        ");
    }

    #[test]
    fn last_week_without_store_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        seed(&temp.path().join("2024-w10"));

        let text = output(&config(temp.path()), Week::Last, false);

        assert!(text.contains("No activity recorded yet."));
        assert!(!temp.path().join("2024-w09").exists());
    }

    #[test]
    fn json_report_has_nanosecond_totals() {
        let temp = tempfile::tempdir().unwrap();
        seed(&temp.path().join("2024-w10"));

        let json: serde_json::Value =
            serde_json::from_str(&output(&config(temp.path()), Week::This, true)).unwrap();

        assert_eq!(json["total_ns"], 3_600_000_000_000_i64);
        assert_eq!(json["records"][0]["label"], "vim");
    }

    #[test]
    fn locked_store_falls_back_to_written_report() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("2024-w10");
        seed(&dir);
        let running = LogStore::open(&dir, StoreOptions::default()).unwrap();
        let mut written = generate_report(&running, now());
        written.snoozed = true;
        ReportWriter::in_dir(&dir).write(&written).unwrap();

        let text = output(&config(temp.path()), Week::This, false);

        assert!(text.contains("Status:         away from keyboard"));
        drop(running);
    }

    #[test]
    fn locked_store_without_report_fails() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("2024-w10");
        let _running = LogStore::open(&dir, StoreOptions::default()).unwrap();

        let err = run(&mut Vec::new(), &config(temp.path()), Week::This, false, now()).unwrap_err();

        assert!(format!("{err:#}").contains("has not written a report"));
    }
}
