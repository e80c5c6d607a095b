//! Aggregation of stored tracks into a usage report.
//!
//! A report is a read-only projection of the store at the time it was
//! generated. Keys are enumerated and fetched one by one, so a report is
//! advisory: writes that land during the walk may or may not be included.

use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::TrackStore;

/// One stored target with its totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub category: String,
    pub label: String,
    #[serde(rename = "spent_ns", with = "nanos")]
    pub spent: Duration,
    #[serde(rename = "idle_ns", with = "nanos")]
    pub idle: Duration,
    pub seen: DateTime<Utc>,
}

/// Engaged time summed over all targets of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub category: String,
    #[serde(rename = "spent_ns", with = "nanos")]
    pub spent: Duration,
    /// Share of the report total, 0-100.
    pub percent: f64,
}

/// Aggregated view of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    /// Records sorted by spent time, largest first.
    pub records: Vec<Record>,
    /// Classes sorted by spent time, largest first.
    pub classes: Vec<Class>,
    #[serde(rename = "total_ns", with = "nanos")]
    pub total: Duration,
    #[serde(rename = "idle_ns", with = "nanos")]
    pub idle: Duration,
    /// Whether the user was away from the keyboard when the report was taken.
    pub snoozed: bool,
}

/// Durations as whole nanoseconds, the resolution tracks are kept at.
mod nanos {
    use chrono::Duration;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = duration
            .num_nanoseconds()
            .ok_or_else(|| S::Error::custom(format!("duration out of range: {duration}")))?;
        serializer.serialize_i64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::nanoseconds)
    }
}

/// Builds a report from everything currently in `store`.
///
/// Records that fail to load are skipped with a warning. Sorting is stable,
/// so records with equal spent time keep key order and classes keep the
/// order in which their category was first seen.
pub fn generate_report<S: TrackStore + ?Sized>(store: &S, generated_at: DateTime<Utc>) -> Report {
    let mut records = Vec::new();
    let mut classes: Vec<Class> = Vec::new();
    let mut class_index: HashMap<String, usize> = HashMap::new();
    let mut total = Duration::zero();
    let mut idle = Duration::zero();

    for target in store.keys() {
        let track = match store.get(&target) {
            Ok(track) => track,
            Err(err) => {
                tracing::warn!(%target, error = %err, "skipping unreadable track in report");
                continue;
            }
        };

        total += track.spent;
        idle += track.idle;

        let index = *class_index.entry(target.category.clone()).or_insert_with(|| {
            classes.push(Class {
                category: target.category.clone(),
                spent: Duration::zero(),
                percent: 0.0,
            });
            classes.len() - 1
        });
        classes[index].spent += track.spent;

        records.push(Record {
            category: target.category,
            label: target.label,
            spent: track.spent,
            idle: track.idle,
            seen: track.seen,
        });
    }

    for class in &mut classes {
        class.percent = percent_of(class.spent, total);
    }

    records.sort_by(|a, b| b.spent.cmp(&a.spent));
    classes.sort_by(|a, b| b.spent.cmp(&a.spent));

    Report {
        generated_at,
        records,
        classes,
        total,
        idle,
        snoozed: false,
    }
}

fn percent_of(part: Duration, total: Duration) -> f64 {
    if total <= Duration::zero() {
        return 0.0;
    }
    100.0 * seconds(part) / seconds(total)
}

#[allow(clippy::cast_precision_loss)]
fn seconds(duration: Duration) -> f64 {
    duration.num_seconds() as f64 + f64::from(duration.subsec_nanos()) / 1e9
}

/// Formats a duration for humans, truncated to whole seconds.
///
/// Returns "Xh Ym" from one hour up, "Xm Ys" from one minute up, "Xs"
/// otherwise. Negative durations render as "0s".
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else if minutes >= 1 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}

/// Renders a report as plain text.
pub fn render_text(report: &Report) -> String {
    let mut output = String::new();

    writeln!(
        output,
        "TIME REPORT: {}",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    )
    .unwrap();

    if report.records.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "No activity recorded yet.").unwrap();
        return output;
    }

    writeln!(output).unwrap();
    writeln!(output, "BY CLASS").unwrap();
    writeln!(output, "────────").unwrap();
    for class in &report.classes {
        writeln!(
            output,
            "{:<24} {:>8} {:>6.1}%",
            truncate(&class.category, 24),
            format_duration(class.spent),
            class.percent
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "BY WINDOW").unwrap();
    writeln!(output, "─────────").unwrap();
    for record in &report.records {
        writeln!(
            output,
            "{:<24} {:<32} {:>8}  idle {}",
            truncate(&record.category, 24),
            truncate(&record.label, 32),
            format_duration(record.spent),
            format_duration(record.idle)
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(output, "───────").unwrap();
    writeln!(output, "Total tracked:  {}", format_duration(report.total)).unwrap();
    writeln!(output, "Idle:           {}", format_duration(report.idle)).unwrap();
    let status = if report.snoozed {
        "away from keyboard"
    } else {
        "active"
    };
    writeln!(output, "Status:         {status}").unwrap();

    output
}
