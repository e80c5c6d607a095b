//! Mapping dates to per-week store directories.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Days, NaiveDate};

/// Which week a command works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Week {
    This,
    Last,
}

impl Week {
    pub const fn from_flag(last_week: bool) -> Self {
        if last_week { Self::Last } else { Self::This }
    }

    /// A date inside this week, relative to `today`.
    pub fn date(self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::This => today,
            Self::Last => today.checked_sub_days(Days::new(7)).unwrap_or(today),
        }
    }
}

/// Directory name for the ISO week containing `date`, e.g. `2024-w09`.
pub fn week_dir_name(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-w{:02}", week.year(), week.week())
}

/// Store directory for `week` under `root`.
pub fn week_dir(root: &Path, week: Week, today: NaiveDate) -> PathBuf {
    root.join(week_dir_name(week.date(today)))
}
