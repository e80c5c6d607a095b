//! Identity of the thing being timed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A focus target: the window (or anything else) that currently holds the
/// user's attention.
///
/// Targets compare structurally and are ordered by category, then label.
/// They are the keys of every [`TrackStore`](crate::TrackStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FocusTarget {
    /// Coarse grouping, e.g. the X11 `WM_CLASS` of a window.
    pub category: String,
    /// Fine-grained label, e.g. the window title.
    pub label: String,
}

impl FocusTarget {
    pub fn new(category: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for FocusTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.label)
    }
}
