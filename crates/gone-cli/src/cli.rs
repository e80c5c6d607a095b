//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Where has my time gone?
///
/// Records how long each window keeps your focus, separates idle time from
/// engaged time, and reports the totals per week.
#[derive(Debug, Parser)]
#[command(name = "gone", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory root (one store per ISO week lives below it).
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track window focus until interrupted (the default).
    Track {
        /// X11 display to watch. Defaults to $DISPLAY.
        #[arg(long)]
        display: Option<String>,

        /// Read focus events from stdin instead of X11.
        ///
        /// One event per line, tab separated: `focus <category> <label>`,
        /// `idle <seconds>` or `active`.
        #[arg(long)]
        stdin: bool,
    },

    /// Print the report for a week.
    Report {
        /// Output JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Report on last week instead of this week.
        #[arg(long)]
        last_week: bool,
    },

    /// Compact a week's store once.
    Compact {
        /// Compact last week's store instead of this week's.
        #[arg(long)]
        last_week: bool,
    },
}
