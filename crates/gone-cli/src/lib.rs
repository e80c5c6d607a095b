//! Command-line front end for the gone time tracker.
//!
//! Wires a focus watcher to the recorder, runs periodic maintenance while
//! tracking, and provides the report and compact commands.

mod cli;
pub mod commands;
mod config;
pub mod period;
pub mod scheduler;
pub mod shutdown;
pub mod watcher;
pub mod writer;

pub use cli::{Cli, Commands};
pub use config::Config;
