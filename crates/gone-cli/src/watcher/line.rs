//! Focus events read from a line-oriented text stream.
//!
//! One event per line, fields separated by tabs:
//!
//! ```text
//! focus	<category>	<label>
//! idle	<seconds>
//! active
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The label is the
//! rest of the line and may itself contain tabs.

use std::io::BufRead;

use anyhow::Context;
use chrono::Duration;
use gone_core::{FocusEvents, FocusTarget};
use tracing::{debug, warn};

use super::{IdleGate, Watcher};
use crate::shutdown::Shutdown;

/// Reads events from any buffered reader, typically stdin.
#[derive(Debug)]
pub struct LineWatcher<R> {
    reader: R,
}

impl<R: BufRead + Send> LineWatcher<R> {
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineEvent {
    Focus(FocusTarget),
    Idle(Duration),
    Active,
}

fn parse_line(line: &str) -> Result<Option<LineEvent>, String> {
    if line.trim().is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.splitn(3, '\t');
    let event = match fields.next().unwrap_or_default() {
        "focus" => {
            let category = fields.next().ok_or("focus needs a category")?;
            let label = fields.next().ok_or("focus needs a label")?;
            LineEvent::Focus(FocusTarget::new(category, label))
        }
        "idle" => {
            let seconds = fields.next().ok_or("idle needs seconds")?;
            let seconds: u32 = seconds
                .trim()
                .parse()
                .map_err(|err| format!("bad idle seconds {seconds:?}: {err}"))?;
            if fields.next().is_some() {
                return Err("unexpected fields after idle seconds".into());
            }
            LineEvent::Idle(Duration::seconds(i64::from(seconds)))
        }
        "active" => {
            if fields.next().is_some() {
                return Err("unexpected fields after active".into());
            }
            LineEvent::Active
        }
        other => return Err(format!("unknown event {other:?}")),
    };
    Ok(Some(event))
}

impl<R: BufRead + Send> Watcher for LineWatcher<R> {
    fn collect(
        &mut self,
        events: &dyn FocusEvents,
        idle_threshold: Duration,
        shutdown: &Shutdown,
    ) -> anyhow::Result<()> {
        let mut gate = IdleGate::new(idle_threshold);
        let mut line = String::new();
        let mut number = 0usize;

        while !shutdown.is_triggered() {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .context("failed to read focus events")?;
            if read == 0 {
                debug!(lines = number, "end of focus events");
                break;
            }
            number += 1;

            match parse_line(line.trim_end_matches(['\r', '\n'])) {
                Ok(Some(LineEvent::Focus(target))) => gate.focus(events, target),
                Ok(Some(LineEvent::Idle(inactive_for))) => gate.idle_for(events, inactive_for),
                Ok(Some(LineEvent::Active)) => gate.active(events),
                Ok(None) => {}
                Err(message) => warn!(line = number, %message, "skipping malformed event"),
            }
        }

        Ok(())
    }
}
