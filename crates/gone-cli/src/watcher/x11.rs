//! X11 focus watcher.
//!
//! Polls the window manager's `_NET_ACTIVE_WINDOW`, names the window by the
//! class part of `WM_CLASS` and its `_NET_WM_NAME` title, and reads user
//! inactivity from the MIT-SCREEN-SAVER extension.

use std::thread;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use gone_core::{FocusEvents, FocusTarget};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::screensaver;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use super::{IdleGate, Watcher};
use crate::shutdown::Shutdown;

/// Longest property value read, in 32-bit units.
const PROPERTY_LEN: u32 = 1024;

struct Atoms {
    net_active_window: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
}

/// Watches the focused window of an X display.
pub struct X11Watcher {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
    poll_interval: StdDuration,
    idle_unavailable: bool,
}

impl X11Watcher {
    /// Connects to `display`, or to `$DISPLAY` when `None`.
    pub fn connect(display: Option<&str>, poll_interval: StdDuration) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display).with_context(|| {
            format!(
                "failed to connect to X display {}",
                display.unwrap_or("from $DISPLAY")
            )
        })?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .with_context(|| format!("X server has no screen {screen_num}"))?;

        let atoms = Atoms {
            net_active_window: intern(&conn, "_NET_ACTIVE_WINDOW")?,
            net_wm_name: intern(&conn, "_NET_WM_NAME")?,
            utf8_string: intern(&conn, "UTF8_STRING")?,
        };
        info!(screen = screen_num, "connected to X server");

        Ok(Self {
            conn,
            root,
            atoms,
            poll_interval,
            idle_unavailable: false,
        })
    }

    fn active_window(&self) -> Result<Option<Window>> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                0,
                1,
            )?
            .reply()?;
        Ok(reply
            .value32()
            .and_then(|mut windows| windows.next())
            .filter(|&window| window != x11rb::NONE))
    }

    /// Raw value of a window property. Windows may vanish between polls,
    /// so errors read as an absent property.
    fn property(&self, window: Window, property: Atom, kind: Atom) -> Option<Vec<u8>> {
        let reply = self
            .conn
            .get_property(false, window, property, kind, 0, PROPERTY_LEN)
            .ok()?
            .reply()
            .ok()?;
        (!reply.value.is_empty()).then_some(reply.value)
    }

    fn target(&self, window: Window) -> Option<FocusTarget> {
        let class = self.property(window, AtomEnum::WM_CLASS.into(), AtomEnum::STRING.into())?;
        let title = self
            .property(window, self.atoms.net_wm_name, self.atoms.utf8_string)
            .or_else(|| self.property(window, AtomEnum::WM_NAME.into(), AtomEnum::ANY.into()))
            .unwrap_or_default();

        Some(FocusTarget::new(
            class_name(&class),
            String::from_utf8_lossy(&title).into_owned(),
        ))
    }

    fn inactive_for(&mut self) -> Duration {
        if self.idle_unavailable {
            return Duration::zero();
        }
        let info = screensaver::query_info(&self.conn, self.root)
            .map_err(anyhow::Error::from)
            .and_then(|cookie| cookie.reply().map_err(anyhow::Error::from));
        match info {
            Ok(info) => Duration::milliseconds(i64::from(info.ms_since_user_input)),
            Err(err) => {
                warn!(error = %err, "screen saver extension unavailable, idle time not tracked");
                self.idle_unavailable = true;
                Duration::zero()
            }
        }
    }
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    let reply = conn
        .intern_atom(false, name.as_bytes())
        .map_err(anyhow::Error::from)
        .and_then(|cookie| cookie.reply().map_err(anyhow::Error::from))
        .with_context(|| format!("failed to intern atom {name}"))?;
    Ok(reply.atom)
}

/// The class half of a `WM_CLASS` value (`instance\0class\0`), or the
/// instance when no class is set.
fn class_name(raw: &[u8]) -> String {
    let mut parts = raw.split(|&byte| byte == 0).filter(|part| !part.is_empty());
    let instance = parts.next();
    let class = parts.next().or(instance).unwrap_or_default();
    String::from_utf8_lossy(class).into_owned()
}

impl Watcher for X11Watcher {
    fn collect(
        &mut self,
        events: &dyn FocusEvents,
        idle_threshold: Duration,
        shutdown: &Shutdown,
    ) -> Result<()> {
        let mut gate = IdleGate::new(idle_threshold);

        while !shutdown.is_triggered() {
            let window = self
                .active_window()
                .context("failed to query the active window")?;
            let target = window.and_then(|window| self.target(window));
            if window.is_some() && target.is_none() {
                debug!(?window, "active window has no class");
            }

            let inactive_for = self.inactive_for();
            gate.observe(events, target, inactive_for);

            thread::sleep(self.poll_interval);
        }

        Ok(())
    }
}
