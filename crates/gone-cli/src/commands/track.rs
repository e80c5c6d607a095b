//! Track command: record window focus until interrupted.

use std::io::{self, BufReader};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use gone_core::Recorder;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::open_store;
use crate::Config;
use crate::period::{self, Week};
use crate::scheduler::Maintenance;
use crate::shutdown;
use crate::watcher::{LineWatcher, Watcher};
use crate::writer::ReportWriter;

/// How long to wait for the watcher to notice shutdown after Ctrl-C.
const WATCHER_GRACE: Duration = Duration::from_secs(2);

pub async fn run(config: &Config, display: Option<&str>, stdin: bool) -> Result<()> {
    let dir = period::week_dir(&config.data_dir, Week::This, Local::now().date_naive());

    let mut watcher = if stdin {
        Box::new(LineWatcher::new(BufReader::new(io::stdin()))) as Box<dyn Watcher>
    } else {
        x11_watcher(display, config)?
    };

    let store = Arc::new(open_store(
        &dir,
        config,
        "another `gone track` is already recording this week",
    )?);
    let recorder = Arc::new(Recorder::new(Arc::clone(&store)));
    let (trigger, shutdown) = shutdown::channel();

    let (done_tx, mut done_rx) = oneshot::channel();
    let events = Arc::clone(&recorder);
    let watcher_shutdown = shutdown.clone();
    let idle_threshold = config.idle_threshold();
    thread::Builder::new()
        .name("watcher".into())
        .spawn(move || {
            let result = watcher.collect(&*events, idle_threshold, &watcher_shutdown);
            let _ = done_tx.send(result);
        })
        .context("failed to start watcher thread")?;

    let maintenance = Maintenance::spawn(
        Arc::clone(&recorder),
        Some(ReportWriter::in_dir(&dir)),
        config.schedule(),
        &shutdown,
    );
    info!(dir = %dir.display(), "tracking");

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "failed to listen for Ctrl-C");
            }
            info!("interrupted, shutting down");
            None
        }
        result = &mut done_rx => Some(result),
    };

    trigger.trigger();
    let finished = match finished {
        Some(result) => Some(result),
        // A watcher blocked on input may never return; the process exits
        // without it.
        None => tokio::time::timeout(WATCHER_GRACE, done_rx).await.ok(),
    };

    maintenance.finish().await;
    store.close().context("failed to close track store")?;
    info!("tracking stopped");

    match finished {
        Some(Ok(result)) => result.context("focus watcher failed"),
        Some(Err(_)) => Err(anyhow!("focus watcher thread panicked")),
        None => Ok(()),
    }
}

#[cfg(target_os = "linux")]
fn x11_watcher(display: Option<&str>, config: &Config) -> Result<Box<dyn Watcher>> {
    let watcher = crate::watcher::X11Watcher::connect(display, config.poll_interval())?;
    Ok(Box::new(watcher))
}

#[cfg(not(target_os = "linux"))]
fn x11_watcher(_display: Option<&str>, _config: &Config) -> Result<Box<dyn Watcher>> {
    anyhow::bail!("X11 tracking is only available on Linux; use --stdin")
}
