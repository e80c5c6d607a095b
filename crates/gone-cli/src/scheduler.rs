//! Periodic maintenance while tracking: flushing, compaction and reports.
//!
//! Each job runs on its own tokio task driven by an interval. The first
//! tick is skipped, so nothing runs at startup. Missed ticks are delayed
//! rather than bursted. Jobs touch the disk, so every run goes to the
//! blocking pool. Every task stops at the next shutdown signal; a tick that
//! already started finishes first.

use std::sync::Arc;
use std::time::Duration;

use gone_core::{Clock, Recorder, TrackStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::shutdown::Shutdown;
use crate::writer::ReportWriter;

/// How often each maintenance job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub flush_every: Duration,
    pub compact_every: Duration,
    pub report_every: Duration,
    /// Tracks not seen for longer than this are dropped before compacting.
    pub retention: Option<chrono::Duration>,
}

/// Handle to the running maintenance tasks.
pub struct Maintenance<S: ?Sized, C> {
    recorder: Arc<Recorder<S, C>>,
    writer: Option<ReportWriter>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S, C> Maintenance<S, C>
where
    S: TrackStore + ?Sized + 'static,
    C: Clock + 'static,
{
    /// Starts the flush, compaction and report tasks.
    ///
    /// The report task only runs when a `writer` is given.
    pub fn spawn(
        recorder: Arc<Recorder<S, C>>,
        writer: Option<ReportWriter>,
        schedule: Schedule,
        shutdown: &Shutdown,
    ) -> Self {
        let mut tasks = Vec::with_capacity(3);

        let flusher = Arc::clone(&recorder);
        tasks.push(every("flush", schedule.flush_every, shutdown.clone(), move || {
            flusher.flush();
        }));

        let compactor = Arc::clone(&recorder);
        tasks.push(every("compact", schedule.compact_every, shutdown.clone(), move || {
            compact(&compactor, schedule.retention);
        }));

        if let Some(writer) = writer.clone() {
            let reporter = Arc::clone(&recorder);
            tasks.push(every("report", schedule.report_every, shutdown.clone(), move || {
                write_report(&reporter, &writer);
            }));
        }

        Self {
            recorder,
            writer,
            tasks,
        }
    }

    /// Waits for every task to stop, then flushes and writes a last report.
    ///
    /// Shutdown must have been triggered, otherwise this waits forever.
    pub async fn finish(self) {
        let Self {
            recorder,
            writer,
            tasks,
        } = self;
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "maintenance task failed");
            }
        }

        let last = tokio::task::spawn_blocking(move || {
            recorder.flush();
            if let Some(writer) = &writer {
                write_report(&recorder, writer);
            }
        });
        if let Err(err) = last.await {
            warn!(error = %err, "final flush failed");
        }
        debug!("maintenance finished");
    }
}

fn every<F>(name: &'static str, period: Duration, mut shutdown: Shutdown, job: F) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    let job = Arc::new(job);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    debug!(task = name, "running");
                    let job = Arc::clone(&job);
                    if let Err(err) = tokio::task::spawn_blocking(move || job()).await {
                        warn!(task = name, error = %err, "maintenance job failed");
                    }
                }
            }
        }
        debug!(task = name, "stopped");
    })
}

fn compact<S, C>(recorder: &Recorder<S, C>, retention: Option<chrono::Duration>)
where
    S: TrackStore + ?Sized,
    C: Clock,
{
    if let Some(retention) = retention {
        let removed = recorder.sweep(retention);
        if removed > 0 {
            info!(removed, "dropped stale tracks");
        }
    }

    if let Err(err) = recorder.store().compact() {
        warn!(error = %err, "compaction failed");
    }
}

fn write_report<S, C>(recorder: &Recorder<S, C>, writer: &ReportWriter)
where
    S: TrackStore + ?Sized,
    C: Clock,
{
    let report = recorder.report();
    if let Err(err) = writer.write(&report) {
        warn!("failed to write report: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use gone_core::{FocusTarget, ManualClock, MemoryStore, Track};
    use tempfile::TempDir;

    use crate::shutdown;
    use crate::writer::read_report;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn schedule() -> Schedule {
        Schedule {
            flush_every: Duration::from_secs(30),
            compact_every: Duration::from_secs(3600),
            report_every: Duration::from_secs(60),
            retention: None,
        }
    }

    fn setup() -> (
        Arc<MemoryStore>,
        Arc<ManualClock>,
        Arc<Recorder<MemoryStore, Arc<ManualClock>>>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let recorder = Arc::new(Recorder::with_clock(
            Arc::clone(&store),
            Arc::clone(&clock),
        ));
        (store, clock, recorder)
    }

    fn target(label: &str) -> FocusTarget {
        FocusTarget::new("xterm", label)
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_flush_settles_current_target() {
        let (store, clock, recorder) = setup();
        let (trigger, signal) = shutdown::channel();
        recorder.update(target("vim"));

        let maintenance = Maintenance::spawn(Arc::clone(&recorder), None, schedule(), &signal);
        clock.advance(chrono::Duration::seconds(10));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(
            store.get(&target("vim")).unwrap().spent,
            chrono::Duration::seconds(10)
        );

        clock.advance(chrono::Duration::seconds(5));
        trigger.trigger();
        maintenance.finish().await;

        assert_eq!(
            store.get(&target("vim")).unwrap().spent,
            chrono::Duration::seconds(15)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reports_skip_startup_and_finish_writes_a_last_one() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::in_dir(dir.path());
        let (_store, clock, recorder) = setup();
        let (trigger, signal) = shutdown::channel();
        recorder.update(target("vim"));

        let maintenance =
            Maintenance::spawn(Arc::clone(&recorder), Some(writer.clone()), schedule(), &signal);
        tokio::task::yield_now().await;
        assert!(!writer.path().exists());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(writer.path().exists());

        clock.advance(chrono::Duration::minutes(2));
        trigger.trigger();
        maintenance.finish().await;

        let report = read_report(writer.path()).unwrap();
        assert_eq!(report.total, chrono::Duration::minutes(2));
        assert_eq!(report.records[0].label, "vim");
    }

    #[tokio::test(start_paused = true)]
    async fn compaction_sweeps_stale_tracks_but_keeps_current() {
        let (store, clock, recorder) = setup();
        let (trigger, signal) = shutdown::channel();

        let mut old = Track::new(t0() - chrono::Duration::hours(2));
        old.spent = chrono::Duration::minutes(1);
        store.put(&target("old"), &old).unwrap();
        store
            .put(&target("recent"), &Track::new(t0() + chrono::Duration::minutes(150)))
            .unwrap();
        recorder.update(target("current"));
        clock.set(t0() + chrono::Duration::hours(3));

        let schedule = Schedule {
            flush_every: Duration::from_secs(86_400),
            compact_every: Duration::from_secs(60),
            retention: Some(chrono::Duration::hours(1)),
            ..schedule()
        };
        let maintenance = Maintenance::spawn(Arc::clone(&recorder), None, schedule, &signal);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!store.has(&target("old")));
        assert!(store.has(&target("recent")));
        assert!(store.has(&target("current")));

        trigger.trigger();
        maintenance.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_run_off_the_runtime_thread() {
        let (trigger, signal) = shutdown::channel();
        let threads = Arc::new(std::sync::Mutex::new(Vec::new()));

        let seen = Arc::clone(&threads);
        let task = every("tick", Duration::from_secs(10), signal, move || {
            seen.lock().unwrap().push(std::thread::current().id());
        });
        tokio::time::sleep(Duration::from_secs(25)).await;
        trigger.trigger();
        task.await.unwrap();

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != std::thread::current().id()));
    }
}
