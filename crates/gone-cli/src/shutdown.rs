//! Cooperative shutdown signal shared by the watcher and maintenance tasks.

use tokio::sync::watch;

/// Sending half; triggering it asks every [`Shutdown`] holder to stop.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half, cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Creates a linked trigger and signal.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// Whether shutdown was requested. Usable from blocking threads.
    ///
    /// A dropped trigger counts as a request.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Completes once shutdown is requested.
    pub async fn triggered(&mut self) {
        // Err means the trigger is gone, which also ends the wait.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
