use crate::harvester::Harvester;
use crate::persistence::Persistence;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Runs the harvester in the background: once at start, then every
/// `interval`, until shut down.
pub struct HarvestService {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    persistence: Arc<Persistence>,
}

impl HarvestService {
    pub fn spawn(harvester: Harvester, interval: Duration, persistence: Arc<Persistence>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let harvester = harvester.with_shutdown(shutdown_rx.clone());
        let handle = tokio::spawn(run_harvest_loop(harvester, interval, shutdown_rx));

        Self {
            shutdown_tx,
            handle,
            persistence,
        }
    }

    /// Signals the loop, waits for the harvest in progress to leave off at a
    /// page boundary, then closes the database.
    pub async fn shutdown(self) {
        info!("Stopping harvest service");
        if self.shutdown_tx.send(true).is_err() {
            warn!("Harvest loop already exited");
        }
        if let Err(e) = self.handle.await {
            error!("Harvest loop panicked: {}", e);
        }
        self.persistence.close().await;
        info!("Harvest service stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run_harvest_loop(
    harvester: Harvester,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        "Harvest loop started: {} sources every {:?}",
        harvester.sources().len(),
        interval
    );

    loop {
        let report = harvester.harvest().await;
        if report.is_success() {
            info!("Harvest complete: {} new posts", report.new_posts());
        } else {
            warn!(
                "Harvest finished with {} failed sources",
                report.sources.iter().filter(|s| s.error.is_some()).count()
            );
        }
        if report.interrupted || *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // Only `true` is ever sent; a dropped sender also means stop.
            _ = shutdown_rx.changed() => break,
        }
    }
    info!("Harvest loop exiting");
}
