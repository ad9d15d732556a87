//! Periodic retention purge. First run 60s after startup, then on the
//! configured interval. Overlapping ticks are dropped, never queued.

use easel_db::EaselDb;
use easel_protocol::now_ms;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const FIRST_RUN_DELAY: Duration = Duration::from_secs(60);

/// Run one purge tick. Returns `None` when a previous tick still holds the
/// non-reentrancy flag or the purge itself fails.
pub async fn purge_tick(
    db: &EaselDb,
    max_age: Duration,
    running: &AtomicBool,
) -> Option<(u64, u64)> {
    if running.swap(true, Ordering::SeqCst) {
        debug!("Purge tick skipped; previous run still active");
        return None;
    }
    let cutoff = now_ms() - max_age.as_millis() as i64;
    let result = db.purge_old(cutoff).await;
    running.store(false, Ordering::SeqCst);

    match result {
        Ok((jobs, upscales)) => {
            info!("Purge removed {jobs} job(s), {upscales} upscale(s)");
            Some((jobs, upscales))
        }
        Err(err) => {
            error!("Purge failed: {err}");
            None
        }
    }
}

/// Spawn the purge scheduler. Crash-safe because the store's purge is a
/// single transaction.
pub fn spawn_purge_scheduler(
    db: EaselDb,
    max_age: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    let running = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        tokio::time::sleep(FIRST_RUN_DELAY).await;
        purge_tick(&db, max_age, &running).await;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the interval's immediate first tick
        loop {
            ticker.tick().await;
            purge_tick(&db, max_age, &running).await;
        }
    })
}
