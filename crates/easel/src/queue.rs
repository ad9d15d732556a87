//! Process-local FIFO queue feeding the single-slot runner.
//!
//! The queue is not persisted; the store is the source of truth. A boot
//! recovery sweep re-enqueues rows left `queued` by a previous process in
//! `created_at` order, preserving fairness.

use crate::gateway::EphemeralToken;
use easel_db::EaselDb;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Generation,
    Upscale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: Uuid,
    pub kind: JobKind,
}

/// Sender half: enqueues entries and holds the one-shot ephemeral tokens.
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
    tokens: Mutex<HashMap<Uuid, EphemeralToken>>,
}

/// Create the queue and the receiver the runner drains.
pub fn job_queue() -> (JobQueue, mpsc::UnboundedReceiver<QueueEntry>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        JobQueue {
            tx,
            tokens: Mutex::new(HashMap::new()),
        },
        rx,
    )
}

impl JobQueue {
    /// Append an entry and arm the runner's wake-up. The optional token is
    /// held for the runner to take exactly once.
    pub fn enqueue(&self, entry: QueueEntry, token: Option<EphemeralToken>) {
        if let Some(token) = token {
            if let Ok(mut tokens) = self.tokens.lock() {
                tokens.insert(entry.job_id, token);
            }
        }
        // Send fails only when the runner is gone, i.e. during shutdown.
        let _ = self.tx.send(entry);
    }

    /// Take the ephemeral token for a job. One-shot: a second taker sees
    /// nothing.
    pub fn take_token(&self, job_id: Uuid) -> Option<EphemeralToken> {
        self.tokens.lock().ok()?.remove(&job_id)
    }
}

/// Re-enqueue rows a previous process left `queued`, oldest first across
/// both kinds. Returns how many entries were enqueued.
pub async fn recover_queued(db: &EaselDb, queue: &JobQueue) -> easel_db::Result<usize> {
    let mut pending: Vec<(i64, QueueEntry)> = Vec::new();
    for job in db.queued_jobs_oldest_first().await? {
        pending.push((
            job.created_at,
            QueueEntry {
                job_id: job.id,
                kind: JobKind::Generation,
            },
        ));
    }
    for upscale in db.queued_upscales_oldest_first().await? {
        pending.push((
            upscale.created_at,
            QueueEntry {
                job_id: upscale.id,
                kind: JobKind::Upscale,
            },
        ));
    }
    pending.sort_by_key(|(created_at, _)| *created_at);

    let count = pending.len();
    for (_, entry) in pending {
        queue.enqueue(entry, None);
    }
    if count > 0 {
        info!("Recovered {count} queued job(s) from a previous run");
    }
    Ok(count)
}
