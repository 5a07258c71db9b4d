use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use metrics::{counter, gauge};
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tracing::{error, warn};

use crate::event::Category;
use crate::index::{dedupe_key, EventIndex};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

struct IndexJob {
    category: Category,
    event: Value,
}

/// Counts jobs that are queued or running, and wakes waiters when it hits zero.
#[derive(Default)]
struct Inflight {
    count: AtomicUsize,
    idle: Notify,
}

impl Inflight {
    fn acquire(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Bounded work queue in front of the event index.
///
/// Ingestion hands events over with [`IndexQueue::submit`], which never waits:
/// when the queue is full the event is not indexed (it is still in the durable
/// log) and the drop is logged and counted. Jobs are spread over `concurrency`
/// shards by dedupe key, and each shard upserts strictly in submission order,
/// so the first submitted payload for an id is always the one inserted.
/// Upsert failures are logged and counted, never retried.
#[derive(Clone)]
pub struct IndexQueue {
    shards: Arc<[mpsc::Sender<IndexJob>]>,
    next_keyless: Arc<AtomicUsize>,
    inflight: Arc<Inflight>,
}

impl IndexQueue {
    /// `capacity` is split evenly between the shards.
    pub fn start(
        index: Arc<dyn EventIndex + Send + Sync>,
        capacity: usize,
        concurrency: usize,
        liveness: HealthHandle,
    ) -> IndexQueue {
        let shard_count = concurrency.max(1);
        let shard_capacity = (capacity / shard_count).max(1);
        let inflight = Arc::new(Inflight::default());

        let shards = (0..shard_count)
            .map(|shard| {
                let (sender, receiver) = mpsc::channel(shard_capacity);
                tokio::spawn(run_shard(
                    shard,
                    receiver,
                    index.clone(),
                    inflight.clone(),
                    liveness.clone(),
                ));
                sender
            })
            .collect();

        IndexQueue {
            shards,
            next_keyless: Arc::new(AtomicUsize::new(0)),
            inflight,
        }
    }

    fn shard_for(&self, event: &Value) -> usize {
        match dedupe_key(event) {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.shards.len() as u64) as usize
            }
            // Keyless events never collide, any shard will do.
            None => self.next_keyless.fetch_add(1, Ordering::Relaxed) % self.shards.len(),
        }
    }

    pub fn submit(&self, category: Category, event: Value) {
        let shard = self.shard_for(&event);
        self.inflight.acquire();
        match self.shards[shard].try_send(IndexJob { category, event }) {
            Ok(()) => {
                counter!("capture_index_jobs_submitted_total").increment(1);
            }
            Err(TrySendError::Full(_)) => {
                self.inflight.release();
                counter!("capture_index_jobs_dropped_total", "cause" => "queue_full").increment(1);
                warn!(%category, shard, "index queue full, event will not be searchable");
            }
            Err(TrySendError::Closed(_)) => {
                self.inflight.release();
                counter!("capture_index_jobs_dropped_total", "cause" => "closed").increment(1);
                error!(%category, shard, "index worker is gone, event will not be searchable");
            }
        }
    }

    /// Number of submitted jobs not yet completed.
    pub fn pending(&self) -> usize {
        self.inflight.count.load(Ordering::SeqCst)
    }

    /// Resolves once every submitted job has completed.
    pub async fn wait_idle(&self) {
        self.inflight.wait_idle().await
    }
}

async fn run_shard(
    shard: usize,
    mut receiver: mpsc::Receiver<IndexJob>,
    index: Arc<dyn EventIndex + Send + Sync>,
    inflight: Arc<Inflight>,
    liveness: HealthHandle,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            job = receiver.recv() => {
                let Some(job) = job else {
                    break;
                };

                match index.upsert(&job.event, job.category).await {
                    Ok(()) => {
                        counter!("capture_index_upserts_total", "category" => job.category.as_str())
                            .increment(1);
                    }
                    Err(err) => {
                        counter!("capture_index_failures_total", "category" => job.category.as_str())
                            .increment(1);
                        error!(category = %job.category, shard, "failed to index event: {}", err);
                    }
                }
                inflight.release();
            }
            _ = heartbeat.tick() => {
                gauge!("capture_index_jobs_pending").set(inflight.count.load(Ordering::SeqCst) as f64);
                liveness.report_healthy();
            }
        }
    }

    warn!(shard, "index worker stopped");
}
