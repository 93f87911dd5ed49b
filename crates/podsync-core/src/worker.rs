//! Worker pool executing chunk-level writes.
//!
//! Workers share nothing mutable with each other: each receives a
//! self-contained [`ChunkTask`] over the pool's queue and answers on the
//! task's reply channel with a [`ChunkOutcome`]. All writes are idempotent
//! upserts keyed by external id, so redelivering a chunk after a
//! crash-and-resume is safe.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::reconcile::{EpisodeWrite, ItemError};
use crate::traits::CatalogStore;

/// A self-contained unit of work: one chunk of episode writes plus the
/// parent podcast context.
#[derive(Debug)]
pub struct ChunkTask {
    pub podcast_id: uuid::Uuid,
    pub podcast_title: String,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub writes: Vec<EpisodeWrite>,
    /// Where the processing worker reports its outcome.
    pub reply: oneshot::Sender<ChunkOutcome>,
}

/// What a worker did with one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<ItemError>,
}

impl ChunkOutcome {
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.failed
    }
}

/// Bounded pool of write workers fed over an mpsc queue.
pub struct WorkerPool {
    tx: mpsc::Sender<ChunkTask>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks, each holding a clone of the store handle.
    pub fn spawn<S: CatalogStore>(store: S, workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<ChunkTask>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| {
                let store = store.clone();
                let rx = Arc::clone(&rx);
                tokio::spawn(worker_loop(worker_id, store, rx))
            })
            .collect();

        Self { tx, handles }
    }

    /// Queues a chunk for execution. Backpressure: waits when all workers
    /// are busy and the queue is full.
    pub async fn submit(&self, task: ChunkTask) -> Result<(), AppError> {
        self.tx
            .send(task)
            .await
            .map_err(|_| AppError::Generic("worker pool is shut down".to_string()))
    }

    /// Closes the queue and waits for workers to drain in-flight chunks.
    /// No chunk is abandoned mid-write.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn worker_loop<S: CatalogStore>(
    worker_id: usize,
    store: S,
    rx: Arc<Mutex<mpsc::Receiver<ChunkTask>>>,
) {
    loop {
        // Hold the queue lock only for the receive, never across a write.
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else { break };

        tracing::debug!(
            worker = worker_id,
            podcast = %task.podcast_title,
            chunk = task.chunk_index + 1,
            of = task.chunk_count,
            writes = task.writes.len(),
            "Worker picked up chunk"
        );

        let outcome = apply_chunk(&store, task.chunk_index, &task.writes).await;

        // The scheduler may have abandoned the job (stop); a dropped
        // receiver just means nobody wants the answer anymore.
        let _ = task.reply.send(outcome);
    }

    tracing::debug!(worker = worker_id, "Worker stopped");
}

/// Applies one chunk of writes with per-item error isolation.
async fn apply_chunk<S: CatalogStore>(
    store: &S,
    chunk_index: usize,
    writes: &[EpisodeWrite],
) -> ChunkOutcome {
    let mut outcome = ChunkOutcome {
        chunk_index,
        ..Default::default()
    };

    for write in writes {
        match write {
            EpisodeWrite::Insert(episode) => match store.insert_episode(episode).await {
                Ok(_) => outcome.created += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(ItemError::new(
                        Some(episode.external_id.clone()),
                        format!("insert failed: {e}"),
                    ));
                }
            },
            EpisodeWrite::Update(update) => match store.update_episode_counters(update).await {
                Ok(()) => outcome.updated += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(ItemError::new(
                        Some(update.external_id.clone()),
                        format!("update failed: {e}"),
                    ));
                }
            },
        }
    }

    outcome
}
