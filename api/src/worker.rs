//! Bounded job queue between the webhook handler and the event processors.
//!
//! The handler only enqueues; a fixed pool of workers drains the queue, so
//! the number of concurrent outbound GitHub calls never exceeds the pool
//! size. Jobs that do not fit are rejected instead of piling up.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

use crate::processors::Processor;
use prbot_github::WebhookEvent;

#[derive(Debug)]
pub struct Job {
    pub delivery_id: Option<String>,
    pub event: WebhookEvent,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("job queue is full")]
    Full,
    #[error("job queue is closed")]
    Closed,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub rejected: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Sending half of the job queue, held by the HTTP handler.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    stats: Arc<WorkerStats>,
}

impl JobQueue {
    pub fn bounded(capacity: usize, stats: Arc<WorkerStats>) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, stats }, rx)
    }

    /// Never waits: a full queue is reported immediately.
    pub fn enqueue(&self, job: Job) -> Result<(), EnqueueError> {
        self.tx.try_send(job).map_err(|e| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
                mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
            }
        })
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        jobs: mpsc::Receiver<Job>,
        processor: Arc<Processor>,
        concurrency: usize,
        stats: Arc<WorkerStats>,
    ) -> Self {
        let jobs = Arc::new(Mutex::new(jobs));
        let handles = (0..concurrency)
            .map(|worker| {
                let jobs = Arc::clone(&jobs);
                let processor = Arc::clone(&processor);
                let stats = Arc::clone(&stats);
                tokio::spawn(run_worker(worker, jobs, processor, stats))
            })
            .collect();

        info!(concurrency, "Started webhook workers");
        Self { handles }
    }

    /// Waits for the workers to drain the queue. Returns once every
    /// [`JobQueue`] has been dropped and the remaining jobs are processed.
    pub async fn shutdown(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Webhook worker panicked");
            }
        }
        info!("Webhook workers stopped");
    }
}

async fn run_worker(
    worker: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    processor: Arc<Processor>,
    stats: Arc<WorkerStats>,
) {
    loop {
        // Released before processing so other workers can pick up jobs.
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker, "Job queue closed");
            return;
        };

        let span = tracing::info_span!(
            "job",
            worker,
            kind = %job.event.kind(),
            delivery_id = job.delivery_id.as_deref().unwrap_or("-"),
        );
        async {
            match processor.process(&job.event).await {
                Ok(outcome) => {
                    debug!(
                        number = outcome.pull_request().map(|pr| pr.number),
                        ?outcome,
                        "Processed webhook event"
                    );
                    stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(error = %e, "Error processing webhook event");
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        .instrument(span)
        .await;
    }
}
