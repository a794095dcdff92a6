//! Bounded worker pool for per-file checksum and classification units

use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::error;

use crate::checksum::{ChecksumAlgorithm, Checksummer};

/// One unit of work: checksum and classify a single file.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub path: PathBuf,
    pub key: String,
}

/// Per-file work executed on the pool. Each worker owns one
/// [`Checksummer`] so the read buffer is reused across files.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: FileJob, checksummer: &mut Checksummer);
}

/// Executes file jobs under a bounded number of concurrently in-flight
/// units. Scheduling is fire-and-forget and only waits when the bound is
/// saturated. The pool caps resource usage on large trees; classification
/// is order-independent, so it has no effect on run results.
pub struct WorkerPool {
    tx: Option<mpsc::Sender<FileJob>>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawn `limit` workers feeding off a bounded queue of the same size.
    pub fn spawn<H>(
        limit: usize,
        handler: Arc<H>,
        algorithm: ChecksumAlgorithm,
        buffer_size: usize,
    ) -> Self
    where
        H: JobHandler + 'static,
    {
        let limit = limit.max(1);
        let (tx, rx) = mpsc::channel::<FileJob>(limit);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();

        for _ in 0..limit {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);

            workers.spawn(async move {
                let mut checksummer = Checksummer::with_buffer_size(algorithm, buffer_size);

                loop {
                    let job = { rx.lock().await.recv().await };

                    match job {
                        Some(job) => handler.handle(job, &mut checksummer).await,
                        None => break,
                    }
                }
            });
        }

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Queue one unit of work, waiting only if the pool is saturated.
    pub async fn schedule(&self, job: FileJob) {
        if let Some(tx) = &self.tx {
            if tx.send(job).await.is_err() {
                error!("Worker pool is gone; dropping job");
            }
        }
    }

    /// Stop accepting new units and block until all in-flight units have
    /// completed. Idempotent.
    pub async fn shutdown(&mut self) {
        self.tx.take();
        while self.workers.join_next().await.is_some() {}
    }
}

/// Concurrency bound derived from available hardware parallelism.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}
