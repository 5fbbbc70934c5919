use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::domain::{CacheKey, JobId};

/// Bounded FIFO of job ids with non-blocking enqueue.
///
/// When the channel is full the id is parked in an overflow deque; workers
/// drain the overflow every time channel capacity frees up, so the caller
/// never blocks and the job is never lost (it also remains `pending` in the
/// metadata store, which is the durable record).
pub struct JobQueue {
    tx: mpsc::Sender<JobId>,
    overflow: Mutex<VecDeque<JobId>>,
}

pub struct JobDequeue {
    rx: tokio::sync::Mutex<mpsc::Receiver<JobId>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobDequeue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                overflow: Mutex::new(VecDeque::new()),
            },
            JobDequeue {
                rx: tokio::sync::Mutex::new(rx),
            },
        )
    }

    /// Never blocks and never fails while a worker pool is alive.
    pub fn enqueue(&self, job_id: JobId) {
        match self.tx.try_send(job_id) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job_id)) => {
                let mut overflow = self.overflow.lock().unwrap_or_else(|p| p.into_inner());
                tracing::debug!(queued = overflow.len() + 1, "Job queue full, parking in overflow");
                overflow.push_back(job_id);
            }
            Err(mpsc::error::TrySendError::Closed(job_id)) => {
                // Shutdown race: the job stays pending in the store and is
                // swept to failed:interrupted on next startup.
                tracing::warn!(job_id = %job_id, "Job queue closed, dropping enqueue");
            }
        }
    }

    /// Move parked ids into the channel while capacity lasts.
    pub fn drain_overflow(&self) {
        let mut overflow = self.overflow.lock().unwrap_or_else(|p| p.into_inner());
        while let Some(job_id) = overflow.pop_front() {
            if let Err(mpsc::error::TrySendError::Full(job_id)) = self.tx.try_send(job_id) {
                overflow.push_front(job_id);
                break;
            }
        }
    }

    #[cfg(test)]
    pub fn overflow_len(&self) -> usize {
        self.overflow.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl JobDequeue {
    /// Wait for the next job id. `None` means every sender is gone.
    pub async fn recv(&self) -> Option<JobId> {
        self.rx.lock().await.recv().await
    }
}

/// Cancel signals for in-flight jobs, keyed by cache key.
///
/// Each job gets a child of the service-wide root token, so graceful
/// shutdown cancels everything with one call while entry deletion cancels
/// a single key.
pub struct CancelRegistry {
    root: CancellationToken,
    by_key: DashMap<String, CancellationToken>,
}

impl CancelRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            by_key: DashMap::new(),
        }
    }

    pub fn register(&self, cache_key: &CacheKey) -> CancellationToken {
        let token = self.root.child_token();
        self.by_key.insert(cache_key.to_string(), token.clone());
        token
    }

    pub fn release(&self, cache_key: &CacheKey) {
        self.by_key.remove(cache_key.as_str());
    }

    /// Cancel the in-flight job for a key, if any.
    pub fn cancel(&self, cache_key: &CacheKey) {
        if let Some(entry) = self.by_key.get(cache_key.as_str()) {
            entry.value().cancel();
        }
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }
}

#[derive(Debug, thiserror::Error)]
#[error("timed out waiting for the {stage} stage slot")]
pub struct StageWaitTimeout {
    pub stage: &'static str,
}

/// Global concurrency caps for the resource-heavy pipeline stages. Scoped
/// across all workers so a slow ASR cannot monopolize worker slots.
pub struct StageLimits {
    transcode: Semaphore,
    transcribe: Semaphore,
    wait: Duration,
}

impl StageLimits {
    pub fn new(transcode: usize, transcribe: usize, wait: Duration) -> Self {
        Self {
            transcode: Semaphore::new(transcode.max(1)),
            transcribe: Semaphore::new(transcribe.max(1)),
            wait,
        }
    }

    pub async fn acquire_transcode(&self) -> Result<SemaphorePermit<'_>, StageWaitTimeout> {
        self.acquire(&self.transcode, "transcode").await
    }

    pub async fn acquire_transcribe(&self) -> Result<SemaphorePermit<'_>, StageWaitTimeout> {
        self.acquire(&self.transcribe, "transcribe").await
    }

    async fn acquire<'a>(
        &self,
        sem: &'a Semaphore,
        stage: &'static str,
    ) -> Result<SemaphorePermit<'a>, StageWaitTimeout> {
        match tokio::time::timeout(self.wait, sem.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => Err(StageWaitTimeout { stage }),
        }
    }
}
