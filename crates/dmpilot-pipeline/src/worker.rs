// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded work queue and worker pool.
//!
//! The webhook handler enqueues without waiting; a full queue is reported
//! back so the delivery can be shed. Batches run concurrently up to the
//! configured limit. Batches from the same sender may run concurrently:
//! the claim on each message id keeps them from replying twice.
//!
//! On cancellation the queue stops accepting work, and batches already
//! queued or running are finished before [`WorkerPool::join`] returns.

use std::sync::Arc;

use dmpilot_config::model::PipelineConfig;
use dmpilot_core::types::DeadLetter;
use dmpilot_core::{SenderBatch, StorageAdapter};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::processor::BatchProcessor;

pub const DEAD_LETTER_SOURCE: &str = "instagram_webhook";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Closed,
}

impl std::fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnqueueError::Full => write!(f, "work queue is full"),
            EnqueueError::Closed => write!(f, "work queue is closed"),
        }
    }
}

impl std::error::Error for EnqueueError {}

/// Producer side of the worker pool.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<SenderBatch>,
}

impl WorkQueue {
    /// A queue and its receiving end. [`WorkerPool::spawn`] uses this; it is
    /// public so handlers can be tested against a queue nobody drains.
    pub fn bounded(capacity: usize) -> (WorkQueue, mpsc::Receiver<SenderBatch>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (WorkQueue { tx }, rx)
    }

    pub fn try_enqueue(&self, batch: SenderBatch) -> Result<(), EnqueueError> {
        self.tx.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(batch) => {
                metrics::queue_rejection();
                warn!(sender_id = %batch.sender_id, "work queue full, shedding batch");
                EnqueueError::Full
            }
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

pub struct WorkerPool {
    intake: JoinHandle<()>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn spawn(
        processor: Arc<BatchProcessor>,
        storage: Arc<dyn StorageAdapter>,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> (WorkQueue, WorkerPool) {
        let (queue, rx) = WorkQueue::bounded(config.queue_capacity);
        let tracker = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(config.worker_concurrency.max(1)));

        let intake = tokio::spawn(run_intake(
            rx,
            processor,
            storage,
            permits,
            tracker.clone(),
            cancel,
        ));
        (queue, WorkerPool { intake, tracker })
    }

    /// Wait for the intake loop to stop and every batch to finish.
    pub async fn join(self) {
        if let Err(e) = self.intake.await {
            error!(error = %e, "worker intake task failed");
        }
        self.tracker.close();
        self.tracker.wait().await;
        info!("worker pool drained");
    }
}

async fn run_intake(
    mut rx: mpsc::Receiver<SenderBatch>,
    processor: Arc<BatchProcessor>,
    storage: Arc<dyn StorageAdapter>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };
        spawn_batch(batch, &processor, &storage, &permits, &tracker).await;
    }

    rx.close();
    let mut drained = 0usize;
    while let Some(batch) = rx.recv().await {
        spawn_batch(batch, &processor, &storage, &permits, &tracker).await;
        drained += 1;
    }
    info!(drained, "work queue closed");
}

async fn spawn_batch(
    batch: SenderBatch,
    processor: &Arc<BatchProcessor>,
    storage: &Arc<dyn StorageAdapter>,
    permits: &Arc<Semaphore>,
    tracker: &TaskTracker,
) {
    let Ok(permit) = permits.clone().acquire_owned().await else {
        return;
    };
    let processor = processor.clone();
    let storage = storage.clone();
    tracker.spawn(async move {
        run_batch(&processor, storage.as_ref(), batch).await;
        drop(permit);
    });
}

/// Process a batch; on a pipeline error, record it as a dead letter.
pub async fn run_batch(processor: &BatchProcessor, storage: &dyn StorageAdapter, batch: SenderBatch) {
    let payload_json = serde_json::to_string(&batch).unwrap_or_default();
    let sender_id = batch.sender_id.clone();

    match processor.process(batch).await {
        Ok(outcome) => debug!(sender_id = %sender_id, ?outcome, "batch done"),
        Err(e) => {
            error!(sender_id = %sender_id, error = %e, "batch failed, dead-lettering");
            let letter = DeadLetter {
                source: DEAD_LETTER_SOURCE.to_string(),
                payload_json,
                reason: e.to_string(),
                retries: 0,
            };
            if let Err(e) = storage.record_dead_letter(&letter).await {
                error!(sender_id = %sender_id, error = %e, "failed to record dead letter");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, StubChannel, StubProvider};
    use dmpilot_core::InboundEvent;

    fn batch(sender: &str, recipient: &str, mid: &str) -> SenderBatch {
        SenderBatch::new(
            sender,
            vec![InboundEvent {
                sender_id: sender.into(),
                recipient_id: recipient.into(),
                page_id: String::new(),
                text: "hi".into(),
                timestamp: 1,
                message_id: Some(mid.into()),
            }],
        )
    }

    #[tokio::test]
    async fn queued_batches_are_drained_on_cancel() {
        let fx = Fixture::new().await;
        fx.tenant(0, 150, false).await;
        let channel = Arc::new(StubChannel::default());
        let processor = Arc::new(fx.processor(Arc::new(StubProvider::replying("yo")), channel.clone()));
        let cancel = CancellationToken::new();

        let (queue, pool) = WorkerPool::spawn(
            processor,
            fx.storage.clone(),
            &fx.config.pipeline,
            cancel.clone(),
        );
        for i in 0..5 {
            queue.try_enqueue(batch(&format!("s{i}"), "biz-1", &format!("m{i}"))).unwrap();
        }
        cancel.cancel();
        pool.join().await;

        assert_eq!(channel.sent().len(), 5);
        assert_eq!(
            queue.try_enqueue(batch("late", "biz-1", "m-late")),
            Err(EnqueueError::Closed)
        );
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let (queue, _rx) = WorkQueue::bounded(1);

        queue.try_enqueue(batch("a", "biz-1", "m1")).unwrap();
        assert_eq!(
            queue.try_enqueue(batch("b", "biz-1", "m2")),
            Err(EnqueueError::Full)
        );
    }

    #[tokio::test]
    async fn storage_failure_is_dead_lettered() {
        let fx = Fixture::new().await;
        fx.tenant(0, 150, false).await;
        let processor = fx.processor(
            Arc::new(StubProvider::replying("yo")),
            Arc::new(StubChannel::default()),
        );
        fx.sql("DROP TABLE messages").await;

        run_batch(&processor, fx.storage.as_ref(), batch("s1", "biz-1", "m1")).await;

        assert_eq!(
            fx.scalar("SELECT source FROM webhook_dead_letters").await,
            DEAD_LETTER_SOURCE
        );
        let payload = fx.scalar("SELECT payload_json FROM webhook_dead_letters").await;
        assert!(payload.contains("\"sender_id\":\"s1\""), "got {payload}");
    }
}
