//! Ingestion queue adapter.
//!
//! Decouples slow or unreliable producers (chat integrations and the like)
//! from the synchronous creation path. Delivery is at-least-once: a
//! duplicate enqueue creates a harmless duplicate secret under a fresh id,
//! so no dedup bookkeeping is needed.

use crate::error::{AppError, AppResult};
use crate::service::{SecretService, SubmitRequest, SubmittedSecret};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

/// One queued creation request
#[derive(Debug)]
pub struct CreateRequest {
    /// Delivery tag for tracing; duplicates of one logical request share it
    pub request_id: Uuid,
    pub submit: SubmitRequest,
    /// Optional out-of-band reply channel for producers that want the
    /// resulting identifier back
    pub reply: Option<oneshot::Sender<AppResult<SubmittedSecret>>>,
}

impl CreateRequest {
    pub fn new(submit: SubmitRequest) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            submit,
            reply: None,
        }
    }

    /// Attach a reply channel, returning the receiving half to the producer
    pub fn with_reply(submit: SubmitRequest) -> (Self, oneshot::Receiver<AppResult<SubmittedSecret>>) {
        let (tx, rx) = oneshot::channel();
        let mut request = Self::new(submit);
        request.reply = Some(tx);
        (request, rx)
    }
}

/// Producer-side handle onto the bounded ingestion queue
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<CreateRequest>,
}

impl IngestQueue {
    /// Create the queue, returning the handle and the worker's receiving end
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CreateRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue without waiting; fails fast when the queue is full so a slow
    /// store never backs memory up into the producer.
    pub fn enqueue(&self, request: CreateRequest) -> AppResult<()> {
        self.tx.try_send(request).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => AppError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => {
                AppError::internal("ingest worker has shut down")
            }
        })
    }
}

/// Background task draining the queue into the orchestrator.
///
/// One `submit` per delivery, no internal retries: a failed submit is
/// logged and dropped, and the producer may re-enqueue.
pub struct IngestWorker {
    service: Arc<SecretService>,
    rx: mpsc::Receiver<CreateRequest>,
}

impl IngestWorker {
    pub fn new(service: Arc<SecretService>, rx: mpsc::Receiver<CreateRequest>) -> Self {
        Self { service, rx }
    }

    /// Run the worker. This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Ingest worker started");

        while let Some(request) = self.rx.recv().await {
            let request_id = request.request_id;
            let result = self.service.submit(request.submit).await;

            match &result {
                Ok(created) => {
                    info!(%request_id, id = %created.id, "Ingested secret")
                }
                Err(e) => warn!(%request_id, error = %e, "Ingest submit failed"),
            }

            if let Some(reply) = request.reply {
                // A producer that went away just drops the receiver
                let _ = reply.send(result);
            }
        }

        info!("Ingest queue closed, worker shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretsConfig;
    use crate::service::AccessOutcome;
    use crate::store::MemoryStore;

    fn service() -> Arc<SecretService> {
        Arc::new(SecretService::new(
            Arc::new(MemoryStore::new()),
            &SecretsConfig::default(),
        ))
    }

    fn plain_request(text: &str) -> SubmitRequest {
        SubmitRequest {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_enqueued_request_creates_revealable_secret() {
        let service = service();
        let (queue, rx) = IngestQueue::new(8);
        tokio::spawn(IngestWorker::new(service.clone(), rx).run());

        let (request, reply) = CreateRequest::with_reply(plain_request("queued payload"));
        queue.enqueue(request).unwrap();

        let created = reply.await.unwrap().unwrap();
        let outcome = service.access(&created.id, None).await.unwrap();
        assert_eq!(
            outcome,
            AccessOutcome::Revealed {
                text: "queued payload".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_delivery_creates_independent_secrets() {
        let service = service();
        let (queue, rx) = IngestQueue::new(8);
        tokio::spawn(IngestWorker::new(service.clone(), rx).run());

        // The same logical request delivered twice
        let (first, first_reply) = CreateRequest::with_reply(plain_request("dup"));
        let (second, second_reply) = CreateRequest::with_reply(plain_request("dup"));
        queue.enqueue(first).unwrap();
        queue.enqueue(second).unwrap();

        let first = first_reply.await.unwrap().unwrap();
        let second = second_reply.await.unwrap().unwrap();
        assert_ne!(first.id, second.id);

        // Each is independently revealable exactly once
        assert!(service.access(&first.id, None).await.is_ok());
        assert!(service.access(&second.id, None).await.is_ok());
        assert!(service.access(&first.id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_request_reports_error_to_reply_channel() {
        let service = service();
        let (queue, rx) = IngestQueue::new(8);
        tokio::spawn(IngestWorker::new(service, rx).run());

        let (request, reply) = CreateRequest::with_reply(plain_request(""));
        queue.enqueue(request).unwrap();

        let result = reply.await.unwrap();
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        // No worker draining: capacity 1 fills immediately
        let (queue, _rx) = IngestQueue::new(1);

        queue.enqueue(CreateRequest::new(plain_request("first"))).unwrap();
        let err = queue
            .enqueue(CreateRequest::new(plain_request("second")))
            .unwrap_err();
        assert!(matches!(err, AppError::QueueFull));
    }
}
