//! NATS request intake for the risk responder
//!
//! Subscriptions live here together with the synchronous handlers that turn
//! a request payload into a [`RiskReply`]. Handlers never touch NATS so they
//! can run on blocking threads and be tested without a server.

use crate::metrics::RiskMetrics;
use crate::models::{ModelHandle, ModelLoader};
use crate::service::RiskService;
use crate::types::{AssessmentRequest, RiskReply};
use anyhow::Result;
use async_nats::{Client, Subscriber};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Subscribes to the assessment and reload subjects
pub struct AssessmentConsumer {
    client: Client,
    assess_subject: String,
    reload_subject: String,
}

impl AssessmentConsumer {
    pub fn new(client: Client, assess_subject: &str, reload_subject: &str) -> Self {
        Self {
            client,
            assess_subject: assess_subject.to_string(),
            reload_subject: reload_subject.to_string(),
        }
    }

    pub async fn subscribe_assess(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.assess_subject.clone()).await?;
        info!(subject = %self.assess_subject, "Subscribed to assessment subject");
        Ok(subscriber)
    }

    pub async fn subscribe_reload(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.reload_subject.clone()).await?;
        info!(subject = %self.reload_subject, "Subscribed to reload subject");
        Ok(subscriber)
    }
}

/// Runs blocking handlers on the runtime's blocking threads, at most
/// `workers` at a time. Each caller waits for its permit in its own task, so
/// a saturated pool never stalls the subscription loop.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Workers not currently running a job
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free worker, then run `job` on a blocking thread.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self.permits.acquire().await?;
        Ok(tokio::task::spawn_blocking(job).await?)
    }
}

/// Decode an assessment request.
pub fn parse_request(payload: &[u8]) -> Result<AssessmentRequest, RiskReply> {
    serde_json::from_slice(payload).map_err(|e| {
        warn!(error = %e, "Failed to decode assessment request");
        RiskReply::invalid_request(format!("expected {{\"client_id\": <integer>}}: {e}"))
    })
}

/// Handle one `risk.assess` payload end to end.
pub fn handle_assess(service: &RiskService, payload: &[u8]) -> RiskReply {
    let request = match parse_request(payload) {
        Ok(request) => request,
        Err(reply) => return reply,
    };

    match service.assess_client_risk(request.client_id) {
        Ok(assessment) => RiskReply::ok(assessment, request.request_id),
        Err(e) => {
            warn!(
                client_id = request.client_id,
                kind = e.kind(),
                error = %e,
                "Assessment failed"
            );
            RiskReply::from_error(&e, request.request_id)
        }
    }
}

/// Handle one `risk.model.reload` message. The payload is ignored.
pub fn handle_reload(
    handle: &ModelHandle,
    loader: &ModelLoader,
    metrics: Option<&RiskMetrics>,
) -> RiskReply {
    match handle.reload(loader) {
        Ok(model_version) => {
            if let Some(metrics) = metrics {
                metrics.record_reload();
            }
            RiskReply::Reloaded { model_version }
        }
        Err(e) => RiskReply::from_error(&e, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::ClientCategory;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn service() -> (RiskService, i64) {
        let store = SqliteStore::in_memory().unwrap();
        store.migrate().unwrap();
        let id = store.insert_client("Client", ClientCategory::Client).unwrap();
        (
            RiskService::new(Arc::new(store), Arc::new(ModelHandle::empty())),
            id,
        )
    }

    #[test]
    fn test_malformed_payload_is_invalid_request() {
        let (svc, _) = service();

        let payloads: [&[u8]; 3] = [b"not json", br#"{"client_id": "seven"}"#, b"{}"];
        for payload in payloads {
            match handle_assess(&svc, payload) {
                RiskReply::Error { kind, .. } => assert_eq!(kind, "invalid_request"),
                other => panic!("unexpected reply {other:?}"),
            }
        }
    }

    #[test]
    fn test_assess_echoes_request_id() {
        let (svc, id) = service();
        let payload = serde_json::to_vec(&AssessmentRequest::new(id).with_request_id("abc")).unwrap();

        match handle_assess(&svc, &payload) {
            RiskReply::Ok {
                assessment,
                request_id,
            } => {
                assert_eq!(assessment.client_id, id);
                assert_eq!(request_id.as_deref(), Some("abc"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_unknown_client_reply() {
        let (svc, _) = service();
        let reply = handle_assess(&svc, br#"{"client_id": 777}"#);

        assert!(matches!(reply, RiskReply::Error { ref kind, .. } if kind == "not_found"));
    }

    #[test]
    fn test_reload_failure_reply() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ModelLoader::new(dir.path().join("missing.json"));
        let handle = ModelHandle::empty();
        let metrics = RiskMetrics::new();

        let reply = handle_reload(&handle, &loader, Some(&metrics));
        assert!(matches!(reply, RiskReply::Error { ref kind, .. } if kind == "unavailable"));
        assert_eq!(metrics.reloads.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    pool.run(move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        active.fetch_sub(1, Ordering::SeqCst);
                        i
                    })
                    .await
                    .unwrap()
                })
            })
            .collect();

        let mut done = Vec::new();
        for job in jobs {
            done.push(job.await.unwrap());
        }
        assert_eq!(done, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_saturated_pool_queues_without_blocking_dispatch() {
        let pool = WorkerPool::new(1);
        let (release, blocked) = std::sync::mpsc::channel::<()>();

        let busy = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run(move || blocked.recv().is_ok()).await.unwrap() })
        };
        while pool.available() > 0 {
            tokio::task::yield_now().await;
        }

        // Handing a second request to the pool returns at once; the request
        // waits in its own task.
        let queued = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run(|| 7).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!queued.is_finished());

        release.send(()).unwrap();
        assert!(busy.await.unwrap());
        assert_eq!(queued.await.unwrap(), 7);
    }
}
