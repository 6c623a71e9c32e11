//! Request batcher.
//!
//! Accumulates individual logical HTTP requests and flushes them as one
//! batched call, either when the queue reaches a size threshold or after a
//! debounce window with no new arrivals. Each pending request is settled
//! exactly once: with its matched response entry, or with the batch-wide
//! failure when the batched call itself fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::error::DirectoryError;
use crate::types::{BatchEnvelope, BatchItemResponse, BatchRequestItem, BatchResponseEnvelope};

/// Executes one flushed batch against the network.
///
/// Production uses [`HttpBatchTransport`]; tests install scripted
/// implementations to observe flush boundaries without a server.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Perform the batched call and return the per-request response entries,
    /// in whatever order the service produced them.
    async fn execute(
        &self,
        requests: Vec<BatchRequestItem>,
    ) -> Result<Vec<BatchItemResponse>, DirectoryError>;
}

/// A logical request parked in the queue until its batch is dispatched.
struct PendingRequest {
    id: u64,
    method: String,
    url: String,
    responder: oneshot::Sender<Result<BatchItemResponse, DirectoryError>>,
}

struct QueueState {
    pending: Vec<PendingRequest>,
    /// Monotonically increasing, unique for the lifetime of the queue.
    next_id: u64,
    /// Bumped on every enqueue and flush; a debounce timer only flushes if
    /// the epoch it captured is still current, so any later arrival cancels
    /// and re-arms the window.
    epoch: u64,
}

struct BatcherShared {
    transport: Arc<dyn BatchTransport>,
    flush_threshold: usize,
    debounce: Duration,
    state: Mutex<QueueState>,
}

/// Coalesces logical requests into batched network calls.
///
/// Cloning is cheap; clones share one queue.
#[derive(Clone)]
pub struct Batcher {
    shared: Arc<BatcherShared>,
}

impl Batcher {
    /// Create a batcher flushing at `flush_threshold` queued requests, or
    /// after `debounce` with no further arrivals.
    pub fn new(
        transport: Arc<dyn BatchTransport>,
        flush_threshold: usize,
        debounce: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(BatcherShared {
                transport,
                flush_threshold,
                debounce,
                state: Mutex::new(QueueState {
                    pending: Vec::new(),
                    next_id: 0,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Enqueue one logical request and wait for its individual outcome.
    ///
    /// The future settles only when the batch containing this request has
    /// been dispatched and either a matching response entry arrived or the
    /// whole batch failed.
    pub async fn enqueue(
        &self,
        url: impl Into<String>,
        method: impl Into<String>,
    ) -> Result<BatchItemResponse, DirectoryError> {
        let rx = self.submit(url.into(), method.into());
        rx.await
            .map_err(|_| DirectoryError::Batch("pending request dropped unsettled".to_string()))?
    }

    fn submit(
        &self,
        url: String,
        method: String,
    ) -> oneshot::Receiver<Result<BatchItemResponse, DirectoryError>> {
        let (tx, rx) = oneshot::channel();

        let mut snapshot = None;
        let mut timer_epoch = None;
        {
            let mut state = self.shared.state.lock().expect("batch queue lock poisoned");
            let id = state.next_id;
            state.next_id += 1;
            state.epoch = state.epoch.wrapping_add(1);
            debug!(id, %method, %url, queued = state.pending.len() + 1, "enqueue batched request");
            state.pending.push(PendingRequest {
                id,
                method,
                url,
                responder: tx,
            });

            if state.pending.len() >= self.shared.flush_threshold {
                // Snapshot-and-replace under the lock: requests arriving
                // while this batch is in flight start a fresh queue.
                snapshot = Some(std::mem::take(&mut state.pending));
            } else {
                timer_epoch = Some(state.epoch);
            }
        }

        if let Some(batch) = snapshot {
            debug!(size = batch.len(), "threshold flush");
            let transport = Arc::clone(&self.shared.transport);
            tokio::spawn(async move {
                dispatch(transport, batch).await;
            });
        } else if let Some(my_epoch) = timer_epoch {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                tokio::time::sleep(shared.debounce).await;
                let batch = {
                    let mut state = shared.state.lock().expect("batch queue lock poisoned");
                    if state.epoch != my_epoch || state.pending.is_empty() {
                        // A later enqueue re-armed the window, or a
                        // threshold flush already drained the queue.
                        return;
                    }
                    state.epoch = state.epoch.wrapping_add(1);
                    std::mem::take(&mut state.pending)
                };
                debug!(size = batch.len(), "debounce flush");
                dispatch(Arc::clone(&shared.transport), batch).await;
            });
        }

        rx
    }
}

/// Dispatch one snapshot and settle every member exactly once.
async fn dispatch(transport: Arc<dyn BatchTransport>, batch: Vec<PendingRequest>) {
    let items: Vec<BatchRequestItem> = batch
        .iter()
        .map(|p| BatchRequestItem {
            id: p.id.to_string(),
            method: p.method.clone(),
            url: p.url.clone(),
        })
        .collect();

    match transport.execute(items).await {
        Ok(responses) => {
            let mut responders: HashMap<u64, _> =
                batch.into_iter().map(|p| (p.id, p.responder)).collect();
            for response in responses {
                let Ok(id) = response.id.parse::<u64>() else {
                    warn!(id = %response.id, "unparseable response id in batch");
                    continue;
                };
                match responders.remove(&id) {
                    Some(responder) => {
                        let _ = responder.send(Ok(response));
                    }
                    None => warn!(id, "batch response for unknown request id"),
                }
            }
            // A request the service never answered still gets a terminal
            // outcome.
            for (id, responder) in responders {
                warn!(id, "no response entry for batched request");
                let _ = responder.send(Err(DirectoryError::Batch(format!(
                    "no response entry for request id {id}"
                ))));
            }
        }
        Err(err) => {
            warn!(%err, "batch call failed; rejecting whole snapshot");
            for pending in batch {
                let _ = pending.responder.send(Err(err.clone()));
            }
        }
    }
}

/// Production transport: POSTs the envelope to the batch endpoint with a
/// bearer token.
pub struct HttpBatchTransport {
    http: reqwest::Client,
    batch_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpBatchTransport {
    /// Build a transport posting to `batch_url` (an absolute URL).
    pub fn new(http: reqwest::Client, batch_url: String, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            batch_url,
            tokens,
        }
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn execute(
        &self,
        requests: Vec<BatchRequestItem>,
    ) -> Result<Vec<BatchItemResponse>, DirectoryError> {
        let token = self.tokens.bearer_token().await?;

        debug!(count = requests.len(), url = %self.batch_url, "POST batch");
        let response = self
            .http
            .post(&self.batch_url)
            .bearer_auth(token)
            .json(&BatchEnvelope { requests })
            .send()
            .await
            .map_err(|e| DirectoryError::Batch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Batch(format!(
                "batch endpoint returned {status}: {body}"
            )));
        }

        let envelope: BatchResponseEnvelope = response
            .json()
            .await
            .map_err(|e| DirectoryError::Batch(format!("malformed batch envelope: {e}")))?;
        Ok(envelope.responses)
    }
}
