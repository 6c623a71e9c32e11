//! Common test utilities for integration tests
//!
//! Provides scripted batch transports, payload builders, and config helpers
//! shared across the integration test files.
#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use rolodex::{
    BatchItemResponse, BatchRequestItem, BatchTransport, DirectoryConfig, DirectoryError,
    TokenProvider,
};

/// Transport that settles every request in-process and records each flushed
/// batch, so tests can observe flush boundaries without a server.
///
/// Requests whose url contains a route's substring get that route's scripted
/// status and body; everything else echoes its url back with status 200.
pub struct ScriptedTransport {
    calls: Mutex<Vec<Vec<BatchRequestItem>>>,
    routes: Vec<(String, u16, Value)>,
    reverse: bool,
    omit_ids: Vec<String>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            routes: Vec::new(),
            reverse: false,
            omit_ids: Vec::new(),
        }
    }

    /// Script a response for any request whose url contains `fragment`.
    pub fn route(mut self, fragment: &str, status: u16, body: Value) -> Self {
        self.routes.push((fragment.to_string(), status, body));
        self
    }

    /// Return response entries in reverse order relative to the requests.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Omit the response entry for the given request id.
    pub fn omitting(mut self, id: &str) -> Self {
        self.omit_ids.push(id.to_string());
        self
    }

    /// Number of batch calls dispatched so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of every dispatched batch.
    pub fn calls(&self) -> Vec<Vec<BatchRequestItem>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn execute(
        &self,
        requests: Vec<BatchRequestItem>,
    ) -> Result<Vec<BatchItemResponse>, DirectoryError> {
        self.calls.lock().unwrap().push(requests.clone());

        let mut responses: Vec<BatchItemResponse> = requests
            .into_iter()
            .filter(|req| !self.omit_ids.contains(&req.id))
            .map(|req| {
                let scripted = self
                    .routes
                    .iter()
                    .find(|(fragment, _, _)| req.url.contains(fragment));
                match scripted {
                    Some((_, status, body)) => BatchItemResponse {
                        id: req.id,
                        status: *status,
                        headers: Default::default(),
                        body: body.clone(),
                    },
                    None => BatchItemResponse {
                        id: req.id,
                        status: 200,
                        headers: Default::default(),
                        body: json!({ "echo": req.url }),
                    },
                }
            })
            .collect();
        if self.reverse {
            responses.reverse();
        }
        Ok(responses)
    }
}

/// Transport whose batch call always fails at the network level.
pub struct FailingTransport {
    pub message: String,
}

#[async_trait]
impl BatchTransport for FailingTransport {
    async fn execute(
        &self,
        _requests: Vec<BatchRequestItem>,
    ) -> Result<Vec<BatchItemResponse>, DirectoryError> {
        Err(DirectoryError::Batch(self.message.clone()))
    }
}

/// Token provider that always fails, for exercising the auth seam.
pub struct FailingTokenProvider;

#[async_trait]
impl TokenProvider for FailingTokenProvider {
    async fn bearer_token(&self) -> Result<String, DirectoryError> {
        Err(DirectoryError::Token("credential store offline".to_string()))
    }
}

/// Config pointed at a test server, with a short debounce window.
pub fn test_config(base_url: &str) -> DirectoryConfig {
    DirectoryConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        debounce_ms: 1,
        ..Default::default()
    }
}

/// Minimal user payload body.
pub fn user_body(id: &str, mail: Option<&str>) -> Value {
    let mut body = json!({ "id": id, "displayName": format!("User {id}") });
    if let Some(mail) = mail {
        body["mail"] = json!(mail);
    }
    body
}

/// Let spawned cross-indexing tasks run to completion on the current-thread
/// runtime.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
