//! Directory client: identity-resolving fetchers in front of the batcher
//! and the multi-key caches, plus manager-chain traversal.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::FutureExt;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::auth::TokenProvider;
use crate::batch::{Batcher, BatchTransport, HttpBatchTransport};
use crate::cache::{CacheRegistry, SharedFetch};
use crate::config::DirectoryConfig;
use crate::error::DirectoryError;
use crate::types::{CollectionPayload, Profile, UserPayload};

struct ClientInner {
    http: reqwest::Client,
    config: DirectoryConfig,
    tokens: Arc<dyn TokenProvider>,
    batcher: Batcher,
    caches: CacheRegistry,
}

/// Client-side access layer for a directory/profile service.
///
/// Owns four per-operation caches and one pending-request queue; construct
/// one per application context and clone it freely, clones share all state.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use rolodex::{DirectoryClient, DirectoryConfig, StaticTokenProvider};
///
/// # async fn example() -> Result<(), rolodex::DirectoryError> {
/// let client = DirectoryClient::new(
///     DirectoryConfig::default(),
///     Arc::new(StaticTokenProvider::new("bearer-token")),
/// )?;
/// let profile = client.resolve_profile("ada@example.com").await?;
/// println!("{:?}", profile.display_name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DirectoryClient {
    inner: Arc<ClientInner>,
}

impl DirectoryClient {
    /// Create a client with the production HTTP batch transport.
    pub fn new(
        config: DirectoryConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, DirectoryError> {
        config
            .validate()
            .map_err(|e| DirectoryError::Config(e.to_string()))?;

        let http = build_http_client(&config)?;
        let batch_url = format!("{}{}", config.base_url, config.batch_endpoint);
        let transport = Arc::new(HttpBatchTransport::new(
            http.clone(),
            batch_url,
            Arc::clone(&tokens),
        ));
        Self::assemble(config, tokens, http, transport)
    }

    /// Create a client with a custom [`BatchTransport`], for tests that
    /// script batch outcomes without a server.
    pub fn with_transport(
        config: DirectoryConfig,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn BatchTransport>,
    ) -> Result<Self, DirectoryError> {
        config
            .validate()
            .map_err(|e| DirectoryError::Config(e.to_string()))?;
        let http = build_http_client(&config)?;
        Self::assemble(config, tokens, http, transport)
    }

    fn assemble(
        config: DirectoryConfig,
        tokens: Arc<dyn TokenProvider>,
        http: reqwest::Client,
        transport: Arc<dyn BatchTransport>,
    ) -> Result<Self, DirectoryError> {
        info!(
            base_url = %config.base_url,
            flush_threshold = config.flush_threshold,
            debounce_ms = config.debounce_ms,
            "initializing directory client"
        );
        let batcher = Batcher::new(
            transport,
            config.flush_threshold,
            Duration::from_millis(config.debounce_ms),
        );
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                tokens,
                batcher,
                caches: CacheRegistry::new(),
            }),
        })
    }

    /// Resolve a profile by id or email.
    ///
    /// Concurrent calls for the same key share one network request, routed
    /// through the batcher. Once the identity resolves, the entry is also
    /// reachable under the entity's other key.
    #[instrument(skip(self))]
    pub async fn resolve_profile(&self, key: &str) -> Result<Profile, DirectoryError> {
        let inner = Arc::clone(&self.inner);
        let lookup = key.to_string();
        let (fut, inserted) = self
            .inner
            .caches
            .profiles
            .get_or_insert_with(key, || fetch_profile(inner, lookup).boxed());
        if inserted {
            self.register_cross_index(key, fut.clone());
        }
        fut.await
    }

    /// Fetch the entity's photo and return it as a locally resolvable
    /// `data:` URL.
    ///
    /// The encoded string owns its bytes outright, so there is no separate
    /// handle to release; dropping the string frees the image.
    #[instrument(skip(self))]
    pub async fn photo_url(&self, key: &str) -> Result<String, DirectoryError> {
        let inner = Arc::clone(&self.inner);
        let lookup = key.to_string();
        let (fut, _) = self
            .inner
            .caches
            .photos
            .get_or_insert_with(key, || fetch_photo(inner, lookup).boxed());
        fut.await
    }

    /// Resolve the manager of the given entity.
    ///
    /// A successful resolution also seeds the profile cache under the
    /// manager's own id and email.
    #[instrument(skip(self))]
    pub async fn manager(&self, key: &str) -> Result<Profile, DirectoryError> {
        let inner = Arc::clone(&self.inner);
        let lookup = key.to_string();
        let (fut, inserted) = self
            .inner
            .caches
            .managers
            .get_or_insert_with(key, || fetch_manager(inner, lookup).boxed());
        if inserted {
            let inner = Arc::clone(&self.inner);
            let observed = fut.clone();
            tokio::spawn(async move {
                if let Ok(profile) = observed.clone().await {
                    inner.caches.seed_profile(&profile, observed);
                }
            });
        }
        fut.await
    }

    /// Walk the manager relation upward from `key`, bounded at the
    /// configured depth.
    ///
    /// A `NotFound` from the manager resolver means the top of the hierarchy
    /// was reached; the chain accumulated so far is returned without error.
    /// Any other failure propagates and discards partial progress. The depth
    /// bound guarantees termination even on a cyclic manager graph.
    #[instrument(skip(self))]
    pub async fn manager_chain(&self, key: &str) -> Result<Vec<Profile>, DirectoryError> {
        let mut chain = Vec::new();
        let mut current = key.to_string();
        for _ in 0..self.inner.config.max_chain_depth {
            match self.manager(&current).await {
                Ok(profile) => {
                    current = profile.id.clone();
                    chain.push(profile);
                }
                Err(DirectoryError::NotFound) => {
                    debug!(depth = chain.len(), "reached top of reporting chain");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(chain)
    }

    /// List the entity's direct reports, excluding disabled accounts.
    ///
    /// Each resolved member is also seeded into the profile cache under its
    /// own id and email.
    #[instrument(skip(self))]
    pub async fn direct_reports(&self, key: &str) -> Result<Vec<Profile>, DirectoryError> {
        let inner = Arc::clone(&self.inner);
        let lookup = key.to_string();
        let (fut, inserted) = self
            .inner
            .caches
            .directs
            .get_or_insert_with(key, || fetch_direct_reports(inner, lookup).boxed());
        if inserted {
            let inner = Arc::clone(&self.inner);
            let observed = fut.clone();
            tokio::spawn(async move {
                if let Ok(members) = observed.await {
                    inner.caches.seed_members(&members);
                }
            });
        }
        fut.await
    }

    /// Once the driving profile future resolves, store it under the
    /// entity's id and email and alias the sibling caches. A rejected
    /// future performs no write.
    fn register_cross_index(&self, origin_key: &str, fut: SharedFetch<Profile>) {
        let inner = Arc::clone(&self.inner);
        let origin = origin_key.to_string();
        tokio::spawn(async move {
            if let Ok(profile) = fut.clone().await {
                inner.caches.cross_index(&origin, &profile, fut);
            }
        });
    }
}

fn build_http_client(config: &DirectoryConfig) -> Result<reqwest::Client, DirectoryError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .pool_max_idle_per_host(10)
        .tcp_nodelay(true)
        .build()
        .map_err(|e| DirectoryError::Transport(e.to_string()))
}

async fn fetch_profile(inner: Arc<ClientInner>, key: String) -> Result<Profile, DirectoryError> {
    let url = format!("/users/{key}?$select={}", inner.config.select_fields);
    let item = inner.batcher.enqueue(url, "GET").await?;

    let status = StatusCode::from_u16(item.status)
        .map_err(|_| DirectoryError::Decode(format!("invalid status code {}", item.status)))?;
    if !status.is_success() {
        return Err(DirectoryError::from_status(status, service_message(&item.body)));
    }

    let payload: UserPayload = serde_json::from_value(item.body)
        .map_err(|e| DirectoryError::Decode(e.to_string()))?;
    Ok(Profile::from(payload))
}

async fn fetch_manager(inner: Arc<ClientInner>, key: String) -> Result<Profile, DirectoryError> {
    let url = format!(
        "{}/users/{key}/manager?$select={}",
        inner.config.base_url, inner.config.select_fields
    );
    let payload: UserPayload = get_json(&inner, &url).await?;
    Ok(Profile::from(payload))
}

async fn fetch_direct_reports(
    inner: Arc<ClientInner>,
    key: String,
) -> Result<Vec<Profile>, DirectoryError> {
    let url = format!(
        "{}/users/{key}/directReports?$select={},accountEnabled",
        inner.config.base_url, inner.config.select_fields
    );
    let payload: CollectionPayload = get_json(&inner, &url).await?;
    Ok(payload
        .value
        .into_iter()
        .filter(|member| member.account_enabled != Some(false))
        .map(Profile::from)
        .collect())
}

async fn fetch_photo(inner: Arc<ClientInner>, key: String) -> Result<String, DirectoryError> {
    let url = format!("{}/users/{key}/photo/$value", inner.config.base_url);
    let token = inner.tokens.bearer_token().await?;

    debug!(%url, "GET photo");
    let response = inner
        .http
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| DirectoryError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DirectoryError::from_status(status, body));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes: bytes::Bytes = response
        .bytes()
        .await
        .map_err(|e| DirectoryError::Transport(e.to_string()))?;

    Ok(format!("data:{content_type};base64,{}", BASE64.encode(&bytes)))
}

async fn get_json<T: DeserializeOwned>(
    inner: &ClientInner,
    url: &str,
) -> Result<T, DirectoryError> {
    let token = inner.tokens.bearer_token().await?;

    debug!(%url, "GET");
    let response = inner
        .http
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| DirectoryError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .map_or_else(|| body.clone(), |v| service_message(&v));
        return Err(DirectoryError::from_status(status, message));
    }

    response
        .json()
        .await
        .map_err(|e| DirectoryError::Decode(e.to_string()))
}

/// Pull the service's error message out of a failure body, falling back to
/// the raw JSON when the shape is unfamiliar.
fn service_message(body: &Value) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), str::to_string)
}
