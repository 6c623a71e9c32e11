//! Rolodex - Coalescing Directory Client
//!
//! Rolodex is a client-side access layer for a directory/profile service
//! reached over HTTP. The interesting part is not the HTTP calls but the
//! request coalescing and multi-key memoization engine in front of them:
//!
//! - **Coalescing**: concurrent lookups for the same key share one
//!   underlying request.
//! - **Batching**: many logical requests are folded into a single network
//!   round trip, flushed on a size threshold or a debounce window.
//! - **Cross-indexing**: one resolved future is stored under every key the
//!   entity is reachable by (opaque id and email), across four independent
//!   per-operation caches (profile, photo, manager, direct reports).
//! - **Chain traversal**: bounded ascent of the manager relation,
//!   terminated cleanly by the not-found sentinel.
//!
//! Token acquisition is an external collaborator injected behind
//! [`TokenProvider`]; nothing is ever evicted or retried, and no state
//! survives the process.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rolodex::{DirectoryClient, DirectoryConfig, StaticTokenProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rolodex::DirectoryError> {
//!     let client = DirectoryClient::new(
//!         DirectoryConfig::load().map_err(|e| rolodex::DirectoryError::Config(e.to_string()))?,
//!         Arc::new(StaticTokenProvider::new(std::env::var("ROLODEX_TOKEN").unwrap_or_default())),
//!     )?;
//!
//!     for manager in client.manager_chain("ada@example.com").await? {
//!         println!("{}", manager.display_name.unwrap_or(manager.id));
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod batch;
mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types for convenience
pub use auth::{StaticTokenProvider, TokenProvider};
pub use batch::{BatchTransport, Batcher, HttpBatchTransport};
pub use client::DirectoryClient;
pub use config::{ConfigError, DirectoryConfig};
pub use error::DirectoryError;
pub use types::{BatchItemResponse, BatchRequestItem, Profile};
