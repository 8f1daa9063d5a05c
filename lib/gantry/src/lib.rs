//! HTTP client middleware pipeline.
//!
//! Wraps a [`Transport`] with a chain of tower stages, outermost first:
//!
//! 1. retry with exponential backoff,
//! 2. GET 404 resolved as a null-body success,
//! 3. correlation id header,
//! 4. logging with timing,
//! 5. TTL response cache,
//! 6. in-flight coalescing of concurrent identical requests.
//!
//! Each stage can be switched off or re-ordered through [`PipelineConfig`].
//!
//! # Example
//!
//! ```ignore
//! use gantry::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! pub struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let client = Client::builder()
//!     .base_address("https://api.example.com")
//!     .build_client()?;
//!
//! // `None` when the user does not exist
//! let user: Option<User> = client.get("users/42", CallOptions::new()).await?.json()?;
//! ```

mod client;
mod config;
#[cfg(feature = "hyper-transport")]
mod connector;
#[cfg(feature = "hyper-transport")]
mod hyper_transport;
mod key;
pub mod middleware;
mod pipeline;
pub mod prelude;
mod transport;

// Re-export client and pipeline types
pub use client::{CallOptions, Client};
pub use config::{
    DEFAULT_CACHE_STATUS_RANGES, DEFAULT_CACHEABLE_METHODS, DEFAULT_CORRELATION_ID_HEADER,
    DEFAULT_RETRYABLE_METHODS, DEFAULT_RETRYABLE_STATUS_RANGES, MAX_CACHE_TTL, PipelineConfig,
    Stage, StatusRange, TransportConfig, TransportConfigBuilder,
};
#[cfg(feature = "hyper-transport")]
pub use hyper_transport::HyperTransport;
pub use key::{KeyFn, default_key};
pub use pipeline::{BoxedService, Pipeline, PipelineBuilder, ServiceFuture};
pub use transport::TransportService;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use gantry_core::{
    Error, JSON_CONTENT_TYPE, Metadata, MetadataState, Method, Request, RequestBuilder, Response,
    Result, Transport, from_json, to_json,
};

// Re-export http types for status codes and headers
pub use gantry_core::{StatusCode, header};
