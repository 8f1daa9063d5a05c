//! Tower middleware layers making up the gantry pipeline.
//!
//! Each stage is a [`Layer`] producing a [`tower::Service`] over
//! [`Request`](crate::Request)/[`Response`](crate::Response). The
//! [`PipelineBuilder`](crate::PipelineBuilder) stacks them in a fixed order; they
//! can also be composed by hand with a [`ServiceBuilder`].
//!
//! # Available Layers
//!
//! - [`RetryLayer`] with [`RetryPolicy`] - Re-issues eligible failures with exponential backoff
//! - [`NotFoundToNullLayer`] - Resolves a GET 404 as a success without body
//! - [`CorrelationIdLayer`] - Attaches or propagates the correlation id header
//! - [`LoggingLayer`] - Logs requests/responses using `tracing`
//! - [`CachingLayer`] - Serves and records responses in a [`ResponseCache`]
//! - [`InFlightLayer`] - Coalesces concurrent identical requests
//!
//! # Example
//!
//! ```ignore
//! use gantry::middleware::{CachingLayer, InFlightLayer, InFlightTable, ResponseCache, ServiceBuilder};
//! use gantry::TransportService;
//! use std::time::Duration;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CachingLayer::new(ResponseCache::new(Duration::from_secs(60), 25)))
//!     .layer(InFlightLayer::new(InFlightTable::new()))
//!     .service(TransportService::new(transport));
//! ```

mod caching;
mod correlation_id;
mod in_flight;
mod logging;
#[cfg(test)]
pub(crate) mod mock;
mod not_found;
mod retry;

pub use caching::{CachePolicy, Caching, CachingLayer, ResponseCache, ShouldCache};
pub use correlation_id::{CorrelationId, CorrelationIdLayer, IdGenerator, uuid_generator};
pub use in_flight::{InFlight, InFlightLayer, InFlightTable};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use not_found::{NotFoundToNull, NotFoundToNullLayer};
pub use retry::{RetryEligibility, RetryPolicy, ShouldRetry};

// Re-export tower types for convenience
pub use tower::retry::RetryLayer;
pub use tower::{Layer, ServiceBuilder};
