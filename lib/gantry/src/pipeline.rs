//! Pipeline composition.
//!
//! [`PipelineBuilder`] validates a [`PipelineConfig`] together with the
//! closures supplied to it, then stacks the enabled stages around the transport
//! in the configured order (outermost first, see [`Stage::CANONICAL_ORDER`]).
//! The resulting [`Pipeline`] owns the response cache and the in-flight table
//! shared by every call made through it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tower::util::BoxCloneService;
use tower::{Layer, Service};
use tracing::debug;

use crate::config::{
    DEFAULT_CACHE_STATUS_RANGES, DEFAULT_CACHEABLE_METHODS, DEFAULT_RETRYABLE_METHODS,
    DEFAULT_RETRYABLE_STATUS_RANGES, PipelineConfig, Stage, TransportConfig,
};
use crate::key::{KeyFn, default_key_fn};
use crate::middleware::{
    CachePolicy, CachingLayer, CorrelationIdLayer, IdGenerator, InFlightLayer, InFlightTable,
    LogLevel, LoggingLayer, NotFoundToNullLayer, ResponseCache, RetryEligibility, RetryLayer,
    RetryPolicy, ShouldCache, ShouldRetry, uuid_generator,
};
use crate::{Client, Error, Request, Response, Result, Transport, TransportService};

// ============================================================================
// Type-Erased Service for Stage Composition
// ============================================================================

/// Type-erased service for stage composition.
///
/// Every stage wraps and yields one of these, so stages can be stacked in an
/// order only known at runtime.
pub type BoxedService = BoxCloneService<Request, Response, Error>;

/// Future returned by [`Pipeline::execute`].
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

type TransportFactory = Box<dyn FnOnce(&TransportConfig) -> BoxedService + Send>;

/// Thread-safe wrapper for `BoxedService`.
///
/// `BoxCloneService` is not `Sync`; the mutex only guards cloning it.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request) -> ServiceFuture {
        // Lock, clone the service, and release the lock immediately
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.call(request).await })
    }
}

fn boxed<L>(layer: L, service: BoxedService) -> BoxedService
where
    L: Layer<BoxedService>,
    L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    <L::Service as Service<Request>>::Future: Send + 'static,
{
    BoxCloneService::new(layer.layer(service))
}

// ============================================================================
// Pipeline
// ============================================================================

/// The composed stage chain around a transport.
///
/// Cloning a pipeline shares its cache and in-flight table.
///
/// # Example
///
/// ```ignore
/// use gantry::{Method, Pipeline, Request};
///
/// let pipeline = Pipeline::builder().base_address("https://api.example.com").build()?;
/// let request = Request::builder(Method::Get, "users/42")
///     .base_address("https://api.example.com")
///     .build();
/// let response = pipeline.execute(request).await?;
/// ```
#[derive(Clone)]
pub struct Pipeline {
    service: SyncService,
    config: Arc<PipelineConfig>,
    stages: Vec<Stage>,
    cache: Option<ResponseCache>,
    in_flight: Option<InFlightTable>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs `request` through every stage.
    ///
    /// Resolves with the response, or the terminal failure of the call.
    pub fn execute(&self, request: Request) -> ServiceFuture {
        self.service.call(request)
    }

    /// Configuration this pipeline was built from.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stages actually built, outermost first.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Response cache, when the caching stage is built.
    #[must_use]
    pub const fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// In-flight table, when the coalescing stage is built.
    #[must_use]
    pub const fn in_flight(&self) -> Option<&InFlightTable> {
        self.in_flight.as_ref()
    }
}

impl Service<Request> for Pipeline {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // Stages are polled when called
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.execute(request)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Pipeline`] and [`Client`].
///
/// # Example
///
/// ```ignore
/// use gantry::{PipelineBuilder, PipelineConfig};
///
/// let client = PipelineBuilder::new()
///     .config(PipelineConfig {
///         base_address: "https://api.example.com".into(),
///         max_retry_attempts: 3,
///         ..PipelineConfig::default()
///     })
///     .should_retry(|err| err.is_server_error())
///     .build_client()?;
/// ```
#[must_use]
pub struct PipelineBuilder {
    config: PipelineConfig,
    transport_config: TransportConfig,
    transport: Option<BoxedService>,
    transport_factory: Option<TransportFactory>,
    cache_key: Option<KeyFn>,
    in_flight_key: Option<KeyFn>,
    should_cache: Option<ShouldCache>,
    should_retry: Option<ShouldRetry>,
    id_generator: Option<IdGenerator>,
    log_level: LogLevel,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("transport_config", &self.transport_config)
            .field("has_transport", &self.transport.is_some())
            .field("has_transport_factory", &self.transport_factory.is_some())
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            transport_config: TransportConfig::default(),
            transport: None,
            transport_factory: None,
            cache_key: None,
            in_flight_key: None,
            should_cache: None,
            should_retry: None,
            id_generator: None,
            log_level: LogLevel::default(),
        }
    }

    // ========================================================================
    // Plain options
    // ========================================================================

    /// Replace the whole plain-data configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base address.
    pub fn base_address(mut self, base_address: impl Into<String>) -> Self {
        self.config.base_address = base_address.into();
        self
    }

    /// Set the configuration of the default transport or transport factory.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Set the verbosity of the logging stage.
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Use `transport` instead of the default one.
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(BoxCloneService::new(TransportService::new(transport)));
        self
    }

    /// Use an already assembled inner service as the transport.
    ///
    /// The service must report non-2xx responses as [`Error::Http`].
    pub fn transport_service(mut self, service: BoxedService) -> Self {
        self.transport = Some(service);
        self
    }

    /// Build the transport from the transport configuration.
    pub fn transport_factory<F, T>(mut self, factory: F) -> Self
    where
        F: FnOnce(&TransportConfig) -> T + Send + 'static,
        T: Transport + 'static,
    {
        self.transport_factory = Some(Box::new(move |config| {
            BoxCloneService::new(TransportService::new(factory(config)))
        }));
        self
    }

    // ========================================================================
    // Stage hooks
    // ========================================================================

    /// Derive cache keys with `key` instead of `METHOD:target`.
    pub fn cache_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.cache_key = Some(Arc::new(key));
        self
    }

    /// Derive in-flight keys with `key` instead of `METHOD:target`.
    pub fn in_flight_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.in_flight_key = Some(Arc::new(key));
        self
    }

    /// Store exactly the responses `predicate` accepts.
    ///
    /// Excludes `cacheStatusRanges` and `cacheableMethods`.
    pub fn should_cache<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.should_cache = Some(Arc::new(predicate));
        self
    }

    /// Retry exactly the failures `predicate` accepts.
    ///
    /// Excludes `retryableMethods` and `retryableStatusRanges`.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Generate correlation ids with `generator` instead of UUID v4.
    pub fn correlation_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    fn check_exclusive_options(&self) -> Result<()> {
        let config = &self.config;
        if self.should_cache.is_some()
            && (config.cache_status_ranges.is_some() || config.cacheable_methods.is_some())
        {
            return Err(Error::config(
                "shouldCache cannot be combined with cacheStatusRanges or cacheableMethods",
            ));
        }
        if self.should_retry.is_some()
            && (config.retryable_methods.is_some() || config.retryable_status_ranges.is_some())
        {
            return Err(Error::config(
                "shouldRetry cannot be combined with retryableMethods or retryableStatusRanges",
            ));
        }
        if self.transport.is_some() && self.transport_factory.is_some() {
            return Err(Error::config(
                "a transport and a transport factory cannot both be supplied",
            ));
        }
        Ok(())
    }

    fn cache_policy(&self) -> CachePolicy {
        match &self.should_cache {
            Some(predicate) => CachePolicy::Custom(Arc::clone(predicate)),
            None => CachePolicy::Filter {
                statuses: self
                    .config
                    .cache_status_ranges
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CACHE_STATUS_RANGES.to_vec()),
                methods: self
                    .config
                    .cacheable_methods
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CACHEABLE_METHODS.to_vec()),
            },
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        let eligibility = match &self.should_retry {
            Some(predicate) => RetryEligibility::Custom(Arc::clone(predicate)),
            None => RetryEligibility::Filter {
                methods: self
                    .config
                    .retryable_methods
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RETRYABLE_METHODS.to_vec()),
                statuses: self
                    .config
                    .retryable_status_ranges
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RETRYABLE_STATUS_RANGES.to_vec()),
            },
        };
        RetryPolicy::new(self.config.max_retry_attempts, self.config.base_delay())
            .with_eligibility(eligibility)
    }

    /// Validate the options and build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid or mutually exclusive options, or
    /// when no transport is available.
    pub fn build(mut self) -> Result<Pipeline> {
        self.config.validate()?;
        self.check_exclusive_options()?;

        let stages: Vec<Stage> = self
            .config
            .stages()
            .into_iter()
            .filter(|stage| self.config.is_enabled(*stage))
            .collect();

        let cache = stages
            .contains(&Stage::Caching)
            .then(|| ResponseCache::new(self.config.cache_ttl(), self.config.cache_max_entries));
        let in_flight = stages.contains(&Stage::InFlight).then(InFlightTable::new);

        let mut service = match (self.transport.take(), self.transport_factory.take()) {
            (Some(transport), _) => transport,
            (None, Some(factory)) => factory(&self.transport_config),
            (None, None) => default_transport(&self.transport_config)?,
        };

        // Wrap from the innermost stage outwards
        for stage in stages.iter().rev() {
            service = match stage {
                Stage::InFlight => {
                    let table = in_flight.clone().unwrap_or_default();
                    let key = self.in_flight_key.clone().unwrap_or_else(default_key_fn);
                    boxed(InFlightLayer::new(table).with_key(key), service)
                }
                Stage::Caching => {
                    let Some(cache) = cache.clone() else {
                        continue;
                    };
                    let key = self.cache_key.clone().unwrap_or_else(default_key_fn);
                    let layer = CachingLayer::new(cache)
                        .with_key(key)
                        .with_policy(self.cache_policy());
                    boxed(layer, service)
                }
                Stage::Logging => boxed(LoggingLayer::with_level(self.log_level), service),
                Stage::CorrelationId => {
                    let generator = self.id_generator.clone().unwrap_or_else(uuid_generator);
                    let layer = CorrelationIdLayer::new(self.config.correlation_id_header_name.clone())
                        .with_generator(generator);
                    boxed(layer, service)
                }
                Stage::NotFoundToNull => boxed(NotFoundToNullLayer::new(), service),
                Stage::Retry => boxed(RetryLayer::new(self.retry_policy()), service),
            };
        }

        debug!(?stages, "pipeline built");

        Ok(Pipeline {
            service: SyncService::new(service),
            config: Arc::new(self.config),
            stages,
            cache,
            in_flight,
        })
    }

    /// Build the pipeline and wrap it in a [`Client`].
    ///
    /// # Errors
    ///
    /// See [`PipelineBuilder::build`].
    pub fn build_client(self) -> Result<Client> {
        self.build().map(Client::from_pipeline)
    }
}

#[cfg(feature = "hyper-transport")]
#[allow(clippy::unnecessary_wraps)]
fn default_transport(config: &TransportConfig) -> Result<BoxedService> {
    let transport = crate::HyperTransport::with_config(config.clone());
    Ok(BoxCloneService::new(TransportService::new(transport)))
}

#[cfg(not(feature = "hyper-transport"))]
fn default_transport(_config: &TransportConfig) -> Result<BoxedService> {
    Err(Error::config(
        "no transport supplied and the `hyper-transport` feature is disabled",
    ))
}
