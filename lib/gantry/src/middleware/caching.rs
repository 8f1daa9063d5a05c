//! Response caching stage.
//!
//! Serves repeated requests from a bounded, TTL-limited [`ResponseCache`] and
//! records cacheable responses on the way out. A hit short-circuits every stage
//! inside this one, the transport included.

use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::debug;

use crate::config::{
    DEFAULT_CACHE_STATUS_RANGES, DEFAULT_CACHEABLE_METHODS, MAX_CACHE_TTL, StatusRange,
};
use crate::key::{KeyFn, default_key_fn};
use crate::{Error, Method, Request, Response, Result};

/// Decides whether a response may be stored.
pub type ShouldCache = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

// ============================================================================
// Store
// ============================================================================

/// Key/response store with a time-to-live and a bounded number of entries.
///
/// Entries expire `ttl` after insertion; reading an entry does not extend it.
/// When full, the least recently used entry is evicted. Clones share the store.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, Response>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create an empty store.
    ///
    /// `ttl` is capped at [`MAX_CACHE_TTL`].
    #[must_use]
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let ttl = ttl.min(MAX_CACHE_TTL);
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries, ttl }
    }

    /// Live entry for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Response> {
        self.entries.get(key)
    }

    /// Stores `response` under `key`, replacing any previous entry.
    pub fn insert(&self, key: String, response: Response) {
        self.entries.insert(key, response);
    }

    /// Returns `true` if a live entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drops the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of stored entries, after pending evictions are applied.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Returns `true` if the store holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Which responses are stored.
#[derive(Clone)]
pub enum CachePolicy {
    /// Store responses to the listed methods whose status falls in a range,
    /// unless the response was itself served from the cache.
    Filter {
        /// Cacheable status ranges.
        statuses: Vec<StatusRange>,
        /// Cacheable methods.
        methods: Vec<Method>,
    },
    /// Store whatever the predicate accepts.
    Custom(ShouldCache),
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Filter {
            statuses: DEFAULT_CACHE_STATUS_RANGES.to_vec(),
            methods: DEFAULT_CACHEABLE_METHODS.to_vec(),
        }
    }
}

impl CachePolicy {
    /// Returns `true` if `response` may be stored.
    #[must_use]
    pub fn should_cache(&self, response: &Response) -> bool {
        match self {
            Self::Custom(predicate) => predicate(response),
            Self::Filter { statuses, methods } => {
                let Some(request) = response.request() else {
                    return false;
                };
                !request.metadata().served_from_cache()
                    && methods.contains(&request.method())
                    && StatusRange::any_contains(statuses, response.status())
            }
        }
    }
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter { statuses, methods } => f
                .debug_struct("Filter")
                .field("statuses", statuses)
                .field("methods", methods)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ============================================================================
// Layer & Service
// ============================================================================

/// Layer that serves and records responses in a [`ResponseCache`].
#[derive(Clone)]
pub struct CachingLayer {
    cache: ResponseCache,
    key: KeyFn,
    policy: CachePolicy,
}

impl CachingLayer {
    /// Create a caching layer over `cache` with the default key and policy.
    #[must_use]
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            cache,
            key: default_key_fn(),
            policy: CachePolicy::default(),
        }
    }

    /// Replace the key function.
    #[must_use]
    pub fn with_key(mut self, key: KeyFn) -> Self {
        self.key = key;
        self
    }

    /// Replace the cache policy.
    #[must_use]
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl fmt::Debug for CachingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingLayer")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for CachingLayer {
    type Service = Caching<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Caching {
            inner,
            cache: self.cache.clone(),
            key: Arc::clone(&self.key),
            policy: self.policy.clone(),
        }
    }
}

/// Service that serves and records responses in a [`ResponseCache`].
#[derive(Clone)]
pub struct Caching<S> {
    inner: S,
    cache: ResponseCache,
    key: KeyFn,
    policy: CachePolicy,
}

impl<S> Service<Request> for Caching<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let key = (self.key)(&request);

        if let Some(cached) = self.cache.get(&key) {
            debug!(%key, status = cached.status(), "serving response from cache");
            request.metadata().mark_served_from_cache(Instant::now());
            return Box::pin(future::ready(Ok(cached.with_request(request))));
        }

        let cache = self.cache.clone();
        let policy = self.policy.clone();
        let origin = request.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(request).await?;
            if response.request().is_none() {
                response.set_request(origin);
            }

            if policy.should_cache(&response) {
                debug!(%key, status = response.status(), "caching response");
                cache.insert(key, response.clone());
            }

            Ok(response)
        })
    }
}

impl<S: fmt::Debug> fmt::Debug for Caching<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caching")
            .field("inner", &self.inner)
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
