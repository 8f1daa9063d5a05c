//! In-flight coalescing stage.
//!
//! Concurrent requests with the same key share one inner call: the first caller
//! registers its pending call in the [`InFlightTable`], later callers await that
//! same call and observe the same outcome. The registration is removed as soon as
//! the call settles or every caller has given up on it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use tower::{Layer, Service};
use tracing::debug;

use crate::key::{KeyFn, default_key_fn};
use crate::{Error, Request, Response, Result};

type PendingCall = Shared<BoxFuture<'static, Result<Response>>>;
type WeakPendingCall = WeakShared<BoxFuture<'static, Result<Response>>>;

// ============================================================================
// Table
// ============================================================================

/// Pending calls by key, shared by every clone.
#[derive(Clone, Default)]
pub struct InFlightTable {
    inner: Arc<TableInner>,
}

#[derive(Default)]
struct TableInner {
    entries: Mutex<HashMap<String, (u64, WeakPendingCall)>>,
    next_id: AtomicU64,
}

impl InFlightTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (u64, WeakPendingCall)>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no call is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns `true` if a call is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Joins the live call registered under `key`, unless `join` is false, or
    /// registers the call built by `lead`.
    ///
    /// Lookup and registration share one lock guard: two callers cannot both
    /// miss the entry and both lead.
    fn join_or_lead(
        &self,
        key: String,
        join: bool,
        lead: impl FnOnce(Registration) -> PendingCall,
    ) -> Pending {
        let mut entries = self.lock();

        if join && let Some(call) = entries.get(&key).and_then(|(_, call)| call.upgrade()) {
            return Pending::Joined(call);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let call = lead(Registration {
            table: self.clone(),
            key: key.clone(),
            id,
        });
        if let Some(weak) = call.downgrade() {
            entries.insert(key, (id, weak));
        }
        Pending::Led(call)
    }

    /// Removes the entry for `key` if it still belongs to registration `id`.
    fn release(&self, key: &str, id: u64) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|(owner, _)| *owner == id) {
            entries.remove(key);
        }
    }
}

impl fmt::Debug for InFlightTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightTable")
            .field("len", &self.len())
            .finish()
    }
}

enum Pending {
    Joined(PendingCall),
    Led(PendingCall),
}

/// Removes its table entry when dropped: on success, failure or cancellation.
struct Registration {
    table: InFlightTable,
    key: String,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.table.release(&self.key, self.id);
    }
}

// ============================================================================
// Layer & Service
// ============================================================================

/// Layer that coalesces concurrent identical requests.
#[derive(Clone)]
pub struct InFlightLayer {
    table: InFlightTable,
    key: KeyFn,
}

impl InFlightLayer {
    /// Create a layer over `table` with the default key.
    #[must_use]
    pub fn new(table: InFlightTable) -> Self {
        Self {
            table,
            key: default_key_fn(),
        }
    }

    /// Replace the key function.
    #[must_use]
    pub fn with_key(mut self, key: KeyFn) -> Self {
        self.key = key;
        self
    }
}

impl fmt::Debug for InFlightLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightLayer")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for InFlightLayer {
    type Service = InFlight<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InFlight {
            inner,
            table: self.table.clone(),
            key: Arc::clone(&self.key),
        }
    }
}

/// Service that coalesces concurrent identical requests.
#[derive(Clone)]
pub struct InFlight<S> {
    inner: S,
    table: InFlightTable,
    key: KeyFn,
}

impl<S> InFlight<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Builds the inner call; it owns `registration` until it settles or is dropped.
    fn lead(&self, registration: Registration, request: Request) -> PendingCall {
        let mut inner = self.inner.clone();
        async move {
            let _registration = registration;
            inner.call(request).await
        }
        .boxed()
        .shared()
    }
}

impl<S> Service<Request> for InFlight<S>
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

        let join = !request.allow_simultaneous_duplicates();
        let leader_request = request.clone();
        let pending = match self.table.join_or_lead(key.clone(), join, |registration| {
            self.lead(registration, leader_request)
        }) {
            Pending::Led(call) => return Box::pin(call),
            Pending::Joined(call) => call,
        };

        debug!(%key, "joining in-flight request");
        request.metadata().mark_served_from_in_flight();
        Box::pin(async move {
            match pending.await {
                Ok(response) => Ok(response.with_request(request)),
                Err(mut err) => {
                    if let Some(response) = err.response_mut() {
                        response.set_request(request);
                    }
                    Err(err)
                }
            }
        })
    }
}

impl<S: fmt::Debug> fmt::Debug for InFlight<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("inner", &self.inner)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
