//! Per-call metadata carried through the pipeline.
//!
//! A [`Metadata`] handle is created with each logical call and shared by every
//! copy of the request made for it (retries included), so stages see and append
//! to the same record. Fields are only ever added or advanced, never cleared.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

/// Snapshot of the metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataState {
    /// Correlation id, once assigned.
    pub correlation_id: Option<String>,
    /// When the current timing window started.
    pub start_time: Option<Instant>,
    /// When the last response or failure was observed.
    pub end_time: Option<Instant>,
    /// `end_time - start_time`, in milliseconds.
    pub duration_ms: Option<u64>,
    /// Number of retries issued so far for this call.
    pub retry_attempt: u32,
    /// The response was served by the response cache.
    pub served_from_cache: bool,
    /// The response was shared from another in-flight call.
    pub served_from_in_flight: bool,
}

/// Shared handle on the metadata of one logical call.
///
/// Cloning the handle does not copy the record: both clones observe the same
/// state. Use [`Metadata::new`] for an independent record.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    state: Arc<Mutex<MetadataState>>,
}

impl Metadata {
    /// Creates an empty metadata record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetadataState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> MetadataState {
        self.lock().clone()
    }

    /// Returns `true` if both handles point at the same record.
    #[must_use]
    pub fn same_record(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Correlation id, if assigned.
    #[must_use]
    pub fn correlation_id(&self) -> Option<String> {
        self.lock().correlation_id.clone()
    }

    /// Records the correlation id.
    pub fn set_correlation_id(&self, id: impl Into<String>) {
        self.lock().correlation_id = Some(id.into());
    }

    /// Start of the current timing window.
    #[must_use]
    pub fn start_time(&self) -> Option<Instant> {
        self.lock().start_time
    }

    /// Sets the start time to `now` unless one is already recorded.
    ///
    /// Returns the effective start time.
    pub fn start_if_unset(&self, now: Instant) -> Instant {
        *self.lock().start_time.get_or_insert(now)
    }

    /// Records `now` as the end time and computes the duration.
    ///
    /// Returns the duration in milliseconds, or `None` without a start time.
    pub fn finish(&self, now: Instant) -> Option<u64> {
        let mut state = self.lock();
        state.end_time = Some(now);
        state.duration_ms = state.start_time.map(|start| {
            let elapsed = now.saturating_duration_since(start).as_millis();
            u64::try_from(elapsed).unwrap_or(u64::MAX)
        });
        state.duration_ms
    }

    /// Last computed duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        self.lock().duration_ms
    }

    /// Number of retries issued so far.
    #[must_use]
    pub fn retry_attempt(&self) -> u32 {
        self.lock().retry_attempt
    }

    /// Advances the retry counter and returns the new attempt number.
    pub fn next_retry_attempt(&self) -> u32 {
        let mut state = self.lock();
        state.retry_attempt = state.retry_attempt.saturating_add(1);
        state.retry_attempt
    }

    /// The response was served from the response cache.
    #[must_use]
    pub fn served_from_cache(&self) -> bool {
        self.lock().served_from_cache
    }

    /// Flags a cache hit and restarts the timing window at `now`.
    pub fn mark_served_from_cache(&self, now: Instant) {
        let mut state = self.lock();
        state.served_from_cache = true;
        state.start_time = Some(now);
    }

    /// The response was shared from another in-flight call.
    #[must_use]
    pub fn served_from_in_flight(&self) -> bool {
        self.lock().served_from_in_flight
    }

    /// Flags a coalesced call.
    pub fn mark_served_from_in_flight(&self) {
        self.lock().served_from_in_flight = true;
    }
}
