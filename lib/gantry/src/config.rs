//! Pipeline and transport configuration.
//!
//! [`PipelineConfig`] holds every plain-data option and can be read from JSON
//! using the option names below. Closures (key functions, predicates, id
//! generator, transport) are set on [`crate::PipelineBuilder`].
//!
//! | Option | Default |
//! |--------|---------|
//! | `baseAddress` | `""` |
//! | `useLogging` | `true` |
//! | `useCorrelationId` | `true` |
//! | `correlationIdHeaderName` | `X-Correlation-Id` |
//! | `useCaching` | `true` |
//! | `cacheTtlMs` | `300000` |
//! | `cacheMaxEntries` | `25` |
//! | `cacheStatusRanges` | `[[200, 299]]` |
//! | `cacheableMethods` | `["GET"]` |
//! | `cacheInFlightRequests` | `true` |
//! | `useGetNotFoundReturnsNull` | `true` |
//! | `useRetry` | `true` |
//! | `maxRetryAttempts` | `5` |
//! | `baseDelayMs` | `1000` |
//! | `retryableMethods` | `["GET", "PUT", "OPTIONS", "DELETE", "HEAD"]` |
//! | `retryableStatusRanges` | `[[100, 199], [429, 429], [500, 599]]` |
//! | `stageOrder` | canonical order, see [`Stage::CANONICAL_ORDER`] |

use std::collections::HashSet;
use std::time::Duration;

use gantry_core::{Error, Method, Result};
use serde::Deserialize;

/// Default correlation id header.
pub const DEFAULT_CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Longest cache time-to-live the store accepts (1000 years).
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(1000 * 365 * 24 * 60 * 60);

/// Default cacheable status range.
pub const DEFAULT_CACHE_STATUS_RANGES: [StatusRange; 1] = [StatusRange::new(200, 299)];

/// Default cacheable methods.
pub const DEFAULT_CACHEABLE_METHODS: [Method; 1] = [Method::Get];

/// Default retryable status ranges: informational, too-many-requests and server errors.
pub const DEFAULT_RETRYABLE_STATUS_RANGES: [StatusRange; 3] = [
    StatusRange::new(100, 199),
    StatusRange::new(429, 429),
    StatusRange::new(500, 599),
];

/// Default retryable methods.
pub const DEFAULT_RETRYABLE_METHODS: [Method; 5] = [
    Method::Get,
    Method::Put,
    Method::Options,
    Method::Delete,
    Method::Head,
];

// ============================================================================
// Status ranges & stages
// ============================================================================

/// Inclusive range of HTTP status codes, written `[start, end]` in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "(u16, u16)")]
pub struct StatusRange {
    /// First status in the range.
    pub start: u16,
    /// Last status in the range.
    pub end: u16,
}

impl StatusRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `status` falls within the range.
    #[must_use]
    pub const fn contains(&self, status: u16) -> bool {
        status >= self.start && status <= self.end
    }

    /// Returns `true` if any range contains `status`.
    #[must_use]
    pub fn any_contains(ranges: &[Self], status: u16) -> bool {
        ranges.iter().any(|range| range.contains(status))
    }
}

impl From<(u16, u16)> for StatusRange {
    fn from((start, end): (u16, u16)) -> Self {
        Self::new(start, end)
    }
}

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Re-issues eligible failures with exponential backoff.
    Retry,
    /// Turns a GET 404 into a null-body success.
    NotFoundToNull,
    /// Attaches or propagates the correlation id header.
    CorrelationId,
    /// Logs requests, responses and failures with timing.
    Logging,
    /// Serves and records responses in the TTL cache.
    Caching,
    /// Coalesces concurrent identical requests.
    InFlight,
}

impl Stage {
    /// Stage order used unless overridden, outermost first.
    ///
    /// Retry wraps everything so each retry is a fresh pass through the other
    /// stages. The 404 translation sits right inside it, so a translated GET is a
    /// success by the time retry looks at it. The correlation id is attached
    /// before logging so every line of an attempt carries it. Caching wraps the
    /// in-flight stage: a cache hit never touches the in-flight table.
    pub const CANONICAL_ORDER: [Self; 6] = [
        Self::Retry,
        Self::NotFoundToNull,
        Self::CorrelationId,
        Self::Logging,
        Self::Caching,
        Self::InFlight,
    ];
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Plain-data pipeline options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root address prefix for all requests made through the client facade.
    pub base_address: String,
    /// Enable the logging stage.
    pub use_logging: bool,
    /// Enable the correlation-id stage.
    pub use_correlation_id: bool,
    /// Header carrying the correlation id.
    pub correlation_id_header_name: String,
    /// Enable the caching stage.
    pub use_caching: bool,
    /// Time-to-live of cached responses, in milliseconds.
    pub cache_ttl_ms: u64,
    /// Maximum number of cached responses.
    pub cache_max_entries: u64,
    /// Cacheable status ranges; `None` means [`DEFAULT_CACHE_STATUS_RANGES`].
    pub cache_status_ranges: Option<Vec<StatusRange>>,
    /// Cacheable methods; `None` means [`DEFAULT_CACHEABLE_METHODS`].
    pub cacheable_methods: Option<Vec<Method>>,
    /// Enable the in-flight coalescing stage.
    pub cache_in_flight_requests: bool,
    /// Enable the GET 404 to null translation.
    pub use_get_not_found_returns_null: bool,
    /// Enable the retry stage.
    pub use_retry: bool,
    /// Retries allowed per logical call.
    pub max_retry_attempts: u32,
    /// Backoff base delay, in milliseconds.
    pub base_delay_ms: u64,
    /// Methods eligible for retry on HTTP failures; `None` means [`DEFAULT_RETRYABLE_METHODS`].
    pub retryable_methods: Option<Vec<Method>>,
    /// Retryable status ranges; `None` means [`DEFAULT_RETRYABLE_STATUS_RANGES`].
    pub retryable_status_ranges: Option<Vec<StatusRange>>,
    /// Stage order override, outermost first. Stages left out are not built.
    pub stage_order: Option<Vec<Stage>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_address: String::new(),
            use_logging: true,
            use_correlation_id: true,
            correlation_id_header_name: DEFAULT_CORRELATION_ID_HEADER.to_string(),
            use_caching: true,
            cache_ttl_ms: 300_000,
            cache_max_entries: 25,
            cache_status_ranges: None,
            cacheable_methods: None,
            cache_in_flight_requests: true,
            use_get_not_found_returns_null: true,
            use_retry: true,
            max_retry_attempts: 5,
            base_delay_ms: 1000,
            retryable_methods: None,
            retryable_status_ranges: None,
            stage_order: None,
        }
    }
}

impl PipelineConfig {
    /// Reads options from a JSON document; missing options keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed JSON, unknown options or
    /// invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_slice(json.as_bytes())
    }

    /// Reads options from JSON bytes.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::from_json_str`].
    pub fn from_json_slice(json: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(json)
            .map_err(|e| Error::config(format!("invalid pipeline configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Cache time-to-live.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Retry base delay.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Effective stage order, outermost first.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.stage_order
            .clone()
            .unwrap_or_else(|| Stage::CANONICAL_ORDER.to_vec())
    }

    /// Returns `true` if `stage` is switched on.
    #[must_use]
    pub const fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Retry => self.use_retry,
            Stage::NotFoundToNull => self.use_get_not_found_returns_null,
            Stage::CorrelationId => self.use_correlation_id,
            Stage::Logging => self.use_logging,
            Stage::Caching => self.use_caching,
            Stage::InFlight => self.cache_in_flight_requests,
        }
    }

    /// Checks values that are invalid on their own.
    ///
    /// Conflicts with closures supplied to the builder are checked by
    /// [`crate::PipelineBuilder::build`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("cacheStatusRanges", &self.cache_status_ranges),
            ("retryableStatusRanges", &self.retryable_status_ranges),
        ];
        for (option, ranges) in ranges {
            if let Some(bad) = ranges.iter().flatten().find(|r| r.start > r.end) {
                return Err(Error::config(format!(
                    "{option}: range [{}, {}] starts after it ends",
                    bad.start, bad.end
                )));
            }
        }

        if self.use_caching && self.cache_max_entries == 0 {
            return Err(Error::config("cacheMaxEntries must be at least 1"));
        }

        if self.use_caching && self.cache_ttl() > MAX_CACHE_TTL {
            return Err(Error::config(format!(
                "cacheTtlMs must not exceed {} (1000 years)",
                MAX_CACHE_TTL.as_millis()
            )));
        }

        if self.use_correlation_id && self.correlation_id_header_name.is_empty() {
            return Err(Error::config("correlationIdHeaderName must not be empty"));
        }

        if let Some(order) = &self.stage_order {
            let mut seen = HashSet::new();
            if let Some(stage) = order.iter().find(|stage| !seen.insert(**stage)) {
                return Err(Error::config(format!(
                    "stageOrder lists {stage:?} more than once"
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Transport Configuration
// ============================================================================

/// Configuration handed to the default transport or a transport factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Deadline for a single exchange with the server.
    pub timeout: Duration,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl TransportConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
}

impl TransportConfigBuilder {
    /// Set the exchange timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> TransportConfig {
        let defaults = TransportConfig::default();
        TransportConfig {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[test]
    fn pipeline_defaults() {
        let config = PipelineConfig::default();
        check!(config.use_logging);
        check!(config.correlation_id_header_name == "X-Correlation-Id");
        check!(config.cache_ttl() == Duration::from_secs(300));
        check!(config.max_retry_attempts == 5);
        check!(config.base_delay() == Duration::from_secs(1));
        check!(config.stages() == Stage::CANONICAL_ORDER.to_vec());
        check!(config.validate().is_ok());
    }

    #[test]
    fn json_overrides_keep_other_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "baseAddress": "https://api.example.com",
                "useCaching": false,
                "maxRetryAttempts": 2,
                "retryableStatusRanges": [[500, 599]],
                "cacheableMethods": ["GET", "HEAD"]
            }"#,
        )
        .expect("config");

        check!(config.base_address == "https://api.example.com");
        check!(!config.use_caching);
        check!(config.max_retry_attempts == 2);
        check!(config.retryable_status_ranges == Some(vec![StatusRange::new(500, 599)]));
        check!(config.cacheable_methods == Some(vec![Method::Get, Method::Head]));
        check!(config.use_retry);
        check!(config.cache_in_flight_requests);
    }

    #[test]
    fn json_stage_order() {
        let config =
            PipelineConfig::from_json_str(r#"{"stageOrder": ["logging", "retry", "inFlight"]}"#)
                .expect("config");
        check!(config.stages() == vec![Stage::Logging, Stage::Retry, Stage::InFlight]);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let_assert!(Err(Error::Config(message)) = PipelineConfig::from_json_str(r#"{"useCache": true}"#));
        check!(message.contains("useCache"));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let_assert!(
            Err(Error::Config(message)) =
                PipelineConfig::from_json_str(r#"{"cacheStatusRanges": [[299, 200]]}"#)
        );
        check!(message.contains("cacheStatusRanges"));
    }

    #[test]
    fn duplicated_stage_is_rejected() {
        let config = PipelineConfig {
            stage_order: Some(vec![Stage::Retry, Stage::Logging, Stage::Retry]),
            ..PipelineConfig::default()
        };
        let_assert!(Err(Error::Config(message)) = config.validate());
        check!(message.contains("Retry"));
    }

    #[test]
    fn zero_capacity_cache_is_rejected() {
        let config = PipelineConfig {
            cache_max_entries: 0,
            ..PipelineConfig::default()
        };
        check!(config.validate().is_err());

        let config = PipelineConfig {
            use_caching: false,
            ..config
        };
        check!(config.validate().is_ok());
    }

    #[test]
    fn oversized_cache_ttl_is_rejected() {
        let_assert!(
            Err(Error::Config(message)) =
                PipelineConfig::from_json_str(r#"{"cacheTtlMs": 18446744073709551615}"#)
        );
        check!(message.contains("cacheTtlMs"));

        let longest = PipelineConfig {
            cache_ttl_ms: u64::try_from(MAX_CACHE_TTL.as_millis()).expect("fits"),
            ..PipelineConfig::default()
        };
        check!(longest.validate().is_ok());

        let uncached = PipelineConfig {
            use_caching: false,
            cache_ttl_ms: u64::MAX,
            ..PipelineConfig::default()
        };
        check!(uncached.validate().is_ok());
    }

    #[test]
    fn status_ranges_are_inclusive() {
        check!(StatusRange::new(429, 429).contains(429));
        check!(!StatusRange::new(500, 599).contains(600));
        check!(StatusRange::any_contains(&DEFAULT_RETRYABLE_STATUS_RANGES, 100));
        check!(!StatusRange::any_contains(&DEFAULT_RETRYABLE_STATUS_RANGES, 404));
    }

    #[test]
    fn transport_builder_overrides() {
        let config = TransportConfig::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(16)
            .build();

        check!(config.timeout == Duration::from_secs(60));
        check!(config.connect_timeout == Duration::from_secs(10));
        check!(config.pool_idle_per_host == 16);
    }
}
