//! Request/response logging stage.
//!
//! Logs every pass through the pipeline using the `tracing` crate and keeps the
//! timing fields of the call [`crate::Metadata`] up to date.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, error, field, info, span, warn};

use crate::{Error, Metadata, Request, Response, Result};

/// Layer that adds request/response logging.
///
/// # Example
///
/// ```ignore
/// use gantry::middleware::LoggingLayer;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(LoggingLayer::new())
///     .service(transport);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

/// Verbosity of the "sending request" event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at debug level, with request headers.
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

impl LoggingLayer {
    /// Create a new logging layer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer with the given level.
    #[must_use]
    pub const fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Service that logs requests, responses and failures with their duration.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

impl<S> Logging<S> {
    /// Create a new logging service wrapping the given service.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            level: LogLevel::Info,
        }
    }
}

impl<S> Service<Request> for Logging<S>
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
        let method = request.method();
        let target = request.target();
        let metadata = request.metadata().clone();
        let level = self.level;

        let span = span!(
            Level::INFO,
            "http_request",
            %method,
            %target,
            correlation_id = field::Empty
        );
        if let Some(id) = metadata.correlation_id() {
            span.record("correlation_id", id.as_str());
        }

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                metadata.start_if_unset(Instant::now());
                let retry_attempt = metadata.retry_attempt();

                match level {
                    LogLevel::Debug => {
                        debug!(headers = ?request.headers(), retry_attempt, "sending request");
                    }
                    LogLevel::Info => info!(retry_attempt, "sending request"),
                }

                let result = inner.call(request).await;
                let duration_ms = metadata.finish(Instant::now()).unwrap_or_default();

                match &result {
                    Ok(response) => info!(
                        status = response.status(),
                        status_text = response.status_text(),
                        duration_ms,
                        served_from_cache = metadata.served_from_cache(),
                        served_from_in_flight = metadata.served_from_in_flight(),
                        "request completed"
                    ),
                    Err(err) => log_failure(err, duration_ms, &metadata),
                }

                result
            }
            .instrument(span),
        )
    }
}

fn log_failure(err: &Error, duration_ms: u64, metadata: &Metadata) {
    let retry_attempt = metadata.retry_attempt();
    match err.response() {
        Some(response) if response.status() < 500 => warn!(
            status = response.status(),
            status_text = response.status_text(),
            duration_ms,
            retry_attempt,
            "request failed with HTTP error"
        ),
        Some(response) => error!(
            status = response.status(),
            status_text = response.status_text(),
            duration_ms,
            retry_attempt,
            "request failed with HTTP error"
        ),
        None if err.is_connectivity() => {
            error!(error = %err, duration_ms, retry_attempt, "request failed without a response");
        }
        None => error!(error = %err, duration_ms, "request failed with an unexpected error"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use assert2::{check, let_assert};
    use tower::ServiceExt;
    use tracing::field::{Field, Visit};
    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::middleware::mock::{MockService, Reply, get};

    /// One recorded event: level, message and the other fields as debug strings.
    #[derive(Debug, Clone)]
    struct Captured {
        level: Level,
        message: String,
        fields: HashMap<String, String>,
    }

    impl Captured {
        fn field(&self, name: &str) -> Option<&str> {
            self.fields.get(name).map(String::as_str)
        }
    }

    #[derive(Default)]
    struct Fields(HashMap<String, String>);

    impl Visit for Fields {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    /// Records every event emitted while installed on the current thread.
    #[derive(Clone, Default)]
    struct Capture {
        events: Arc<Mutex<Vec<Captured>>>,
    }

    impl Capture {
        fn install(&self) -> DefaultGuard {
            tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
        }

        fn find(&self, message: &str) -> Option<Captured> {
            let events = self.events.lock().expect("events");
            events.iter().find(|event| event.message == message).cloned()
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut fields = Fields::default();
            event.record(&mut fields);
            let message = fields.0.remove("message").unwrap_or_default();
            self.events.lock().expect("events").push(Captured {
                level: *event.metadata().level(),
                message,
                fields: fields.0,
            });
        }
    }

    async fn failure_event(reply: Reply) -> Captured {
        let capture = Capture::default();
        let _guard = capture.install();
        let service = LoggingLayer::new().layer(MockService::new([reply]));

        let_assert!(Err(_) = service.oneshot(get("users")).await);
        let events = capture.events.lock().expect("events").clone();
        let failure = events
            .into_iter()
            .find(|event| event.message.starts_with("request failed"));
        let_assert!(Some(event) = failure);
        event
    }

    #[test]
    fn logging_layer_default() {
        let layer = LoggingLayer::new();
        check!(layer.level == LogLevel::Info);
        check!(LoggingLayer::with_level(LogLevel::Debug).level == LogLevel::Debug);
    }

    #[tokio::test(start_paused = true)]
    async fn records_duration_of_success() {
        let mock = MockService::status(200).with_delay(Duration::from_millis(120));
        let service = LoggingLayer::new().layer(mock.clone());

        let request = get("users");
        let metadata = request.metadata().clone();
        let response = service.oneshot(request).await.expect("response");

        check!(response.status() == 200);
        check!(metadata.duration_ms() == Some(120));
        check!(metadata.snapshot().end_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_an_existing_start_time() {
        let mock = MockService::status(200).with_delay(Duration::from_millis(10));
        let service = LoggingLayer::new().layer(mock);

        let request = get("users");
        let metadata = request.metadata().clone();
        metadata.start_if_unset(Instant::now());
        tokio::time::advance(Duration::from_millis(50)).await;

        service.oneshot(request).await.expect("response");
        check!(metadata.duration_ms() == Some(60));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_timed_and_propagated_unchanged() {
        let mock = MockService::status(503).with_delay(Duration::from_millis(30));
        let service = LoggingLayer::with_level(LogLevel::Debug).layer(mock);

        let request = get("users");
        let metadata = request.metadata().clone();
        let result = service.oneshot(request).await;

        let_assert!(Err(Error::Http { status: 503, .. }) = result);
        check!(metadata.duration_ms() == Some(30));
    }

    #[tokio::test]
    async fn connectivity_failures_are_propagated() {
        let service = LoggingLayer::new().layer(MockService::refused());

        let result = service.oneshot(get("users")).await;
        let_assert!(Err(Error::Connection(_)) = result);
    }

    #[tokio::test]
    async fn client_errors_are_logged_as_warnings() {
        let event = failure_event(Reply::Status(404)).await;

        check!(event.level == Level::WARN);
        check!(event.message == "request failed with HTTP error");
        check!(event.field("status") == Some("404"));
        check!(event.field("duration_ms").is_some());
    }

    #[tokio::test]
    async fn server_errors_are_logged_as_errors() {
        let event = failure_event(Reply::Status(503)).await;

        check!(event.level == Level::ERROR);
        check!(event.field("status") == Some("503"));
    }

    #[tokio::test]
    async fn connectivity_failures_are_logged_as_errors() {
        let event = failure_event(Reply::Refused).await;

        check!(event.level == Level::ERROR);
        check!(event.message == "request failed without a response");
        check!(event.field("status").is_none());
    }

    #[tokio::test]
    async fn unexpected_errors_are_logged_as_errors() {
        let event = failure_event(Reply::Invalid).await;

        check!(event.level == Level::ERROR);
        check!(event.message == "request failed with an unexpected error");
    }

    #[tokio::test]
    async fn success_carries_the_served_from_flags() {
        let capture = Capture::default();
        let _guard = capture.install();
        let service = LoggingLayer::new().layer(MockService::status(200));

        let request = get("users");
        request.metadata().mark_served_from_in_flight();
        service.oneshot(request).await.expect("response");

        let_assert!(Some(sending) = capture.find("sending request"));
        check!(sending.level == Level::INFO);

        let_assert!(Some(completed) = capture.find("request completed"));
        check!(completed.level == Level::INFO);
        check!(completed.field("status") == Some("200"));
        check!(completed.field("served_from_cache") == Some("false"));
        check!(completed.field("served_from_in_flight") == Some("true"));
    }
}
