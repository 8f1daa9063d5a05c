//! Correlation id stage.
//!
//! Makes sure every request leaves with an id in the correlation header and
//! records that id in the call metadata. An id supplied by the caller is never
//! replaced; a retry re-uses the id of its first attempt.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Request, Response, Result};

/// Produces a fresh correlation id.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Default generator: a random UUID v4.
#[must_use]
pub fn uuid_generator() -> IdGenerator {
    Arc::new(|| Uuid::new_v4().to_string())
}

/// Layer that attaches a correlation id to requests.
#[derive(Clone)]
pub struct CorrelationIdLayer {
    header: Arc<str>,
    generator: IdGenerator,
}

impl CorrelationIdLayer {
    /// Create a layer writing ids to `header`, generated as UUID v4.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: Arc::from(header.into()),
            generator: uuid_generator(),
        }
    }

    /// Replace the id generator.
    #[must_use]
    pub fn with_generator(mut self, generator: IdGenerator) -> Self {
        self.generator = generator;
        self
    }
}

impl fmt::Debug for CorrelationIdLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationIdLayer")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationId<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationId {
            inner,
            header: Arc::clone(&self.header),
            generator: Arc::clone(&self.generator),
        }
    }
}

/// Service that attaches a correlation id to requests.
#[derive(Clone)]
pub struct CorrelationId<S> {
    inner: S,
    header: Arc<str>,
    generator: IdGenerator,
}

impl<S> CorrelationId<S> {
    fn assign(&self, request: &mut Request) {
        let metadata = request.metadata().clone();

        if let Some(supplied) = request.header(&self.header).filter(|id| !id.is_empty()) {
            debug!(correlation_id = supplied, "keeping supplied correlation id");
            metadata.set_correlation_id(supplied);
            return;
        }

        let id = match metadata.correlation_id() {
            Some(id) => id,
            None => {
                let id = (self.generator)();
                debug!(correlation_id = %id, "generated correlation id");
                id
            }
        };
        request
            .headers_mut()
            .insert(self.header.to_string(), id.clone());
        metadata.set_correlation_id(id);
    }
}

impl<S: fmt::Debug> fmt::Debug for CorrelationId<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationId")
            .field("inner", &self.inner)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request> for CorrelationId<S>
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

    fn call(&mut self, mut request: Request) -> Self::Future {
        self.assign(&mut request);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert2::{check, let_assert};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::mock::{MockService, get};

    const HEADER: &str = "X-Correlation-Id";

    fn counting_generator() -> (IdGenerator, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        let generator: IdGenerator = Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("id-{n}")
        });
        (generator, count)
    }

    #[tokio::test]
    async fn generates_exactly_one_id() {
        let (generator, count) = counting_generator();
        let mock = MockService::status(200);
        let service = CorrelationIdLayer::new(HEADER)
            .with_generator(generator)
            .layer(mock.clone());

        let request = get("users");
        let metadata = request.metadata().clone();
        service.oneshot(request).await.expect("response");

        check!(count.load(Ordering::SeqCst) == 1);
        check!(metadata.correlation_id().as_deref() == Some("id-1"));
        let requests = mock.requests();
        let_assert!([sent] = requests.as_slice());
        check!(sent.header(HEADER) == Some("id-1"));
    }

    #[tokio::test]
    async fn keeps_a_supplied_id() {
        let (generator, count) = counting_generator();
        let mock = MockService::status(200);
        let service = CorrelationIdLayer::new(HEADER)
            .with_generator(generator)
            .layer(mock.clone());

        let request = Request::builder(crate::Method::Get, "users")
            .header(HEADER, "caller-id")
            .build();
        let metadata = request.metadata().clone();
        service.oneshot(request).await.expect("response");

        check!(count.load(Ordering::SeqCst) == 0);
        check!(metadata.correlation_id().as_deref() == Some("caller-id"));
        let requests = mock.requests();
        let_assert!([sent] = requests.as_slice());
        check!(sent.header(HEADER) == Some("caller-id"));
    }

    #[tokio::test]
    async fn reuses_the_recorded_id() {
        let (generator, count) = counting_generator();
        let service = CorrelationIdLayer::new(HEADER)
            .with_generator(generator)
            .layer(MockService::status(200));

        let request = get("users");
        request.metadata().set_correlation_id("first-attempt");
        let metadata = request.metadata().clone();
        service.oneshot(request).await.expect("response");

        check!(count.load(Ordering::SeqCst) == 0);
        check!(metadata.correlation_id().as_deref() == Some("first-attempt"));
    }

    #[test]
    fn uuid_ids_are_unique() {
        let generate = uuid_generator();
        let first = generate();
        check!(first.len() == 36);
        check!(first != generate());
    }
}
