//! GET 404 to null-body translation.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::{Layer, Service};
use tracing::info;

use crate::{Error, Method, Request, Response, Result};

/// Layer that resolves a GET answered with 404 as a success without body.
///
/// Status and headers of the 404 response are kept. Every other failure,
/// including a 404 on any other method, is returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundToNullLayer;

impl NotFoundToNullLayer {
    /// Create the layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NotFoundToNullLayer {
    type Service = NotFoundToNull<S>;

    fn layer(&self, inner: S) -> Self::Service {
        NotFoundToNull { inner }
    }
}

/// Service that resolves a GET 404 as a null-body success.
#[derive(Debug, Clone)]
pub struct NotFoundToNull<S> {
    inner: S,
}

impl<S> Service<Request> for NotFoundToNull<S>
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

        let mut inner = self.inner.clone();
        Box::pin(async move {
            match inner.call(request).await {
                Err(Error::Http {
                    status: 404,
                    mut response,
                    ..
                }) if method == Method::Get => {
                    info!(%target, "GET returned 404, resolving with a null body");
                    response.clear_body();
                    Ok(*response)
                }
                other => other,
            }
        })
    }
}
