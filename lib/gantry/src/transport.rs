//! Innermost pipeline service: hands requests to a [`Transport`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower_service::Service;

use crate::{Error, Request, Response, Result, Transport};

/// Adapts a [`Transport`] into the service at the bottom of the pipeline.
///
/// Attaches the originating request to every response and turns any non-2xx
/// response into [`Error::Http`].
pub struct TransportService<T> {
    transport: Arc<T>,
}

impl<T> TransportService<T> {
    /// Wrap `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Wrap an already shared transport.
    pub const fn from_arc(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

impl<T> Clone for TransportService<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T> fmt::Debug for TransportService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportService")
            .field("transport", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Service<Request> for TransportService<T>
where
    T: Transport + 'static,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = Arc::clone(&self.transport);
        Box::pin(async move {
            let origin = request.clone();
            let response = transport.send(request).await?.with_request(origin);

            if response.is_success() {
                Ok(response)
            } else {
                Err(Error::from_response(response))
            }
        })
    }
}
