//! The transport capability.
//!
//! The pipeline never talks to the network itself: every stage eventually hands
//! the request to a [`Transport`]. Implement it to plug in a real HTTP stack, a
//! recorded fixture or a test double.

use std::future::Future;
use std::sync::Arc;

use crate::{Request, Response, Result};

/// Sends one request and returns its response.
///
/// A transport reports what the server said: it returns `Ok` for every status
/// it receives, including 4xx and 5xx. Status validation is the pipeline's job.
/// `Err` is reserved for failures where no response was obtained
/// ([`crate::Error::Connection`], [`crate::Error::Tls`], [`crate::Error::Timeout`]).
///
/// # Example
///
/// ```ignore
/// use gantry_core::{Request, Response, Result, Transport};
///
/// struct Canned;
///
/// impl Transport for Canned {
///     async fn send(&self, _request: Request) -> Result<Response> {
///         Ok(Response::new(200, Default::default(), "ok".into()))
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns an error when no response could be obtained.
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send {
        (**self).send(request)
    }
}
