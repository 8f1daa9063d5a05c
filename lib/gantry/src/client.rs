//! Client facade: one method per HTTP verb over a [`Pipeline`].

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;

use crate::{Method, Pipeline, PipelineBuilder, Request, RequestBuilder, Response, Result};

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    headers: HashMap<String, String>,
    allow_simultaneous_duplicates: bool,
}

impl CallOptions {
    /// Options with no extra header, coalescing allowed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header to the request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// When `true`, this call is never merged with a concurrent identical one.
    #[must_use]
    pub fn allow_simultaneous_duplicates(mut self, allow: bool) -> Self {
        self.allow_simultaneous_duplicates = allow;
        self
    }

    /// Extra headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

/// HTTP client issuing every call through a [`Pipeline`].
///
/// Paths are resolved against the configured base address.
///
/// # Example
///
/// ```ignore
/// use gantry::{CallOptions, Client};
///
/// let client = Client::builder()
///     .base_address("https://api.example.com")
///     .build_client()?;
///
/// let user: Option<User> = client.get("users/42", CallOptions::new()).await?.json()?;
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    pipeline: Pipeline,
}

impl Client {
    /// Create a client with the default pipeline and transport.
    ///
    /// # Errors
    ///
    /// See [`PipelineBuilder::build`].
    pub fn new() -> Result<Self> {
        Self::builder().build_client()
    }

    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Wrap an existing pipeline.
    #[must_use]
    pub const fn from_pipeline(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// The underlying pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Prepares a request for `path` with the base address and per-call options.
    pub fn request(&self, method: Method, path: &str, options: CallOptions) -> RequestBuilder {
        Request::builder(method, path)
            .base_address(self.pipeline.config().base_address.clone())
            .headers(options.headers)
            .allow_simultaneous_duplicates(options.allow_simultaneous_duplicates)
    }

    /// Runs a prepared request through the pipeline.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.pipeline.execute(request).await
    }

    /// Sends a request with an optional body.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        options: CallOptions,
    ) -> Result<Response> {
        let request = self.request(method, path, options).maybe_body(body).build();
        self.execute(request).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        value: &T,
        options: CallOptions,
    ) -> Result<Response> {
        let request = self.request(method, path, options).json(value)?.build();
        self.execute(request).await
    }

    // ========================================================================
    // Verbs
    // ========================================================================

    /// Send a GET request.
    pub async fn get(&self, path: &str, options: CallOptions) -> Result<Response> {
        self.send(Method::Get, path, None, options).await
    }

    /// Send a HEAD request.
    pub async fn head(&self, path: &str, options: CallOptions) -> Result<Response> {
        self.send(Method::Head, path, None, options).await
    }

    /// Send an OPTIONS request.
    pub async fn options(&self, path: &str, options: CallOptions) -> Result<Response> {
        self.send(Method::Options, path, None, options).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str, options: CallOptions) -> Result<Response> {
        self.send(Method::Delete, path, None, options).await
    }

    /// Send a POST request.
    pub async fn post(
        &self,
        path: &str,
        body: Option<Bytes>,
        options: CallOptions,
    ) -> Result<Response> {
        self.send(Method::Post, path, body, options).await
    }

    /// Send a PUT request.
    pub async fn put(
        &self,
        path: &str,
        body: Option<Bytes>,
        options: CallOptions,
    ) -> Result<Response> {
        self.send(Method::Put, path, body, options).await
    }

    /// Send a PATCH request.
    pub async fn patch(
        &self,
        path: &str,
        body: Option<Bytes>,
        options: CallOptions,
    ) -> Result<Response> {
        self.send(Method::Patch, path, body, options).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        options: CallOptions,
    ) -> Result<Response> {
        self.send_json(Method::Post, path, value, options).await
    }

    /// Send a PUT request with a JSON body.
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        options: CallOptions,
    ) -> Result<Response> {
        self.send_json(Method::Put, path, value, options).await
    }

    /// Send a PATCH request with a JSON body.
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        options: CallOptions,
    ) -> Result<Response> {
        self.send_json(Method::Patch, path, value, options).await
    }
}

impl From<Pipeline> for Client {
    fn from(pipeline: Pipeline) -> Self {
        Self::from_pipeline(pipeline)
    }
}
