//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers and bodies.
//! A request keeps its base address and path apart: both take part in the
//! cache and in-flight keys.
//!
//! # Example
//!
//! ```
//! use gantry_core::{Request, Method};
//! use bytes::Bytes;
//!
//! let request = Request::<Bytes>::builder(Method::Get, "users/42")
//!     .base_address("https://api.example.com")
//!     .header("Accept", "application/json")
//!     .build();
//!
//! assert_eq!(request.target(), "https://api.example.com/users/42");
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use url::Url;

use crate::{Metadata, Method, Result};

/// An HTTP request with method, target, headers, optional body and call metadata.
///
/// Cloning a request shares its [`Metadata`]: clones belong to the same logical call.
#[derive(Debug, Clone)]
pub struct Request<B = Bytes> {
    method: Method,
    base_address: String,
    path: String,
    headers: HashMap<String, String>,
    body: Option<B>,
    metadata: Metadata,
    allow_simultaneous_duplicates: bool,
}

impl<B> Request<B> {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder<B> {
        RequestBuilder::new(method, path)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Root address prefix, possibly empty.
    #[must_use]
    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    /// Path relative to the base address.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Base address and path joined with exactly one `/`.
    #[must_use]
    pub fn target(&self) -> String {
        if self.base_address.is_empty() {
            return self.path.clone();
        }
        if self.path.is_empty() {
            return self.base_address.clone();
        }
        format!(
            "{}/{}",
            self.base_address.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    /// Parsed target URL.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidUrl`] if the target is not an absolute URL.
    pub fn url(&self) -> Result<Url> {
        Url::parse(&self.target()).map_err(Into::into)
    }

    /// Request headers, keyed as supplied.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.headers
    }

    /// Single header value by name (case-sensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    /// Metadata of the logical call.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether the in-flight stage must skip coalescing for this call.
    #[must_use]
    pub const fn allow_simultaneous_duplicates(&self) -> bool {
        self.allow_simultaneous_duplicates
    }

    /// Consume into (method, target, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, String, HashMap<String, String>, Option<B>) {
        let target = self.target();
        (self.method, target, self.headers, self.body)
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder<B = Bytes> {
    method: Method,
    base_address: String,
    path: String,
    headers: HashMap<String, String>,
    body: Option<B>,
    metadata: Option<Metadata>,
    allow_simultaneous_duplicates: bool,
}

impl<B> RequestBuilder<B> {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            base_address: String::new(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            metadata: None,
            allow_simultaneous_duplicates: false,
        }
    }

    /// Sets the base address.
    #[must_use]
    pub fn base_address(mut self, base_address: impl Into<String>) -> Self {
        self.base_address = base_address.into();
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets multiple headers.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: B) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets an optional request body.
    #[must_use]
    pub fn maybe_body(mut self, body: Option<B>) -> Self {
        self.body = body;
        self
    }

    /// Attaches an existing metadata record instead of a fresh one.
    #[must_use]
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Bypass in-flight coalescing for this call.
    #[must_use]
    pub fn allow_simultaneous_duplicates(mut self, allow: bool) -> Self {
        self.allow_simultaneous_duplicates = allow;
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request<B> {
        Request {
            method: self.method,
            base_address: self.base_address,
            path: self.path,
            headers: self.headers,
            body: self.body,
            metadata: self.metadata.unwrap_or_default(),
            allow_simultaneous_duplicates: self.allow_simultaneous_duplicates,
        }
    }
}

impl RequestBuilder<Bytes> {
    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = crate::to_json(value)?;
        Ok(self
            .header("Content-Type", crate::JSON_CONTENT_TYPE)
            .body(body))
    }
}
