//! HTTP response handling.
//!
//! [`Response`] provides access to status, headers, and an optional body, and keeps
//! a reference to the [`Request`] it answers so later stages can read the call
//! metadata.
//!
//! # Example
//!
//! ```ignore
//! let user: Option<User> = response.json()?;
//! ```

use std::collections::HashMap;

use bytes::Bytes;

use crate::{Metadata, Request};

/// HTTP response with status, headers, optional body and originating request.
///
/// A `None` body is the null body produced by the not-found translation.
#[derive(Debug, Clone)]
pub struct Response<B = Bytes> {
    status: u16,
    status_text: String,
    headers: HashMap<String, String>,
    body: Option<B>,
    request: Option<Box<Request>>,
}

impl<B> Response<B> {
    /// Creates a new response; the status text is the canonical reason phrase.
    #[must_use]
    pub fn new(status: u16, headers: HashMap<String, String>, body: B) -> Self {
        let status_text = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string();

        Self {
            status,
            status_text,
            headers,
            body: Some(body),
            request: None,
        }
    }

    /// Replaces the status text.
    #[must_use]
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    /// Attaches the originating request.
    #[must_use]
    pub fn with_request(mut self, request: Request) -> Self {
        self.set_request(request);
        self
    }

    /// Replaces the originating request in place.
    pub fn set_request(&mut self, request: Request) {
        self.request = Some(Box::new(request));
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase.
    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Response body; `None` once nulled.
    #[must_use]
    pub const fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    /// Drops the body, keeping status and headers.
    pub fn clear_body(&mut self) {
        self.body = None;
    }

    /// Originating request, when attached.
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        self.request.as_deref()
    }

    /// Metadata of the originating request.
    #[must_use]
    pub fn metadata(&self) -> Option<&Metadata> {
        self.request().map(Request::metadata)
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> Option<B> {
        self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (u16, HashMap<String, String>, Option<B>) {
        (self.status, self.headers, self.body)
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 3xx.
    #[must_use]
    pub const fn is_redirection(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }
}

impl Response<Bytes> {
    /// Deserialize the response body as JSON; a null body reads as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        match &self.body {
            Some(body) => crate::from_json(body),
            None => crate::from_json(b"null"),
        }
    }

    /// Get the response body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid UTF-8.
    pub fn text(self) -> Result<Option<String>, std::string::FromUtf8Error> {
        self.body
            .map(|body| String::from_utf8(body.to_vec()))
            .transpose()
    }
}
