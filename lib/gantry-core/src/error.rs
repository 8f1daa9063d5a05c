//! Error types for gantry.
//!
//! Failures fall in four groups:
//! - configuration errors, raised when a pipeline is built;
//! - HTTP-level failures ([`Error::Http`]), which carry the full [`Response`];
//! - connectivity failures ([`Error::Connection`], [`Error::Tls`], [`Error::Timeout`]),
//!   where no response was obtained;
//! - everything else (invalid request, URL, JSON), which no stage retries or translates.
//!
//! Errors are [`Clone`]: a coalesced call hands the same outcome to every waiter.

use derive_more::{Display, Error, From};

use crate::Response;

/// Main error type for gantry operations.
#[derive(Debug, Clone, Display, Error, From)]
pub enum Error {
    /// Invalid or contradictory pipeline configuration.
    #[display("configuration error: {_0}")]
    #[from(skip)]
    Config(#[error(not(source))] String),

    /// HTTP-level failure: a response was received with a non-2xx status.
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message (reason phrase).
        message: String,
        /// The failed response.
        #[error(not(source))]
        response: Box<Response>,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Transport I/O deadline elapsed.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from(skip)]
    JsonSerialization(#[error(not(source))] String),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an HTTP error from a failed response.
    #[must_use]
    pub fn from_response(response: Response) -> Self {
        Self::Http {
            status: response.status(),
            message: response.status_text().to_string(),
            response: Box::new(response),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for an HTTP-level failure.
    #[must_use]
    pub const fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    /// Returns `true` if no response was obtained from the network.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Tls(_) | Self::Timeout)
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The failed response, for HTTP errors.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Http { response, .. } => Some(response.as_ref()),
            _ => None,
        }
    }

    /// Mutable access to the failed response.
    #[must_use]
    pub fn response_mut(&mut self) -> Option<&mut Response> {
        match self {
            Self::Http { response, .. } => Some(response.as_mut()),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns `true` if this is a 404 Not Found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Try to decode the failed response body as JSON.
    ///
    /// Returns `None` if this is not an HTTP error or the response has no body.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.response()
            .and_then(Response::body)
            .map(|body| crate::from_json(body))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert2::{check, let_assert};
    use bytes::Bytes;

    use super::*;

    fn http_error(status: u16, body: &'static str) -> Error {
        Error::from_response(Response::new(
            status,
            HashMap::new(),
            Bytes::from_static(body.as_bytes()),
        ))
    }

    #[test]
    fn error_display() {
        check!(http_error(404, "").to_string() == "HTTP error 404: Not Found");
        check!(Error::Timeout.to_string() == "request timeout");
        check!(
            Error::connection("failed to connect").to_string()
                == "connection error: failed to connect"
        );
        check!(
            Error::config("both set").to_string() == "configuration error: both set"
        );
    }

    #[test]
    fn error_status() {
        let err = http_error(404, "");
        check!(err.status() == Some(404));
        check!(err.is_client_error());
        check!(err.is_not_found());
        check!(!err.is_server_error());

        let err = http_error(503, "");
        check!(err.is_server_error());
        check!(err.is_http());

        check!(Error::Timeout.status() == None);
    }

    #[test]
    fn error_connectivity() {
        check!(Error::connection("refused").is_connectivity());
        check!(Error::tls("bad cert").is_connectivity());
        check!(Error::Timeout.is_connectivity());
        check!(!http_error(500, "").is_connectivity());
        check!(!Error::invalid_request("nope").is_connectivity());
    }

    #[test]
    fn http_error_carries_response() {
        let err = http_error(500, "boom");
        let_assert!(Some(response) = err.response());
        check!(response.status() == 500);
        check!(response.body() == Some(&Bytes::from_static(b"boom")));
        check!(Error::Timeout.response().is_none());
    }

    #[test]
    fn error_decode_body() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct ApiError {
            error: String,
        }

        let err = http_error(404, r#"{"error": "not found"}"#);
        let_assert!(Some(Ok(decoded)) = err.decode_body::<ApiError>());
        check!(
            decoded
                == ApiError {
                    error: "not found".to_string()
                }
        );

        check!(Error::Timeout.decode_body::<ApiError>().is_none());
    }

    #[test]
    fn url_error_converts() {
        let_assert!(Err(parse) = url::Url::parse("not a url"));
        let err = Error::from(parse);
        check!(err.to_string().starts_with("invalid URL"));
    }
}
