//! Core types and traits for the gantry HTTP middleware pipeline.
//!
//! This crate provides the data carried through the pipeline and the seam to the
//! network:
//! - [`Method`] - HTTP method enum
//! - [`Request`] and [`RequestBuilder`] - the request descriptor
//! - [`Metadata`] - per-call record shared by every stage (timing, retries, cache flags)
//! - [`Response`] - the response, with a back-reference to its request
//! - [`Error`] and [`Result`] - error handling
//! - [`Transport`] - the capability that actually sends a request

mod error;
mod json;
mod metadata;
mod method;
pub mod prelude;
mod request;
mod response;
mod transport;

pub use error::{Error, Result};
pub use json::{JSON_CONTENT_TYPE, from_json, to_json};
pub use metadata::{Metadata, MetadataState};
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use transport::Transport;

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
