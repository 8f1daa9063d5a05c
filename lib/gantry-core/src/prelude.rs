//! Prelude module for convenient imports.
//!
//! ```ignore
//! use gantry_core::prelude::*;
//! ```

pub use crate::{
    Error, Metadata, Method, Request, RequestBuilder, Response, Result, Transport, from_json,
    to_json,
};
