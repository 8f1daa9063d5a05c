//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types for easy glob importing:
//!
//! ```ignore
//! use gantry::prelude::*;
//! ```

pub use crate::{
    CallOptions, Client, Error, Method, Pipeline, PipelineBuilder, PipelineConfig, Request,
    Response, Result, Stage, StatusCode, StatusRange, Transport, TransportConfig,
};
#[cfg(feature = "hyper-transport")]
pub use crate::HyperTransport;
pub use serde::{Deserialize, Serialize};
