//! JSON bodies.
//!
//! Bodies travel through the pipeline as opaque bytes; these helpers convert at
//! the edges.

use bytes::Bytes;

use crate::{Error, Result};

/// `Content-Type` value set on JSON request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns [`Error::JsonSerialization`] if serialization fails.
///
/// # Example
///
/// ```
/// use gantry_core::to_json;
///
/// let bytes = to_json(&["a", "b"]).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"["a","b"]"#);
/// ```
pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::JsonSerialization(e.to_string()))
}

/// Deserialize JSON bytes, reporting the path of the failing field.
///
/// # Errors
///
/// Returns [`Error::JsonDeserialization`] with the path (e.g. `user.address.city`)
/// when the bytes do not match `T`.
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|e| Error::json_deserialization(e.path().to_string(), e.inner().to_string()))
}
