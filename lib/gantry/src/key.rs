//! Request signatures used by the caching and in-flight stages.

use std::sync::Arc;

use crate::Request;

/// Derives the key identifying a logical operation.
///
/// Must be a pure function of the request: identical requests always yield
/// the same key.
pub type KeyFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Default signature: `METHOD:baseAddress/path`.
#[must_use]
pub fn default_key(request: &Request) -> String {
    format!("{}:{}", request.method(), request.target())
}

pub(crate) fn default_key_fn() -> KeyFn {
    Arc::new(default_key)
}
