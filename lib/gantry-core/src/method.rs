//! HTTP method types.

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// HTTP request method.
///
/// Serialized as the upper-case method name (`"GET"`, `"POST"`, ...), which is
/// also how it appears in cache and in-flight keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET method - retrieve a resource.
    #[display("GET")]
    Get,
    /// POST method - create a resource.
    #[display("POST")]
    Post,
    /// PUT method - replace a resource.
    #[display("PUT")]
    Put,
    /// DELETE method - remove a resource.
    #[display("DELETE")]
    Delete,
    /// PATCH method - partially update a resource.
    #[display("PATCH")]
    Patch,
    /// HEAD method - retrieve headers only.
    #[display("HEAD")]
    Head,
    /// OPTIONS method - retrieve allowed methods.
    #[display("OPTIONS")]
    Options,
}

impl Method {
    /// All methods, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
    ];

    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Returns `true` if the method is safe (does not modify resources).
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }

    /// Returns `true` if the method is idempotent.
    ///
    /// This is the default set of methods eligible for retry on an HTTP failure.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Self::Get | Self::Head | Self::Options | Self::Put | Self::Delete
        )
    }
}

impl FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::invalid_request(format!("unsupported HTTP method: {s}")))
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display_matches_as_str() {
        for method in Method::ALL {
            assert_eq!(method.to_string(), method.as_str());
        }
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }

    #[test]
    fn method_idempotent_set() {
        let idempotent: Vec<_> = Method::ALL
            .into_iter()
            .filter(Method::is_idempotent)
            .collect();
        assert_eq!(
            idempotent,
            vec![
                Method::Get,
                Method::Put,
                Method::Delete,
                Method::Head,
                Method::Options
            ]
        );
        assert!(!Method::Post.is_idempotent());
        assert!(!Method::Patch.is_idempotent());
    }

    #[test]
    fn method_is_safe() {
        assert!(Method::Get.is_safe());
        assert!(Method::Head.is_safe());
        assert!(!Method::Delete.is_safe());
    }

    #[test]
    fn method_from_str_ignores_case() {
        assert_eq!("get".parse::<Method>().expect("get"), Method::Get);
        assert_eq!("Options".parse::<Method>().expect("options"), Method::Options);
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn method_serde_upper_case() {
        let methods: Vec<Method> = serde_json::from_str(r#"["GET","DELETE"]"#).expect("json");
        assert_eq!(methods, vec![Method::Get, Method::Delete]);
        assert_eq!(
            serde_json::to_string(&Method::Head).expect("json"),
            r#""HEAD""#
        );
    }

    #[test]
    fn method_into_http() {
        assert_eq!(http::Method::from(Method::Get), http::Method::GET);
        assert_eq!(http::Method::from(Method::Patch), http::Method::PATCH);
    }
}
