//! Transport request abstraction
//!
//! The parser and the context factory only need a handful of primitives from
//! the incoming HTTP request. [`TransportRequest`] exposes exactly those, so
//! the execution layer does not depend on a particular HTTP framework.
//! An implementation for `http::Request<Bytes>` (what axum hands out after
//! buffering the body) is provided.

use crate::core::error::RequestError;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{Method, Request, header};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// URL-decoded query-string parameters
///
/// A parameter given more than once keeps its first value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: HashMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(pairs: I) -> Self {
        let mut params = HashMap::new();
        for (name, value) in pairs {
            params.entry(name.into()).or_insert_with(|| value.into());
        }
        Self { params }
    }
}

/// Minimal view of an HTTP request
pub trait TransportRequest {
    fn method(&self) -> &Method;

    /// First value of a header, if present and valid UTF-8
    fn header(&self, name: &str) -> Option<&str>;

    /// Decoded query string
    ///
    /// A query string that cannot be decoded yields no parameters.
    fn query_params(&self) -> QueryParams;

    /// Raw request body
    fn body_bytes(&self) -> &[u8];

    /// Declared `Content-Type`, parameters included
    fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Body as UTF-8 text
    fn body_text(&self) -> Result<String, RequestError> {
        std::str::from_utf8(self.body_bytes())
            .map(str::to_string)
            .map_err(|e| RequestError::InvalidBody {
                message: e.to_string(),
            })
    }

    /// Body deserialized from JSON
    fn body_json<T: DeserializeOwned>(&self) -> Result<T, RequestError>
    where
        Self: Sized,
    {
        serde_json::from_slice(self.body_bytes()).map_err(|e| RequestError::InvalidBody {
            message: e.to_string(),
        })
    }
}

impl TransportRequest for Request<Bytes> {
    fn method(&self) -> &Method {
        Request::method(self)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    fn query_params(&self) -> QueryParams {
        match Query::<Vec<(String, String)>>::try_from_uri(self.uri()) {
            Ok(Query(pairs)) => pairs.into_iter().collect(),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring undecodable query string");
                QueryParams::new()
            }
        }
    }

    fn body_bytes(&self) -> &[u8] {
        self.body()
    }
}
