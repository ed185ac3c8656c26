//! Per-request execution context derivation

use crate::config::{DEFAULT_TRACING_HEADER, ServerConfig};
use crate::core::context::ExecutionContext;
use crate::server::transport::TransportRequest;

/// Derives an [`ExecutionContext`] from a transport request
pub trait GraphQLContextFactory<R>: Send + Sync {
    fn generate_context(&self, request: &R) -> ExecutionContext;
}

/// Context factory that propagates the federated tracing header
///
/// The context starts empty. When the tracing header is present its literal
/// value is stored under the header name; nothing else is copied.
#[derive(Debug, Clone)]
pub struct DefaultContextFactory {
    tracing_header: String,
}

impl Default for DefaultContextFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultContextFactory {
    pub fn new() -> Self {
        Self {
            tracing_header: DEFAULT_TRACING_HEADER.to_string(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            tracing_header: config.tracing_header.to_ascii_lowercase(),
        }
    }

    pub fn tracing_header(&self) -> &str {
        &self.tracing_header
    }
}

impl<R: TransportRequest> GraphQLContextFactory<R> for DefaultContextFactory {
    fn generate_context(&self, request: &R) -> ExecutionContext {
        let mut context = ExecutionContext::new();
        if let Some(value) = request.header(&self.tracing_header) {
            context.insert(self.tracing_header.clone(), value);
        }
        context
    }
}

/// Any closure over the transport request is a context factory
impl<R, F> GraphQLContextFactory<R> for F
where
    F: Fn(&R) -> ExecutionContext + Send + Sync,
{
    fn generate_context(&self, request: &R) -> ExecutionContext {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::Request;
    use serde_json::json;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request<Bytes> {
        let mut builder = Request::builder().uri("/graphql");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn test_tracing_header_is_propagated() {
        let request = request_with_headers(&[("apollo-federation-include-trace", "ftv1")]);
        let context = DefaultContextFactory::new().generate_context(&request);

        assert_eq!(context.len(), 1);
        assert_eq!(
            context.get("apollo-federation-include-trace"),
            Some(&json!("ftv1"))
        );
    }

    #[test]
    fn test_missing_header_gives_empty_context() {
        let request = request_with_headers(&[("authorization", "Bearer x")]);
        let context = DefaultContextFactory::new().generate_context(&request);

        assert!(context.is_empty());
    }

    #[test]
    fn test_configured_header_name() {
        let config = ServerConfig {
            tracing_header: "X-Trace-Id".to_string(),
            ..Default::default()
        };
        let factory = DefaultContextFactory::from_config(&config);
        let request = request_with_headers(&[("x-trace-id", "abc")]);

        let context = factory.generate_context(&request);
        assert_eq!(context.get("x-trace-id"), Some(&json!("abc")));
        assert!(!context.contains_key("apollo-federation-include-trace"));
    }

    #[test]
    fn test_closure_factory() {
        let factory = |request: &Request<Bytes>| {
            ExecutionContext::new().with("path", request.uri().path())
        };
        let context = factory.generate_context(&request_with_headers(&[]));
        assert_eq!(context.get("path"), Some(&json!("/graphql")));
    }
}
