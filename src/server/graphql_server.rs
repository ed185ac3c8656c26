//! Transport-facing GraphQL server
//!
//! Composes a parser, a context factory and a request handler into one
//! operation: transport request in, GraphQL response (or nothing) out.

use crate::config::ServerConfig;
use crate::core::context::ExecutionContext;
use crate::core::dataloader::DataLoaderRegistryFactory;
use crate::core::error::ServerResult;
use crate::core::executor::Executor;
use crate::core::types::GraphQLServerResponse;
use crate::server::context_factory::{DefaultContextFactory, GraphQLContextFactory};
use crate::server::handler::GraphQLRequestHandler;
use crate::server::parser::{GraphQLRequestParser, HttpRequestParser};
use crate::server::transport::TransportRequest;
use std::sync::Arc;

/// GraphQL server for transport requests of type `R`
pub struct GraphQLServer<R> {
    parser: Arc<dyn GraphQLRequestParser<R>>,
    context_factory: Arc<dyn GraphQLContextFactory<R>>,
    handler: Arc<GraphQLRequestHandler>,
    base_context: ExecutionContext,
}

impl<R> Clone for GraphQLServer<R> {
    fn clone(&self) -> Self {
        Self {
            parser: self.parser.clone(),
            context_factory: self.context_factory.clone(),
            handler: self.handler.clone(),
            base_context: self.base_context.clone(),
        }
    }
}

impl<R: 'static> GraphQLServer<R> {
    pub fn new(
        parser: Arc<dyn GraphQLRequestParser<R>>,
        context_factory: Arc<dyn GraphQLContextFactory<R>>,
        handler: Arc<GraphQLRequestHandler>,
    ) -> Self {
        Self {
            parser,
            context_factory,
            handler,
            base_context: ExecutionContext::new(),
        }
    }

    /// Entries every request context starts from
    ///
    /// Values derived from the transport request win on key collisions.
    pub fn with_base_context(mut self, context: ExecutionContext) -> Self {
        self.base_context = context;
        self
    }

    pub fn handler(&self) -> &Arc<GraphQLRequestHandler> {
        &self.handler
    }

    /// Execute a transport request
    ///
    /// - `Ok(None)`: the request is not a GraphQL request
    /// - `Err(_)`: the request is a malformed GraphQL request
    /// - `Ok(Some(_))`: the execution outcome, including execution failures
    pub async fn execute(&self, request: &R) -> ServerResult<Option<GraphQLServerResponse>> {
        let Some(graphql_request) = self.parser.parse_request(request)? else {
            return Ok(None);
        };

        let context = self
            .base_context
            .merge(&self.context_factory.generate_context(request));
        let response = self.handler.execute_request(graphql_request, context).await;
        Ok(Some(response))
    }
}

impl<R: TransportRequest + 'static> GraphQLServer<R> {
    /// Start building a server around an executor
    pub fn builder(executor: Arc<dyn Executor>) -> GraphQLServerBuilder<R> {
        GraphQLServerBuilder::new(executor)
    }
}

/// Builder wiring the default HTTP parser and context factory
pub struct GraphQLServerBuilder<R> {
    executor: Arc<dyn Executor>,
    config: ServerConfig,
    registry_factory: Option<Arc<dyn DataLoaderRegistryFactory>>,
    context_factory: Option<Arc<dyn GraphQLContextFactory<R>>>,
    base_context: ExecutionContext,
}

impl<R: TransportRequest + 'static> GraphQLServerBuilder<R> {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            config: ServerConfig::default(),
            registry_factory: None,
            context_factory: None,
            base_context: ExecutionContext::new(),
        }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry_factory(mut self, factory: Arc<dyn DataLoaderRegistryFactory>) -> Self {
        self.registry_factory = Some(factory);
        self
    }

    /// Replace the default header-propagating context factory
    pub fn with_context_factory(mut self, factory: Arc<dyn GraphQLContextFactory<R>>) -> Self {
        self.context_factory = Some(factory);
        self
    }

    pub fn with_base_context(mut self, context: ExecutionContext) -> Self {
        self.base_context = context;
        self
    }

    pub fn build(self) -> GraphQLServer<R> {
        let mut handler = GraphQLRequestHandler::new(self.executor);
        if let Some(factory) = self.registry_factory {
            handler = handler.with_registry_factory(factory);
        }

        let context_factory: Arc<dyn GraphQLContextFactory<R>> = match self.context_factory {
            Some(factory) => factory,
            None => Arc::new(DefaultContextFactory::from_config(&self.config)),
        };

        GraphQLServer::new(
            Arc::new(HttpRequestParser::from_config(&self.config)),
            context_factory,
            Arc::new(handler),
        )
        .with_base_context(self.base_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ServerError;
    use crate::core::executor::{ExecutionInput, ExecutionResult};
    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::http::{Method, Request};
    use serde_json::json;

    /// Returns the execution context entries it was given
    struct ContextEcho;

    #[async_trait]
    impl Executor for ContextEcho {
        async fn execute(&self, input: ExecutionInput) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::from_data(json!({
                "trace": input.context.get("apollo-federation-include-trace"),
                "tenant": input.context.get("tenant"),
            })))
        }
    }

    fn server() -> GraphQLServer<Request<Bytes>> {
        GraphQLServer::builder(Arc::new(ContextEcho))
            .with_base_context(ExecutionContext::new().with("tenant", "acme"))
            .build()
    }

    fn post(body: &'static str) -> Request<Bytes> {
        Request::builder()
            .method(Method::POST)
            .uri("/graphql")
            .header("content-type", "application/json")
            .header("apollo-federation-include-trace", "ftv1")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_merges_base_and_request_context() {
        let response = server()
            .execute(&post(r#"{"query":"{ a }"}"#))
            .await
            .unwrap()
            .unwrap();

        let data = response.as_single().unwrap().data.clone().unwrap();
        assert_eq!(data, json!({ "trace": "ftv1", "tenant": "acme" }));
    }

    #[tokio::test]
    async fn test_not_graphql_is_none() {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/graphql")
            .body(Bytes::new())
            .unwrap();

        assert!(server().execute(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parse_errors_propagate() {
        let err = server().execute(&post("{oops")).await.unwrap_err();
        assert!(matches!(err, ServerError::Request(_)));
    }

    #[tokio::test]
    async fn test_batching_disabled_by_config() {
        let server: GraphQLServer<Request<Bytes>> = GraphQLServer::builder(Arc::new(ContextEcho))
            .with_config(ServerConfig {
                batching: crate::config::BatchingConfig { enabled: false },
                ..Default::default()
            })
            .build();

        let err = server
            .execute(&post(r#"[{"query":"{ a }"}]"#))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "BATCHING_DISABLED");
    }
}
