//! Server module: from transport request to GraphQL response
//!
//! This module provides:
//! - [`GraphQLRequestParser`]: decodes GET/POST requests into canonical requests
//! - [`GraphQLContextFactory`]: derives the per-request execution context
//! - [`GraphQLRequestHandler`]: single, sequential and concurrent execution
//! - [`GraphQLServer`]: the composition of the three
//! - [`GraphQLExposure`]: the axum router for a server

pub mod context_factory;
pub mod exposure;
pub mod graphql_server;
pub mod handler;
pub mod parser;
pub mod transport;

#[cfg(feature = "graphql")]
pub mod schema_executor;

pub use context_factory::{DefaultContextFactory, GraphQLContextFactory};
pub use exposure::{GraphQLExposure, HttpGraphQLServer};
pub use graphql_server::{GraphQLServer, GraphQLServerBuilder};
pub use handler::GraphQLRequestHandler;
pub use parser::{GraphQLRequestParser, HttpRequestParser};
pub use transport::{QueryParams, TransportRequest};

#[cfg(feature = "graphql")]
pub use schema_executor::{AsyncGraphQLExecutor, load_batched};
