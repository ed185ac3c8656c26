//! # this-graphql
//!
//! GraphQL request execution layer: decodes HTTP requests into GraphQL
//! operations, executes single and batch requests against a pluggable
//! engine, and wires request-scoped data loaders into every operation.
//!
//! ## Features
//!
//! - **Wire formats**: GET query strings (including persisted queries),
//!   POST `application/json` objects and arrays, POST `application/graphql`
//! - **Batching**: query-only batches run concurrently with synchronized
//!   data-loader dispatch; batches containing a mutation run in order
//! - **Failure isolation**: an operation that fails or panics yields an
//!   error response without affecting the rest of its batch
//! - **Pluggable engine**: any [`Executor`](core::Executor); an
//!   `async-graphql` adapter ships behind the `graphql` feature
//! - **axum exposure**: one router for GET and POST on a configured endpoint
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use this_graphql::prelude::*;
//!
//! let schema = Schema::new(Query, EmptyMutation, EmptySubscription);
//! let server = GraphQLServer::builder(Arc::new(AsyncGraphQLExecutor::new(schema)))
//!     .with_config(ServerConfig::from_yaml_file("config/server.yaml")?)
//!     .build();
//!
//! let app = GraphQLExposure::build_router(server, "/graphql");
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod core;
pub mod server;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Request / response model ===
    pub use crate::core::{
        GraphQLBatchRequest, GraphQLBatchResponse, GraphQLError, GraphQLRequest, GraphQLResponse,
        GraphQLServerRequest, GraphQLServerResponse, JsonMap,
    };

    // === Execution ===
    pub use crate::core::{ExecutionContext, ExecutionInput, ExecutionResult, Executor};

    // === Data loading ===
    pub use crate::core::{
        BatchCoordination, DataLoader, DataLoaderRegistry, DataLoaderRegistryFactory,
        FnRegistryFactory, LoaderError,
    };

    // === Errors ===
    pub use crate::core::{ExecutionError, RequestError, ServerError, ServerResult};

    // === Config ===
    pub use crate::config::{BatchingConfig, ServerConfig};

    // === Server ===
    pub use crate::server::{
        DefaultContextFactory, GraphQLContextFactory, GraphQLExposure, GraphQLRequestHandler,
        GraphQLRequestParser, GraphQLServer, GraphQLServerBuilder, HttpGraphQLServer,
        HttpRequestParser, TransportRequest,
    };

    #[cfg(feature = "graphql")]
    pub use crate::server::{AsyncGraphQLExecutor, load_batched};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
}
