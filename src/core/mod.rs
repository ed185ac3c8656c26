//! Core module containing the request model, context and collaborator traits

pub mod context;
pub mod dataloader;
pub mod error;
pub mod executor;
pub mod types;

pub use context::ExecutionContext;
pub use dataloader::{
    BatchCoordination, DataLoader, DataLoaderRegistry, DataLoaderRegistryFactory,
    FnRegistryFactory, LoaderError,
};
pub use error::{ConfigError, ExecutionError, RequestError, ServerError, ServerResult};
pub use executor::{ExecutionInput, ExecutionResult, Executor};
pub use types::{
    GraphQLBatchRequest, GraphQLBatchResponse, GraphQLError, GraphQLRequest, GraphQLResponse,
    GraphQLServerRequest, GraphQLServerResponse, JsonMap, PathSegment, SourceLocation,
};
