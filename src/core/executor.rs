//! Execution engine collaborator
//!
//! The request handler does not parse, validate or execute GraphQL itself.
//! It drives an [`Executor`], handing it one [`ExecutionInput`] per
//! operation and turning the returned [`ExecutionResult`] into a
//! [`GraphQLResponse`].

use crate::core::context::ExecutionContext;
use crate::core::dataloader::DataLoaderRegistry;
use crate::core::types::{GraphQLError, GraphQLRequest, GraphQLResponse, JsonMap};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Everything the executor needs to run one operation
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: JsonMap,
    pub extensions: JsonMap,
    pub context: ExecutionContext,
    pub data_loader_registry: Option<Arc<DataLoaderRegistry>>,
}

impl ExecutionInput {
    /// Build the executor input for a canonical request
    ///
    /// Missing variables and extensions become empty maps.
    pub fn from_request(
        request: GraphQLRequest,
        context: ExecutionContext,
        data_loader_registry: Option<Arc<DataLoaderRegistry>>,
    ) -> Self {
        Self {
            query: request.query,
            operation_name: request.operation_name,
            variables: request.variables.unwrap_or_default(),
            extensions: request.extensions.unwrap_or_default(),
            context,
            data_loader_registry,
        }
    }
}

/// Native result produced by an executor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub errors: Vec<GraphQLError>,
    pub extensions: Option<JsonMap>,
}

impl ExecutionResult {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }

    /// Convert into the transport-agnostic response; no errors maps to `None`
    pub fn into_response(self) -> GraphQLResponse {
        GraphQLResponse {
            data: self.data,
            errors: if self.errors.is_empty() {
                None
            } else {
                Some(self.errors)
            },
            extensions: self.extensions.filter(|extensions| !extensions.is_empty()),
        }
    }
}

impl From<ExecutionResult> for GraphQLResponse {
    fn from(result: ExecutionResult) -> Self {
        result.into_response()
    }
}

/// GraphQL engine that parses, validates and executes one operation
///
/// Implementations must be safe to call concurrently: the handler starts
/// every operation of a query-only batch before awaiting any of them.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute one operation
    ///
    /// GraphQL-level errors (validation, resolver errors) belong in
    /// [`ExecutionResult::errors`]. An `Err` means the operation could not be
    /// run at all; the handler turns it into an error-only response.
    async fn execute(&self, input: ExecutionInput) -> Result<ExecutionResult>;

    /// Whether this executor dispatches data loaders through the batch
    /// coordination entry of the context
    ///
    /// When `false` the handler does not install the entry.
    fn supports_batch_coordination(&self) -> bool {
        false
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn execute(&self, input: ExecutionInput) -> Result<ExecutionResult> {
        (**self).execute(input).await
    }

    fn supports_batch_coordination(&self) -> bool {
        (**self).supports_batch_coordination()
    }
}
