//! Request handler: single and batch execution strategies
//!
//! A [`GraphQLServerRequest`] is executed with one of three strategies:
//!
//! - **single**: one operation
//! - **sequential batch**: the batch contains a mutation, so operations run
//!   one after the other in request order
//! - **concurrent batch**: every operation is started before any is awaited,
//!   sharing one batch coordination entry so their data loaders are
//!   dispatched together
//!
//! The handler never fails. Executor errors and panics are converted into
//! error-carrying responses for the operation that raised them.

use crate::core::context::ExecutionContext;
use crate::core::dataloader::{BatchCoordination, DataLoaderRegistry, DataLoaderRegistryFactory};
use crate::core::error::ExecutionError;
use crate::core::executor::{ExecutionInput, Executor};
use crate::core::types::{
    GraphQLBatchRequest, GraphQLBatchResponse, GraphQLRequest, GraphQLResponse,
    GraphQLServerRequest, GraphQLServerResponse,
};
use futures::FutureExt;
use futures::future::join_all;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Executes canonical GraphQL requests against an [`Executor`]
pub struct GraphQLRequestHandler {
    executor: Arc<dyn Executor>,
    registry_factory: Option<Arc<dyn DataLoaderRegistryFactory>>,
}

impl GraphQLRequestHandler {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            registry_factory: None,
        }
    }

    /// Generate a data-loader registry for every top-level request
    pub fn with_registry_factory(mut self, factory: Arc<dyn DataLoaderRegistryFactory>) -> Self {
        self.registry_factory = Some(factory);
        self
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Execute a single or batch request
    ///
    /// The response has the same shape as the request, and for batches one
    /// response per request in request order.
    pub async fn execute_request(
        &self,
        request: GraphQLServerRequest,
        context: ExecutionContext,
    ) -> GraphQLServerResponse {
        let registry = self
            .registry_factory
            .as_ref()
            .and_then(|factory| factory.generate(&context));

        match request {
            GraphQLServerRequest::Single(request) => {
                let coordination = self.coordination(1, registry.as_ref());
                GraphQLServerResponse::Single(
                    self.execute_one(request, &context, registry, coordination)
                        .await,
                )
            }
            GraphQLServerRequest::Batch(batch) if batch.contains_mutation() => {
                GraphQLServerResponse::Batch(self.execute_sequential(batch, &context, registry).await)
            }
            GraphQLServerRequest::Batch(batch) => {
                GraphQLServerResponse::Batch(self.execute_concurrent(batch, &context, registry).await)
            }
        }
    }

    /// Blocking variant of [`execute_request`](Self::execute_request)
    ///
    /// Drives the execution on the calling thread. Must not be called from
    /// inside an async runtime worker.
    pub fn execute_request_blocking(
        &self,
        request: GraphQLServerRequest,
        context: ExecutionContext,
    ) -> GraphQLServerResponse {
        futures::executor::block_on(self.execute_request(request, context))
    }

    async fn execute_sequential(
        &self,
        batch: GraphQLBatchRequest,
        context: &ExecutionContext,
        registry: Option<Arc<DataLoaderRegistry>>,
    ) -> GraphQLBatchResponse {
        tracing::debug!(size = batch.len(), "Executing batch sequentially (contains mutation)");

        let mut responses = Vec::with_capacity(batch.len());
        for request in batch.requests {
            let coordination = self.coordination(1, registry.as_ref());
            responses.push(
                self.execute_one(request, context, registry.clone(), coordination)
                    .await,
            );
        }
        GraphQLBatchResponse::new(responses)
    }

    async fn execute_concurrent(
        &self,
        batch: GraphQLBatchRequest,
        context: &ExecutionContext,
        registry: Option<Arc<DataLoaderRegistry>>,
    ) -> GraphQLBatchResponse {
        tracing::debug!(size = batch.len(), "Executing batch concurrently");

        let coordination = self.coordination(batch.len(), registry.as_ref());
        let executions = batch.requests.into_iter().map(|request| {
            self.execute_one(request, context, registry.clone(), coordination.clone())
        });
        GraphQLBatchResponse::new(join_all(executions).await)
    }

    /// Coordination entry for `size` operations, if the executor can use one
    fn coordination(
        &self,
        size: usize,
        registry: Option<&Arc<DataLoaderRegistry>>,
    ) -> Option<Arc<BatchCoordination>> {
        if !self.executor.supports_batch_coordination() {
            return None;
        }
        registry.map(|registry| Arc::new(BatchCoordination::new(size, registry.clone())))
    }

    async fn execute_one(
        &self,
        request: GraphQLRequest,
        context: &ExecutionContext,
        registry: Option<Arc<DataLoaderRegistry>>,
        coordination: Option<Arc<BatchCoordination>>,
    ) -> GraphQLResponse {
        let context = context.with_batch_coordination(coordination.clone());
        let operation_name = request.operation_name.clone();
        let input = ExecutionInput::from_request(request, context, registry);

        let outcome = AssertUnwindSafe(self.executor.execute(input))
            .catch_unwind()
            .await;

        if let Some(coordination) = &coordination {
            coordination.on_execution_finished().await;
        }

        match outcome {
            Ok(Ok(result)) => result.into_response(),
            Ok(Err(err)) => {
                let error = ExecutionError::aborted(&err);
                tracing::warn!(
                    operation = operation_name.as_deref().unwrap_or("<anonymous>"),
                    error = %error,
                    "GraphQL execution failed"
                );
                GraphQLResponse::error(&error)
            }
            Err(payload) => {
                let error = ExecutionError::panicked(payload);
                tracing::warn!(
                    operation = operation_name.as_deref().unwrap_or("<anonymous>"),
                    error = %error,
                    "GraphQL execution panicked"
                );
                GraphQLResponse::error(&error)
            }
        }
    }
}
