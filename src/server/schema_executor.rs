//! [`Executor`] backed by an `async_graphql::Schema`
//!
//! The execution context, the data-loader registry and the batch coordination
//! entry of every operation are handed to resolvers as schema request data.
//! Resolvers load through [`load_batched`], which queues the key and reports
//! the operation as exhausted, so all operations of a query batch share one
//! dispatch:
//!
//! ```rust,ignore
//! #[Object]
//! impl Query {
//!     async fn user(&self, ctx: &Context<'_>, id: u32) -> Result<Option<User>> {
//!         load_batched::<u32, User>(ctx, "users", id).await
//!     }
//! }
//! ```

use crate::core::dataloader::{BatchCoordination, DataLoaderRegistry};
use crate::core::executor::{ExecutionInput, ExecutionResult, Executor};
use crate::core::types::{GraphQLError, JsonMap};
use anyhow::{Context as _, Result};
use async_graphql::{ObjectType, Schema, SubscriptionType, Variables};
use async_trait::async_trait;
use serde_json::Value;
use std::hash::Hash;
use std::sync::Arc;

/// Runs operations against an `async_graphql` schema
pub struct AsyncGraphQLExecutor<Query, Mutation, Subscription> {
    schema: Schema<Query, Mutation, Subscription>,
}

impl<Query, Mutation, Subscription> AsyncGraphQLExecutor<Query, Mutation, Subscription>
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    pub fn new(schema: Schema<Query, Mutation, Subscription>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema<Query, Mutation, Subscription> {
        &self.schema
    }

    fn build_request(input: ExecutionInput) -> async_graphql::Request {
        let coordination = input.context.batch_coordination().cloned();
        let mut request = async_graphql::Request::new(input.query)
            .variables(Variables::from_json(Value::Object(
                input.variables.into_iter().collect(),
            )))
            .data(input.context);

        if let Some(operation_name) = input.operation_name {
            request = request.operation_name(operation_name);
        }
        if let Some(registry) = input.data_loader_registry {
            request = request.data(registry);
        }
        if let Some(coordination) = coordination {
            request = request.data(coordination);
        }
        for (name, value) in input.extensions {
            match async_graphql::Value::from_json(value) {
                Ok(value) => {
                    request.extensions.insert(name, value);
                }
                Err(e) => tracing::debug!(extension = %name, error = %e, "Dropped request extension"),
            }
        }
        request
    }
}

#[async_trait]
impl<Query, Mutation, Subscription> Executor for AsyncGraphQLExecutor<Query, Mutation, Subscription>
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    async fn execute(&self, input: ExecutionInput) -> Result<ExecutionResult> {
        let response = self.schema.execute(Self::build_request(input)).await;
        convert_response(&response)
    }

    fn supports_batch_coordination(&self) -> bool {
        true
    }
}

/// Load `key` from the named loader of the operation's registry
///
/// With a batch coordination entry the operation is reported as exhausted and
/// the registry is dispatched once every operation of the batch is waiting;
/// without one the registry is dispatched right away.
pub async fn load_batched<K, V>(
    ctx: &async_graphql::Context<'_>,
    loader: &str,
    key: K,
) -> async_graphql::Result<Option<V>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let registry = ctx.data::<Arc<DataLoaderRegistry>>()?;
    let pending = registry
        .loader::<K, V>(loader)
        .ok_or_else(|| format!("no data loader named '{}'", loader))?
        .load(key);

    match ctx.data_opt::<Arc<BatchCoordination>>() {
        Some(coordination) => {
            coordination.on_execution_exhausted().await;
        }
        None => {
            registry.dispatch_all().await;
        }
    }
    Ok(pending.await?)
}

/// Convert through the serialized form of the response
fn convert_response(response: &async_graphql::Response) -> Result<ExecutionResult> {
    let mut value = serde_json::to_value(response).context("serializing GraphQL response")?;

    let data = match value.get_mut("data").map(Value::take) {
        None | Some(Value::Null) => None,
        Some(data) => Some(data),
    };
    let errors: Vec<GraphQLError> = match value.get_mut("errors").map(Value::take) {
        None | Some(Value::Null) => Vec::new(),
        Some(errors) => serde_json::from_value(errors).context("decoding GraphQL errors")?,
    };
    let extensions: Option<JsonMap> = match value.get_mut("extensions").map(Value::take) {
        None | Some(Value::Null) => None,
        Some(extensions) => {
            Some(serde_json::from_value(extensions).context("decoding GraphQL extensions")?)
        }
    };

    Ok(ExecutionResult {
        data,
        errors,
        extensions,
    })
}
