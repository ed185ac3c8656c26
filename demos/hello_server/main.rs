//! Hello-world GraphQL server
//!
//! Demonstrates:
//! - GET and POST (single and batch) on /graphql
//! - a request-scoped data loader dispatched once for all operations of a
//!   query batch
//! - tracing header propagation into the execution context
//!
//! Try:
//!
//! ```text
//! curl 'http://127.0.0.1:3000/graphql?query=%7Bhello%7D'
//! curl -H 'content-type: application/json' \
//!      -d '[{"query":"{ user(id: 1) }"},{"query":"{ user(id: 2) }"}]' \
//!      http://127.0.0.1:3000/graphql
//! ```

use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Schema};
use std::collections::HashMap;
use this_graphql::prelude::*;

const USERS_LOADER: &str = "users";

struct Query;

#[Object]
impl Query {
    async fn hello(&self) -> &str {
        "world"
    }

    /// User name, fetched through the request-scoped loader
    async fn user(&self, ctx: &Context<'_>, id: u32) -> async_graphql::Result<Option<String>> {
        load_batched::<u32, String>(ctx, USERS_LOADER, id).await
    }

    /// Value of the federated tracing header, if the client sent one
    async fn trace(&self, ctx: &Context<'_>) -> Option<String> {
        ctx.data::<ExecutionContext>()
            .ok()
            .and_then(|context| context.get_as::<String>("apollo-federation-include-trace"))
    }
}

fn users_loader() -> DataLoader<u32, String> {
    DataLoader::new(|ids: Vec<u32>| async move {
        tracing::info!(?ids, "Fetching users");
        Ok(ids
            .into_iter()
            .filter(|id| *id <= 3)
            .map(|id| (id, format!("user-{}", id)))
            .collect::<HashMap<_, _>>())
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_yaml_file(path)?,
        None => ServerConfig::default(),
    };

    let schema = Schema::new(Query, EmptyMutation, EmptySubscription);
    let registry_factory = FnRegistryFactory::new(|_: &ExecutionContext| {
        Some(DataLoaderRegistry::new().with_loader(USERS_LOADER, users_loader()))
    });

    let endpoint = config.endpoint.clone();
    let server: HttpGraphQLServer = GraphQLServer::builder(Arc::new(AsyncGraphQLExecutor::new(schema)))
        .with_config(config)
        .with_registry_factory(Arc::new(registry_factory))
        .build();

    let app = GraphQLExposure::build_router(server, &endpoint);

    let addr = "127.0.0.1:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("GraphQL endpoint: http://{}{}", addr, endpoint);

    axum::serve(listener, app).await?;

    Ok(())
}
