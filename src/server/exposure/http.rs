//! HTTP exposure over axum
//!
//! Mounts GET and POST at the configured endpoint and maps the server
//! outcome onto HTTP:
//!
//! - a GraphQL response → 200 with the JSON response body
//! - not a GraphQL request → 400 `NOT_A_GRAPHQL_REQUEST`
//! - a malformed GraphQL request → the error's status with an error body

use crate::core::error::ErrorResponse;
use crate::server::graphql_server::GraphQLServer;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Server type the HTTP exposure drives
pub type HttpGraphQLServer = GraphQLServer<Request<Bytes>>;

/// GraphQL over HTTP exposure
pub struct GraphQLExposure;

impl GraphQLExposure {
    /// Build the GraphQL router
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let server = GraphQLServer::builder(executor).build();
    /// let app = GraphQLExposure::build_router(server, "/graphql");
    /// axum::serve(listener, app).await?;
    /// ```
    pub fn build_router(server: HttpGraphQLServer, endpoint: &str) -> Router {
        Router::new()
            .route(endpoint, get(graphql_handler).post(graphql_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(server))
    }
}

async fn graphql_handler(
    State(server): State<Arc<HttpGraphQLServer>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = Request::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;

    match server.execute(&request).await {
        Ok(Some(response)) => Json(response).into_response(),
        Ok(None) => {
            tracing::debug!(method = %request.method(), "Rejected non-GraphQL request");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    code: "NOT_A_GRAPHQL_REQUEST".to_string(),
                    message: "Request does not carry a GraphQL operation".to_string(),
                    details: None,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Malformed GraphQL request");
            e.into_response()
        }
    }
}
