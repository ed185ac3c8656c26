//! Transport request → canonical GraphQL request
//!
//! Decoding rules, in order:
//!
//! 1. GET carrying a persisted-query `extensions` parameter, or any request
//!    with a `query` parameter: a single request read from the query string.
//! 2. POST: the body, decoded according to its content type
//!    (`application/json` by default, or `application/graphql`).
//! 3. Anything else is not a GraphQL request (`Ok(None)`).

use crate::config::ServerConfig;
use crate::core::error::{RequestError, ServerError, ServerResult};
use crate::core::types::{GraphQLRequest, GraphQLServerRequest, JsonMap};
use crate::server::transport::{QueryParams, TransportRequest};
use axum::http::Method;

pub const REQUEST_PARAM_QUERY: &str = "query";
pub const REQUEST_PARAM_OPERATION_NAME: &str = "operationName";
pub const REQUEST_PARAM_VARIABLES: &str = "variables";
pub const REQUEST_PARAM_EXTENSIONS: &str = "extensions";
pub const REQUEST_PARAM_PERSISTED_QUERY: &str = "persistedQuery";

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_GRAPHQL: &str = "application/graphql";

/// Turns a transport request into a [`GraphQLServerRequest`]
///
/// `Ok(None)` means the request does not carry a GraphQL operation at all.
/// `Err` means it does but it is malformed; the transport decides the status.
pub trait GraphQLRequestParser<R>: Send + Sync {
    fn parse_request(&self, request: &R) -> ServerResult<Option<GraphQLServerRequest>>;
}

/// Parser for HTTP requests exposed through [`TransportRequest`]
#[derive(Debug, Clone)]
pub struct HttpRequestParser {
    batching_enabled: bool,
}

impl Default for HttpRequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequestParser {
    pub fn new() -> Self {
        Self {
            batching_enabled: true,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            batching_enabled: config.batching.enabled,
        }
    }

    /// Accept or reject JSON array bodies
    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }

    fn parse_get(&self, params: &QueryParams) -> ServerResult<GraphQLServerRequest> {
        let query = params.get(REQUEST_PARAM_QUERY).unwrap_or_default().to_string();
        let operation_name = params.get(REQUEST_PARAM_OPERATION_NAME).map(str::to_string);
        let variables = json_param(params, REQUEST_PARAM_VARIABLES)?;
        let extensions = json_param(params, REQUEST_PARAM_EXTENSIONS)?;

        Ok(GraphQLServerRequest::Single(GraphQLRequest {
            query,
            operation_name,
            variables,
            extensions,
        }))
    }

    fn parse_post<R: TransportRequest>(&self, request: &R) -> ServerResult<GraphQLServerRequest> {
        let content_type = request.content_type().unwrap_or(APPLICATION_JSON);
        let essence = media_type_essence(content_type);

        if media_type_includes(&essence, APPLICATION_JSON) {
            let parsed: GraphQLServerRequest = request.body_json()?;
            if matches!(parsed, GraphQLServerRequest::Batch(_)) && !self.batching_enabled {
                return Err(RequestError::BatchingDisabled.into());
            }
            Ok(parsed)
        } else if media_type_includes(&essence, APPLICATION_GRAPHQL) {
            Ok(GraphQLServerRequest::Single(GraphQLRequest::new(
                request.body_text()?,
            )))
        } else {
            Err(RequestError::UnsupportedContentType {
                content_type: content_type.to_string(),
            }
            .into())
        }
    }
}

impl<R: TransportRequest> GraphQLRequestParser<R> for HttpRequestParser {
    fn parse_request(&self, request: &R) -> ServerResult<Option<GraphQLServerRequest>> {
        let params = request.query_params();
        let from_query_string = is_get_persisted_query(request.method(), &params)
            || params.contains(REQUEST_PARAM_QUERY);

        let (source, parsed) = if from_query_string {
            ("query string", self.parse_get(&params)?)
        } else if request.method() == Method::POST {
            ("body", self.parse_post(request)?)
        } else {
            tracing::debug!(method = %request.method(), "Not a GraphQL request");
            return Ok(None);
        };

        match &parsed {
            GraphQLServerRequest::Single(single) => tracing::debug!(
                method = %request.method(),
                source,
                operation = single.operation_name.as_deref().unwrap_or("<anonymous>"),
                "Parsed GraphQL request"
            ),
            GraphQLServerRequest::Batch(batch) => tracing::debug!(
                method = %request.method(),
                source,
                size = batch.len(),
                "Parsed GraphQL batch request"
            ),
        }
        Ok(Some(parsed))
    }
}

fn is_get_persisted_query(method: &Method, params: &QueryParams) -> bool {
    method == Method::GET
        && params
            .get(REQUEST_PARAM_EXTENSIONS)
            .is_some_and(|extensions| extensions.contains(REQUEST_PARAM_PERSISTED_QUERY))
}

fn json_param(params: &QueryParams, name: &str) -> ServerResult<Option<JsonMap>> {
    params
        .get(name)
        .map(|raw| {
            serde_json::from_str::<JsonMap>(raw).map_err(|e| {
                ServerError::from(RequestError::InvalidJson {
                    parameter: name.to_string(),
                    message: e.to_string(),
                })
            })
        })
        .transpose()
}

/// `type/subtype` in lowercase, parameters stripped
fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether the declared media type covers `target` (wildcards allowed)
fn media_type_includes(declared: &str, target: &str) -> bool {
    if declared == target || declared == "*/*" {
        return true;
    }
    match (declared.split_once('/'), target.split_once('/')) {
        (Some((declared_type, "*")), Some((target_type, _))) => declared_type == target_type,
        _ => false,
    }
}
