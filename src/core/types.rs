//! Canonical GraphQL request and response model
//!
//! Every transport encoding (GET query string, JSON body, raw GraphQL body)
//! is normalized into these types before execution, and every execution
//! result is reported through them.

use crate::core::error::ExecutionError;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Ordered string-keyed JSON mapping used for variables and extensions
pub type JsonMap = IndexMap<String, Value>;

/// A single GraphQL operation as submitted by a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// Query document text (may be empty, e.g. for persisted queries)
    #[serde(default)]
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<JsonMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<JsonMap>,
}

impl GraphQLRequest {
    /// Create a request with only a query document
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    pub fn with_variables(mut self, variables: JsonMap) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_extensions(mut self, extensions: JsonMap) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Check whether the request is a mutation without parsing the document
    ///
    /// This is a plain substring test on `"mutation "`. A query that mentions
    /// that text inside a string literal or comment is reported as a mutation.
    pub fn is_mutation(&self) -> bool {
        self.query.contains("mutation ")
    }
}

/// An ordered batch of operations submitted and answered together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphQLBatchRequest {
    pub requests: Vec<GraphQLRequest>,
}

impl GraphQLBatchRequest {
    pub fn new(requests: Vec<GraphQLRequest>) -> Self {
        Self { requests }
    }

    /// Check whether any request of the batch is a mutation, without parsing
    pub fn contains_mutation(&self) -> bool {
        self.requests.iter().any(GraphQLRequest::is_mutation)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Output of the request parser: one operation or a batch of them
///
/// On the wire a JSON object is a single request and a JSON array is a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GraphQLServerRequest {
    Single(GraphQLRequest),
    Batch(GraphQLBatchRequest),
}

impl<'de> Deserialize<'de> for GraphQLServerRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Object(_) => serde_json::from_value(value)
                .map(GraphQLServerRequest::Single)
                .map_err(D::Error::custom),
            Value::Array(_) => serde_json::from_value(value)
                .map(GraphQLServerRequest::Batch)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "expected a GraphQL request object or an array of them, found {}",
                json_kind(&other)
            ))),
        }
    }
}

impl From<GraphQLRequest> for GraphQLServerRequest {
    fn from(request: GraphQLRequest) -> Self {
        GraphQLServerRequest::Single(request)
    }
}

impl From<GraphQLBatchRequest> for GraphQLServerRequest {
    fn from(batch: GraphQLBatchRequest) -> Self {
        GraphQLServerRequest::Batch(batch)
    }
}

/// Location of an error in the query document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

/// One segment of a response path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Field(String),
}

/// Error descriptor in the GraphQL response format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<SourceLocation>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<JsonMap>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions
            .get_or_insert_with(JsonMap::new)
            .insert(key.into(), value.into());
        self
    }
}

impl From<&ExecutionError> for GraphQLError {
    fn from(err: &ExecutionError) -> Self {
        GraphQLError::new(err.to_string()).with_extension("classification", err.classification())
    }
}

/// Result of one executed operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<JsonMap>,
}

impl GraphQLResponse {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// Error-only response: no data and exactly one error entry
    pub fn error(err: &ExecutionError) -> Self {
        Self {
            data: None,
            errors: Some(vec![GraphQLError::from(err)]),
            extensions: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }
}

/// Responses of a batch, index-aligned with its requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphQLBatchResponse {
    pub responses: Vec<GraphQLResponse>,
}

impl GraphQLBatchResponse {
    pub fn new(responses: Vec<GraphQLResponse>) -> Self {
        Self { responses }
    }
}

/// Output of the request handler, mirroring [`GraphQLServerRequest`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GraphQLServerResponse {
    Single(GraphQLResponse),
    Batch(GraphQLBatchResponse),
}

impl<'de> Deserialize<'de> for GraphQLServerResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Object(_) => serde_json::from_value(value)
                .map(GraphQLServerResponse::Single)
                .map_err(D::Error::custom),
            Value::Array(_) => serde_json::from_value(value)
                .map(GraphQLServerResponse::Batch)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "expected a GraphQL response object or an array of them, found {}",
                json_kind(&other)
            ))),
        }
    }
}

impl GraphQLServerResponse {
    /// The single response, if this is not a batch
    pub fn as_single(&self) -> Option<&GraphQLResponse> {
        match self {
            GraphQLServerResponse::Single(response) => Some(response),
            GraphQLServerResponse::Batch(_) => None,
        }
    }

    /// The batch response, if this is a batch
    pub fn as_batch(&self) -> Option<&GraphQLBatchResponse> {
        match self {
            GraphQLServerResponse::Single(_) => None,
            GraphQLServerResponse::Batch(batch) => Some(batch),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_body_is_single_request() {
        let parsed: GraphQLServerRequest = serde_json::from_value(json!({
            "query": "query Q($id: ID!) { user(id: $id) { name } }",
            "operationName": "Q",
            "variables": { "id": "1" }
        }))
        .unwrap();

        let GraphQLServerRequest::Single(request) = parsed else {
            panic!("expected a single request");
        };
        assert_eq!(request.operation_name.as_deref(), Some("Q"));
        assert_eq!(request.variables.unwrap()["id"], json!("1"));
        assert!(request.extensions.is_none());
    }

    #[test]
    fn test_array_body_is_batch_in_order() {
        let parsed: GraphQLServerRequest =
            serde_json::from_str(r#"[{"query":"{a}"},{"query":"{b}"},{"query":"{c}"}]"#).unwrap();

        let GraphQLServerRequest::Batch(batch) = parsed else {
            panic!("expected a batch");
        };
        let queries: Vec<&str> = batch.requests.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["{a}", "{b}", "{c}"]);
    }

    #[test]
    fn test_array_of_strings_is_rejected() {
        let parsed = serde_json::from_str::<GraphQLServerRequest>(r#"["{a}"]"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_scalar_body_is_rejected() {
        let err = serde_json::from_str::<GraphQLServerRequest>("42").unwrap_err();
        assert!(err.to_string().contains("found a number"));
    }

    #[test]
    fn test_missing_query_defaults_to_empty() {
        let request: GraphQLRequest =
            serde_json::from_value(json!({ "extensions": { "persistedQuery": {} } })).unwrap();
        assert_eq!(request.query, "");
        assert!(request.extensions.is_some());
    }

    #[test]
    fn test_variables_keep_insertion_order() {
        let request: GraphQLRequest =
            serde_json::from_str(r#"{"query":"{a}","variables":{"z":1,"a":2,"m":3}}"#).unwrap();
        let keys: Vec<&String> = request.variables.as_ref().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_mutation_detection_is_textual() {
        assert!(GraphQLRequest::new("mutation { b }").is_mutation());
        assert!(GraphQLRequest::new("mutation AddUser { add }").is_mutation());
        assert!(!GraphQLRequest::new("{ a }").is_mutation());
        // No trailing space after the keyword
        assert!(!GraphQLRequest::new("mutation{ b }").is_mutation());
        // Inside a string literal still counts
        assert!(GraphQLRequest::new(r#"{ search(text: "mutation here") }"#).is_mutation());

        let batch = GraphQLBatchRequest::new(vec![
            GraphQLRequest::new("{a}"),
            GraphQLRequest::new("mutation { b }"),
        ]);
        assert!(batch.contains_mutation());
    }

    #[test]
    fn test_response_serializes_null_errors() {
        let response = GraphQLResponse::data(json!({ "hello": "world" }));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "data": { "hello": "world" }, "errors": null })
        );
    }

    #[test]
    fn test_error_response_has_single_entry_and_no_data() {
        let err = ExecutionError::Aborted {
            message: "boom".to_string(),
        };
        let response = GraphQLResponse::error(&err);

        assert!(response.data.is_none());
        let errors = response.errors.as_ref().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
        assert_eq!(
            errors[0].extensions.as_ref().unwrap()["classification"],
            json!("ExecutionAborted")
        );
    }

    #[test]
    fn test_batch_response_is_json_array() {
        let batch = GraphQLServerResponse::Batch(GraphQLBatchResponse::new(vec![
            GraphQLResponse::data(json!({ "a": 1 })),
            GraphQLResponse::data(json!({ "b": 2 })),
        ]));
        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(
            value,
            json!([
                { "data": { "a": 1 }, "errors": null },
                { "data": { "b": 2 }, "errors": null }
            ])
        );

        let back: GraphQLServerResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn test_error_path_mixes_fields_and_indices() {
        let error: GraphQLError = serde_json::from_value(json!({
            "message": "bad",
            "path": ["users", 0, "name"],
            "locations": [{ "line": 1, "column": 3 }]
        }))
        .unwrap();
        assert_eq!(
            error.path.unwrap(),
            vec![
                PathSegment::Field("users".to_string()),
                PathSegment::Index(0),
                PathSegment::Field("name".to_string()),
            ]
        );
        assert_eq!(error.locations.unwrap()[0], SourceLocation { line: 1, column: 3 });
    }
}
