pub mod coercion;
pub mod config;
pub mod context;
pub mod demo;
pub mod engine;
pub mod error;
pub mod introspection;
pub mod limits;
pub mod plan_cache;
pub mod query_executor;
pub mod query_planner;
pub mod resolver;
pub mod schema_registry;
pub mod server;
pub mod subscription;
pub mod types;
pub mod value;

pub use config::{EngineConfig, QueryLimits};
pub use context::ExecutionContext;
pub use engine::GraphEngine;
pub use error::{EngineError, FieldError, PlanError, RegistryError, ResolverError};
pub use query_executor::{ExecutionResult, QueryExecutor, ResolverExecutor};
pub use query_planner::{QueryPlanner, RequestPlan, SchemaQueryPlanner};
pub use resolver::{ResolverContext, resolver, stream_resolver, sync_resolver};
pub use schema_registry::SchemaRegistry;
pub use subscription::{Broadcaster, Filter};
pub use types::{FieldDescriptor, OperationMode, ScalarType, TypeDescriptor, TypeRef};
pub use value::{ObjectValue, Resolved};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use error::{Location, PathSegment};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Value>,
    #[serde(default)]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// One entry of the response `errors` list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
}

impl From<FieldError> for ResponseError {
    fn from(err: FieldError) -> Self {
        ResponseError {
            message: err.message,
            locations: err.locations,
            path: err.path,
        }
    }
}

impl From<&PlanError> for ResponseError {
    fn from(err: &PlanError) -> Self {
        ResponseError {
            message: err.to_string(),
            locations: err.locations(),
            path: Vec::new(),
        }
    }
}

impl From<&EngineError> for ResponseError {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Plan(plan) => plan.into(),
            other => ResponseError {
                message: other.to_string(),
                locations: Vec::new(),
                path: Vec::new(),
            },
        }
    }
}

/// The `{"data", "errors"}` envelope returned to clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GraphResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
    /// Set when the request failed before execution started.
    #[serde(skip)]
    pub request_failed: bool,
}

impl GraphResponse {
    pub fn request_error<E>(err: E) -> Self
    where
        ResponseError: From<E>,
    {
        GraphResponse {
            data: None,
            errors: vec![ResponseError::from(err)],
            request_failed: true,
        }
    }

    /// 400 for requests rejected before execution, 200 otherwise.
    pub fn status_code(&self) -> u16 {
        if self.request_failed { 400 } else { 200 }
    }
}

impl From<ExecutionResult> for GraphResponse {
    fn from(result: ExecutionResult) -> Self {
        GraphResponse {
            data: Some(result.data.unwrap_or(Value::Null)),
            errors: result.errors.into_iter().map(ResponseError::from).collect(),
            request_failed: false,
        }
    }
}
