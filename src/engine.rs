use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{EngineError, PlanError, RegistryError};
use crate::plan_cache::PlanCache;
use crate::query_executor::{QueryExecutor, ResolverExecutor};
use crate::query_planner::{RequestPlan, SchemaQueryPlanner};
use crate::schema_registry::SchemaRegistry;
use crate::types::OperationMode;
use crate::{GraphQLRequest, GraphResponse};

/// Entry point tying the registry, the plan cache and the executor together.
pub struct GraphEngine {
    schema: Arc<SchemaRegistry>,
    plans: PlanCache,
    query_executor: Arc<dyn QueryExecutor + Send + Sync>,
    config: EngineConfig,
}

impl GraphEngine {
    /// Freezes `registry` (installing introspection when configured) and
    /// builds the default planner, cache and executor on top of it.
    pub fn new(mut registry: SchemaRegistry, config: EngineConfig) -> Result<Self, RegistryError> {
        if !registry.is_frozen() {
            if config.introspection {
                registry.enable_introspection()?;
            } else {
                registry.finalize()?;
            }
        }
        let schema = Arc::new(registry);
        let planner = SchemaQueryPlanner::new(schema.clone(), config.limits);
        let plans = PlanCache::from_config(&config.cache, Box::new(planner));
        let executor = ResolverExecutor::new(schema.clone(), config.limits);
        Ok(GraphEngine::with_components(
            schema,
            plans,
            Arc::new(executor),
            config,
        ))
    }

    pub fn with_components(
        schema: Arc<SchemaRegistry>,
        plans: PlanCache,
        query_executor: Arc<dyn QueryExecutor + Send + Sync>,
        config: EngineConfig,
    ) -> Self {
        GraphEngine {
            schema,
            plans,
            query_executor,
            config,
        }
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema_definition(&self) -> String {
        self.schema.schema_definition()
    }

    /// Fetches the plan for a request from the cache, building it on a miss.
    pub async fn plan_request(
        &self,
        request: &GraphQLRequest,
    ) -> Result<Arc<RequestPlan>, PlanError> {
        let plan = self
            .plans
            .get_or_build(&request.query, request.operation_name.as_deref())
            .await?;
        if plan.schema_version != self.schema.version() {
            return Err(PlanError::StaleSchema {
                plan: plan.schema_version,
                current: self.schema.version(),
            });
        }
        Ok(plan)
    }

    /// Runs a query or mutation. Request-fatal failures come back as a
    /// response without data, see [`GraphResponse::status_code`].
    pub async fn execute_request(
        &self,
        ctx: &ExecutionContext,
        request: GraphQLRequest,
    ) -> GraphResponse {
        let plan = match self.plan_request(&request).await {
            Ok(plan) => plan,
            Err(err) => {
                tracing::debug!(error = %err, "request rejected during planning");
                return GraphResponse::request_error(&err);
            }
        };
        if plan.mode == OperationMode::Subscription {
            return GraphResponse::request_error(&EngineError::Subscription(
                "subscriptions must be opened as a stream".to_string(),
            ));
        }
        let variables = match variables_object(request.variables)
            .and_then(|values| Ok(plan.coerce_variables(&self.schema, &values)?))
        {
            Ok(variables) => variables,
            Err(err) => return GraphResponse::request_error(&err),
        };

        tracing::debug!(
            mode = %plan.mode,
            operation = ?plan.operation_name,
            complexity = plan.cost.complexity,
            "executing request"
        );
        let result = self
            .query_executor
            .execute_plan(&plan, &variables, ctx)
            .await;
        GraphResponse::from(result)
    }

    /// Text-in, JSON-out wrapper over [`GraphEngine::execute_request`].
    /// `variables_json` may be empty.
    pub async fn process_request(
        &self,
        ctx: &ExecutionContext,
        query: &str,
        variables_json: &str,
    ) -> Result<String, EngineError> {
        let request = GraphQLRequest {
            query: query.to_string(),
            variables: parse_variables(variables_json)?,
            operation_name: None,
        };
        let response = self.execute_request(ctx, request).await;
        Ok(serde_json::to_string(&response)?)
    }

    /// Starts a subscription and maps every event through its selection set.
    /// The stream ends when `ctx` is cancelled or the event source finishes.
    pub async fn subscribe_request(
        &self,
        ctx: &ExecutionContext,
        request: GraphQLRequest,
    ) -> Result<BoxStream<'static, GraphResponse>, EngineError> {
        let plan = self.plan_request(&request).await?;
        if plan.mode != OperationMode::Subscription {
            return Err(EngineError::NotASubscription);
        }
        let values = variables_object(request.variables)?;
        let variables = Arc::new(plan.coerce_variables(&self.schema, &values)?);

        let events = self
            .query_executor
            .subscribe(&plan, &variables, ctx)
            .await
            .map_err(|err| EngineError::Subscription(err.message))?;
        tracing::debug!(operation = ?plan.operation_name, "subscription started");

        let executor = self.query_executor.clone();
        let event_ctx = ctx.clone();
        let stop_ctx = ctx.clone();
        let responses = events
            .then(move |event| {
                let executor = executor.clone();
                let plan = plan.clone();
                let variables = variables.clone();
                let ctx = event_ctx.clone();
                async move {
                    let result = executor.resolve_event(&plan, &variables, event, &ctx).await;
                    GraphResponse::from(result)
                }
            })
            .take_until(async move { stop_ctx.cancelled().await });
        Ok(responses.boxed())
    }

    /// Text-in wrapper over [`GraphEngine::subscribe_request`].
    pub async fn open_subscription(
        &self,
        ctx: &ExecutionContext,
        query: &str,
        variables_json: &str,
    ) -> Result<BoxStream<'static, GraphResponse>, EngineError> {
        let request = GraphQLRequest {
            query: query.to_string(),
            variables: parse_variables(variables_json)?,
            operation_name: None,
        };
        self.subscribe_request(ctx, request).await
    }
}

fn parse_variables(source: &str) -> Result<Option<Value>, EngineError> {
    if source.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(source)
        .map(Some)
        .map_err(|e| EngineError::InvalidVariables(e.to_string()))
}

fn variables_object(variables: Option<Value>) -> Result<Map<String, Value>, EngineError> {
    match variables {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(values)) => Ok(values),
        Some(other) => Err(EngineError::InvalidVariables(format!(
            "expected an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{stream_resolver, sync_resolver};
    use crate::types::FieldDescriptor;
    use crate::value::Resolved;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn engine() -> GraphEngine {
        let mut registry = SchemaRegistry::new();
        registry
            .register_query(
                FieldDescriptor::new("double", "Int!").param("n", "Int!"),
                sync_resolver(|ctx| Ok(Resolved::from(ctx.arg::<i64>("n")? * 2))),
            )
            .unwrap();
        registry
            .register_subscription(
                FieldDescriptor::new("ticks", "Int!"),
                stream_resolver(|_| async {
                    Ok(stream::iter([1i64, 2, 3].map(Resolved::from)))
                }),
            )
            .unwrap();
        GraphEngine::new(registry, EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn processes_text_requests() {
        let engine = engine();
        let out = engine
            .process_request(
                &ExecutionContext::new(),
                "query ($n: Int!) { double(n: $n) }",
                r#"{"n": 21}"#,
            )
            .await
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&out).unwrap(),
            json!({"data": {"double": 42}})
        );
    }

    #[tokio::test]
    async fn planning_errors_fail_the_request() {
        let engine = engine();
        let response = engine
            .execute_request(
                &ExecutionContext::new(),
                GraphQLRequest::new("{ triple(n: 1) }"),
            )
            .await;
        assert_eq!(response.status_code(), 400);
        assert_eq!(response.data, None);
        assert!(response.errors[0].message.contains("triple"));
    }

    #[tokio::test]
    async fn missing_variables_fail_the_request() {
        let engine = engine();
        let response = engine
            .execute_request(
                &ExecutionContext::new(),
                GraphQLRequest::new("query ($n: Int!) { double(n: $n) }"),
            )
            .await;
        assert_eq!(response.status_code(), 400);
    }

    #[tokio::test]
    async fn rejects_malformed_variables() {
        let engine = engine();
        let err = engine
            .process_request(&ExecutionContext::new(), "{ double(n: 1) }", "[1]")
            .await;
        assert!(matches!(err, Ok(body) if body.contains("expected an object")));
        let err = engine
            .process_request(&ExecutionContext::new(), "{ double(n: 1) }", "{")
            .await;
        assert!(matches!(err, Err(EngineError::InvalidVariables(_))));
    }

    #[tokio::test]
    async fn streams_subscription_events() {
        let engine = engine();
        let responses: Vec<_> = engine
            .open_subscription(&ExecutionContext::new(), "subscription { ticks }", "")
            .await
            .unwrap()
            .collect()
            .await;
        let data: Vec<_> = responses.into_iter().filter_map(|r| r.data).collect();
        assert_eq!(
            data,
            vec![json!({"ticks": 1}), json!({"ticks": 2}), json!({"ticks": 3})]
        );
    }

    #[tokio::test]
    async fn queries_cannot_be_streamed() {
        let engine = engine();
        let err = engine
            .open_subscription(&ExecutionContext::new(), "{ double(n: 1) }", "")
            .await;
        assert!(matches!(err, Err(EngineError::NotASubscription)));
    }
}
