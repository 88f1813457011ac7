use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, join_all};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::coercion::coerce_input;
use crate::config::QueryLimits;
use crate::context::ExecutionContext;
use crate::error::{FieldError, FieldErrorKind, Location, PathSegment};
use crate::query_planner::{InputValue, PlannedField, RequestPlan, Selection, included};
use crate::resolver::{EventStream, Resolver, ResolverContext, ResolverHandle};
use crate::schema_registry::SchemaRegistry;
use crate::types::{OperationMode, Param, SUBSCRIPTION_ROOT, TypeKind, TypeRef};
use crate::value::{ObjectValue, Resolved};

/// Data tree plus the field errors collected while building it. `data` is
/// `None` when a null propagated all the way to the root.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub errors: Vec<FieldError>,
}

#[async_trait]
pub trait QueryExecutor {
    async fn execute_plan(
        &self,
        plan: &RequestPlan,
        variables: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> ExecutionResult;

    /// Starts the event stream behind a subscription plan's root field.
    async fn subscribe(
        &self,
        plan: &RequestPlan,
        variables: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<EventStream, FieldError>;

    /// Maps one subscription event through the plan's selection set.
    async fn resolve_event(
        &self,
        plan: &RequestPlan,
        variables: &Map<String, Value>,
        event: Resolved,
        ctx: &ExecutionContext,
    ) -> ExecutionResult;
}

/// Executes plans by invoking the resolvers bound in a [`SchemaRegistry`].
pub struct ResolverExecutor {
    schema: Arc<SchemaRegistry>,
    limits: QueryLimits,
}

impl ResolverExecutor {
    pub fn new(schema: Arc<SchemaRegistry>, limits: QueryLimits) -> Self {
        ResolverExecutor { schema, limits }
    }

    fn execution<'a>(
        &'a self,
        variables: &'a Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Execution<'a> {
        Execution {
            schema: &self.schema,
            limits: &self.limits,
            variables,
            ctx: ctx.clone().with_budget(self.limits.max_concurrent_resolvers),
            errors: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryExecutor for ResolverExecutor {
    async fn execute_plan(
        &self,
        plan: &RequestPlan,
        variables: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let execution = self.execution(variables, ctx);
        let serial = plan.mode == OperationMode::Mutation;
        let data = execution
            .execute_selection_set(
                plan.mode.root_type(),
                None,
                vec![plan.selection_set.as_slice()],
                Vec::new(),
                serial,
            )
            .await;
        execution.finish(data.ok().map(Value::Object))
    }

    async fn subscribe(
        &self,
        plan: &RequestPlan,
        variables: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<EventStream, FieldError> {
        let execution = self.execution(variables, ctx);
        let fields = execution.collect_fields(SUBSCRIPTION_ROOT, &[plan.selection_set.as_slice()]);
        let Some((key, group)) = fields.into_iter().next() else {
            return Err(FieldError {
                message: "subscription selects no root field".to_string(),
                locations: Vec::new(),
                path: Vec::new(),
                kind: FieldErrorKind::Resolver,
            });
        };
        let field = group[0];
        let path = vec![PathSegment::from(key)];
        let error = |kind, message: String| {
            FieldError::new(kind, message, path.clone(), field.location)
        };

        let binding = self
            .schema
            .lookup(OperationMode::Subscription, &field.name)
            .map_err(|e| error(FieldErrorKind::Resolver, e.to_string()))?;
        let ResolverHandle::Stream(resolver) = &binding.handle else {
            return Err(error(
                FieldErrorKind::Resolver,
                format!("`{}` is not a subscription field", field.name),
            ));
        };
        let args = execution
            .bind_arguments(binding.params(), &field.arguments)
            .map_err(|message| error(FieldErrorKind::ArgumentBinding, message))?;
        let rctx = ResolverContext::new(self.schema.clone(), None, args, execution.ctx.clone());

        let future = std::panic::catch_unwind(AssertUnwindSafe(|| resolver(rctx)))
            .map_err(|payload| error(FieldErrorKind::Panic, panic_message(payload)))?;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(error(FieldErrorKind::Cancelled, "request was cancelled".to_string())),
            outcome = AssertUnwindSafe(future).catch_unwind() => match outcome {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(error(FieldErrorKind::Resolver, e.message().to_string())),
                Err(payload) => Err(error(FieldErrorKind::Panic, panic_message(payload))),
            },
        }
    }

    async fn resolve_event(
        &self,
        plan: &RequestPlan,
        variables: &Map<String, Value>,
        event: Resolved,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let execution = self.execution(variables, ctx);
        let fields = execution.collect_fields(SUBSCRIPTION_ROOT, &[plan.selection_set.as_slice()]);
        let mut data = Map::new();
        let mut failed = false;
        for (key, group) in fields {
            let field = group[0];
            let value = if field.name == "__typename" {
                Ok(Value::String(SUBSCRIPTION_ROOT.to_string()))
            } else {
                execution
                    .complete(
                        &field.ty,
                        event.clone(),
                        sub_selections(&group),
                        vec![PathSegment::from(key)],
                        field.location,
                    )
                    .await
            };
            match value {
                Ok(value) => {
                    data.insert(key.to_string(), value);
                }
                Err(Propagate) => failed = true,
            }
        }
        execution.finish((!failed).then_some(Value::Object(data)))
    }
}

/// A field error was recorded; the nearest nullable ancestor becomes null.
struct Propagate;

type Completed = Result<Value, Propagate>;

struct Execution<'a> {
    schema: &'a Arc<SchemaRegistry>,
    limits: &'a QueryLimits,
    variables: &'a Map<String, Value>,
    ctx: ExecutionContext,
    errors: Mutex<Vec<FieldError>>,
}

fn sub_selections<'a>(group: &[&'a PlannedField]) -> Vec<&'a [Selection]> {
    group.iter().map(|f| f.selection_set.as_slice()).collect()
}

fn root_mode(type_name: &str) -> Option<OperationMode> {
    OperationMode::ALL
        .into_iter()
        .find(|mode| mode.root_type() == type_name)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("resolver panicked: {detail}")
}

/// Null for a nullable field, propagation for a non-null one.
fn null_or_propagate(ty: &TypeRef) -> Completed {
    if ty.is_non_null() {
        Err(Propagate)
    } else {
        Ok(Value::Null)
    }
}

impl<'a> Execution<'a> {
    fn finish(self, data: Option<Value>) -> ExecutionResult {
        ExecutionResult {
            data,
            errors: self.errors.into_inner(),
        }
    }

    fn record(
        &self,
        kind: FieldErrorKind,
        message: impl Into<String>,
        path: &[PathSegment],
        location: Location,
    ) {
        let error = FieldError::new(kind, message, path.to_vec(), location);
        tracing::debug!(path = ?error.path, kind = ?kind, message = %error.message, "field error");
        self.errors.lock().push(error);
    }

    /// Groups selected fields by response key, in document order, keeping
    /// only fragments that apply to `type_name` and selections not excluded
    /// by `@skip` / `@include`.
    fn collect_fields(
        &self,
        type_name: &str,
        sets: &[&'a [Selection]],
    ) -> IndexMap<&'a str, Vec<&'a PlannedField>> {
        let mut fields = IndexMap::new();
        for set in sets {
            self.collect_into(type_name, set, &mut fields);
        }
        fields
    }

    fn collect_into(
        &self,
        type_name: &str,
        set: &'a [Selection],
        fields: &mut IndexMap<&'a str, Vec<&'a PlannedField>>,
    ) {
        for selection in set {
            match selection {
                Selection::Field(field) => {
                    if included(&field.conditions, self.variables) {
                        fields
                            .entry(field.response_key())
                            .or_insert_with(Vec::new)
                            .push(field);
                    }
                }
                Selection::Fragment(fragment) => {
                    let applies = match &fragment.type_condition {
                        None => true,
                        Some(condition) => self.schema.is_possible_type(condition, type_name),
                    };
                    if applies && included(&fragment.conditions, self.variables) {
                        self.collect_into(type_name, &fragment.selection_set, fields);
                    }
                }
            }
        }
    }

    fn execute_selection_set(
        &'a self,
        type_name: &'a str,
        parent: Option<ObjectValue>,
        sets: Vec<&'a [Selection]>,
        path: Vec<PathSegment>,
        serial: bool,
    ) -> BoxFuture<'a, Result<Map<String, Value>, Propagate>> {
        async move {
            let fields = self.collect_fields(type_name, &sets);
            let mut results = Vec::with_capacity(fields.len());
            if serial {
                for (key, group) in fields {
                    let mut field_path = path.clone();
                    field_path.push(PathSegment::from(key));
                    let value = self
                        .execute_field(type_name, parent.clone(), group, field_path)
                        .await;
                    results.push((key, value));
                }
            } else {
                let pending = fields.into_iter().map(|(key, group)| {
                    let mut field_path = path.clone();
                    field_path.push(PathSegment::from(key));
                    self.execute_field(type_name, parent.clone(), group, field_path)
                        .map(move |value| (key, value))
                });
                results = join_all(pending).await;
            }

            let mut data = Map::new();
            for (key, value) in results {
                data.insert(key.to_string(), value?);
            }
            Ok(data)
        }
        .boxed()
    }

    fn execute_field(
        &'a self,
        type_name: &'a str,
        parent: Option<ObjectValue>,
        group: Vec<&'a PlannedField>,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'a, Completed> {
        async move {
            let field = group[0];
            if field.name == "__typename" {
                return Ok(Value::String(type_name.to_string()));
            }

            let (params, resolver): (&[Param], Option<&Resolver>) = match root_mode(type_name) {
                Some(mode) => match self.schema.lookup(mode, &field.name) {
                    Ok(binding) => match &binding.handle {
                        ResolverHandle::Field(resolver) => (binding.params(), Some(resolver)),
                        ResolverHandle::Stream(_) => {
                            self.record(
                                FieldErrorKind::Resolver,
                                format!("subscription field `{}` can only be streamed", field.name),
                                &path,
                                field.location,
                            );
                            return null_or_propagate(&field.ty);
                        }
                    },
                    Err(err) => {
                        self.record(FieldErrorKind::Resolver, err.to_string(), &path, field.location);
                        return null_or_propagate(&field.ty);
                    }
                },
                None => match self.schema.field_of(type_name, &field.name) {
                    Some(descriptor) => (descriptor.params(), descriptor.resolver.as_ref()),
                    None => {
                        self.record(
                            FieldErrorKind::Resolver,
                            format!("`{type_name}` has no field `{}`", field.name),
                            &path,
                            field.location,
                        );
                        return null_or_propagate(&field.ty);
                    }
                },
            };

            let resolved = match resolver {
                Some(resolver) => {
                    let args = match self.bind_arguments(params, &field.arguments) {
                        Ok(args) => args,
                        Err(message) => {
                            self.record(
                                FieldErrorKind::ArgumentBinding,
                                message,
                                &path,
                                field.location,
                            );
                            return null_or_propagate(&field.ty);
                        }
                    };
                    let rctx =
                        ResolverContext::new(self.schema.clone(), parent, args, self.ctx.clone());
                    match self.invoke(resolver, rctx).await {
                        Ok(value) => value,
                        Err((kind, message)) => {
                            self.record(kind, message, &path, field.location);
                            return null_or_propagate(&field.ty);
                        }
                    }
                }
                None => parent
                    .as_ref()
                    .and_then(|p| p.get(&field.name))
                    .cloned()
                    .map(Resolved::from_json)
                    .unwrap_or_default(),
            };

            self.complete(
                &field.ty,
                resolved,
                sub_selections(&group),
                path,
                field.location,
            )
            .await
        }
        .boxed()
    }

    /// Resolves arguments against the declared parameters: variables are
    /// substituted, defaults applied and values coerced.
    fn bind_arguments(
        &self,
        params: &[Param],
        arguments: &[(String, InputValue)],
    ) -> Result<Map<String, Value>, String> {
        let mut bound = Map::new();
        for param in params {
            let provided = arguments
                .iter()
                .find(|(name, _)| name == &param.name)
                .and_then(|(_, value)| value.bind(self.variables));
            let value = match (provided, &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) if param.ty.is_non_null() => {
                    return Err(format!("missing required argument `{}`", param.name));
                }
                (None, None) => continue,
            };
            let value = coerce_input(self.schema, &param.ty, &value)
                .map_err(|e| format!("argument `{}`: {e}", param.name))?;
            bound.insert(param.name.clone(), value);
        }
        Ok(bound)
    }

    /// Calls a resolver inside the request budget, racing cancellation and
    /// catching panics at the field boundary.
    async fn invoke(
        &self,
        resolver: &Resolver,
        rctx: ResolverContext,
    ) -> Result<Resolved, (FieldErrorKind, String)> {
        let cancelled = || (FieldErrorKind::Cancelled, "request was cancelled".to_string());
        let _permit = match self.ctx.budget() {
            Some(budget) => tokio::select! {
                biased;
                _ = self.ctx.cancelled() => return Err(cancelled()),
                permit = budget.acquire() => Some(permit.map_err(|_| cancelled())?),
            },
            None => None,
        };
        if self.ctx.is_cancelled() {
            return Err(cancelled());
        }

        let future = std::panic::catch_unwind(AssertUnwindSafe(|| resolver(rctx))).map_err(|payload| {
            let message = panic_message(payload);
            tracing::error!(%message, "resolver panicked");
            (FieldErrorKind::Panic, message)
        })?;
        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => Err(cancelled()),
            outcome = AssertUnwindSafe(future).catch_unwind() => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err((FieldErrorKind::Resolver, err.message().to_string())),
                Err(payload) => {
                    let message = panic_message(payload);
                    tracing::error!(%message, "resolver panicked");
                    Err((FieldErrorKind::Panic, message))
                }
            },
        }
    }

    /// Completes a resolved value against its declared type. Errors in a
    /// nullable position turn into null; a null in a non-null position
    /// propagates.
    fn complete(
        &'a self,
        ty: &'a TypeRef,
        value: Resolved,
        sets: Vec<&'a [Selection]>,
        path: Vec<PathSegment>,
        location: Location,
    ) -> BoxFuture<'a, Completed> {
        async move {
            match ty {
                TypeRef::NonNull(inner) => {
                    match self.complete_inner(inner, value, sets, &path, location).await? {
                        Value::Null => {
                            self.record(
                                FieldErrorKind::NullViolation,
                                format!("cannot return null for non-nullable type `{ty}`"),
                                &path,
                                location,
                            );
                            Err(Propagate)
                        }
                        value => Ok(value),
                    }
                }
                nullable => Ok(self
                    .complete_inner(nullable, value, sets, &path, location)
                    .await
                    .unwrap_or(Value::Null)),
            }
        }
        .boxed()
    }

    async fn complete_inner(
        &'a self,
        ty: &'a TypeRef,
        value: Resolved,
        sets: Vec<&'a [Selection]>,
        path: &[PathSegment],
        location: Location,
    ) -> Completed {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            TypeRef::List(item_type) => {
                let Resolved::List(items) = value else {
                    self.record(
                        FieldErrorKind::Coercion,
                        format!("expected a list for type `{ty}`"),
                        path,
                        location,
                    );
                    return Err(Propagate);
                };
                let max = self.limits.max_array_size as usize;
                if max > 0 && items.len() > max {
                    self.record(
                        FieldErrorKind::ArraySizeExceeded,
                        format!("list of {} items exceeds max_array_size {max}", items.len()),
                        path,
                        location,
                    );
                    return Err(Propagate);
                }
                let pending = items.into_iter().enumerate().map(|(index, item)| {
                    let mut item_path = path.to_vec();
                    item_path.push(PathSegment::Index(index));
                    self.complete(item_type, item, sets.clone(), item_path, location)
                });
                join_all(pending)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            TypeRef::NonNull(_) => self.complete(ty, value, sets, path.to_vec(), location).await,
            TypeRef::Named(name) => {
                let Some(descriptor) = self.schema.type_of(name) else {
                    self.record(
                        FieldErrorKind::Coercion,
                        format!("type `{name}` is not registered"),
                        path,
                        location,
                    );
                    return Err(Propagate);
                };
                match (descriptor.kind(), value) {
                    (TypeKind::Scalar(scalar), Resolved::Leaf(raw)) => {
                        scalar.serialize(&raw).map_err(|e| {
                            self.record(FieldErrorKind::Coercion, e.0, path, location);
                            Propagate
                        })
                    }
                    (TypeKind::Enum { values }, Resolved::Leaf(raw)) => match raw.as_str() {
                        Some(v) if values.iter().any(|known| known == v) => Ok(raw),
                        _ => {
                            self.record(
                                FieldErrorKind::Coercion,
                                format!("`{raw}` is not a value of enum `{name}`"),
                                path,
                                location,
                            );
                            Err(Propagate)
                        }
                    },
                    (
                        TypeKind::Object { .. } | TypeKind::Interface { .. } | TypeKind::Union { .. },
                        Resolved::Object(object),
                    ) => {
                        let concrete = match self.schema.discover(name, &object) {
                            Ok(concrete) => concrete,
                            Err(message) => {
                                self.record(FieldErrorKind::TypeDiscovery, message, path, location);
                                return Err(Propagate);
                            }
                        };
                        self.execute_selection_set(
                            concrete.name(),
                            Some(object),
                            sets,
                            path.to_vec(),
                            false,
                        )
                        .await
                        .map(Value::Object)
                    }
                    (kind, other) => {
                        self.record(
                            FieldErrorKind::Coercion,
                            format!(
                                "cannot complete {} `{name}` from {}",
                                kind.introspection_name().to_lowercase(),
                                other.into_json()
                            ),
                            path,
                            location,
                        );
                        Err(Propagate)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_planner::SchemaQueryPlanner;
    use crate::resolver::{resolver, sync_resolver};
    use crate::types::{FieldDescriptor, TypeDescriptor};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn schema() -> Arc<SchemaRegistry> {
        let mut schema = SchemaRegistry::new();
        schema
            .register_type(
                TypeDescriptor::object("Widget")
                    .field(FieldDescriptor::new("id", "Int!"))
                    .field(FieldDescriptor::new("name", "String"))
                    .field(FieldDescriptor::new("label", "String!").resolve(sync_resolver(
                        |ctx| {
                            let name = ctx.parent().and_then(|p| p.get("name")).cloned();
                            Ok(Resolved::from_json(name.unwrap_or(Value::Null)))
                        },
                    ))),
            )
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("widget", "Widget").param("id", "Int!"),
                sync_resolver(|ctx| {
                    let id: i64 = ctx.arg("id")?;
                    let name = if id == 2 { Value::Null } else { json!("gear") };
                    Ok(Resolved::from_json(json!({"id": id, "name": name})))
                }),
            )
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("ok", "String"),
                sync_resolver(|_| Ok(Resolved::from("fine"))),
            )
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("broken", "String"),
                sync_resolver(|_| Err("boom".into())),
            )
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("panics", "String"),
                sync_resolver(|_| panic!("kaboom")),
            )
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("numbers", "[Int!]!"),
                sync_resolver(|_| Ok(Resolved::from_json(json!([1, 2, 3, 4])))),
            )
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("slow", "Int"),
                resolver(|_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Resolved::from(1))
                }),
            )
            .unwrap();
        schema.finalize().unwrap();
        Arc::new(schema)
    }

    async fn run(query: &str, limits: QueryLimits, ctx: ExecutionContext) -> ExecutionResult {
        let schema = schema();
        let plan = SchemaQueryPlanner::new(schema.clone(), QueryLimits::unbounded())
            .plan(query, None)
            .unwrap();
        let executor = ResolverExecutor::new(schema, limits);
        executor.execute_plan(&plan, &Map::new(), &ctx).await
    }

    #[tokio::test]
    async fn failing_siblings_do_not_abort_the_request() {
        let result = run("{ ok broken }", QueryLimits::unbounded(), ExecutionContext::new()).await;
        assert_eq!(result.data, Some(json!({"ok": "fine", "broken": null})));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, vec![PathSegment::from("broken")]);
        assert_eq!(result.errors[0].message, "boom");
    }

    #[tokio::test]
    async fn panics_become_field_errors() {
        let result = run("{ ok panics }", QueryLimits::unbounded(), ExecutionContext::new()).await;
        assert_eq!(result.data, Some(json!({"ok": "fine", "panics": null})));
        assert_eq!(result.errors[0].kind, FieldErrorKind::Panic);
        assert!(result.errors[0].message.contains("kaboom"));
    }

    #[tokio::test]
    async fn nulls_propagate_to_the_nearest_nullable_parent() {
        let result = run(
            "{ a: widget(id: 1) { label } b: widget(id: 2) { id label } }",
            QueryLimits::unbounded(),
            ExecutionContext::new(),
        )
        .await;
        assert_eq!(
            result.data,
            Some(json!({"a": {"label": "gear"}, "b": null}))
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, FieldErrorKind::NullViolation);
        assert_eq!(
            result.errors[0].path,
            vec![PathSegment::from("b"), PathSegment::from("label")]
        );
    }

    #[tokio::test]
    async fn missing_arguments_skip_the_resolver() {
        let schema = schema();
        let plan = SchemaQueryPlanner::new(schema.clone(), QueryLimits::unbounded())
            .plan("query ($id: Int!) { widget(id: $id) { id } }", None)
            .unwrap();
        let result = ResolverExecutor::new(schema, QueryLimits::unbounded())
            .execute_plan(&plan, &Map::new(), &ExecutionContext::new())
            .await;
        assert_eq!(result.data, Some(json!({"widget": null})));
        assert_eq!(result.errors[0].kind, FieldErrorKind::ArgumentBinding);
    }

    #[tokio::test]
    async fn oversized_lists_are_rejected_at_runtime() {
        let limits = QueryLimits {
            max_array_size: 3,
            ..QueryLimits::unbounded()
        };
        let result = run("{ ok numbers }", limits, ExecutionContext::new()).await;
        assert_eq!(result.data, None);
        assert_eq!(result.errors[0].kind, FieldErrorKind::ArraySizeExceeded);
    }

    #[tokio::test]
    async fn typename_reports_the_parent_type() {
        let result = run(
            "{ __typename widget(id: 1) { __typename id } }",
            QueryLimits::unbounded(),
            ExecutionContext::new(),
        )
        .await;
        assert_eq!(
            result.data,
            Some(json!({"__typename": "Query", "widget": {"__typename": "Widget", "id": 1}}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadlines_cancel_pending_resolvers() {
        let ctx = ExecutionContext::new().with_timeout(Duration::from_millis(100));
        let result = run("{ ok slow }", QueryLimits::unbounded(), ctx).await;
        assert_eq!(result.data, Some(json!({"ok": "fine", "slow": null})));
        assert_eq!(result.errors[0].kind, FieldErrorKind::Cancelled);
    }
}
