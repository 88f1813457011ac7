use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::ResolverError;
use crate::schema_registry::SchemaRegistry;
use crate::types::CustomScalar;
use crate::value::{ObjectValue, Resolved};

pub type ResolverResult = Result<Resolved, ResolverError>;

pub type Resolver = Arc<dyn Fn(ResolverContext) -> BoxFuture<'static, ResolverResult> + Send + Sync>;

pub type EventStream = BoxStream<'static, Resolved>;

pub type StreamResolver = Arc<
    dyn Fn(ResolverContext) -> BoxFuture<'static, Result<EventStream, ResolverError>> + Send + Sync,
>;

/// What a root binding invokes.
#[derive(Clone)]
pub enum ResolverHandle {
    Field(Resolver),
    Stream(StreamResolver),
}

/// Wraps an async closure as a field resolver.
pub fn resolver<F, Fut>(f: F) -> Resolver
where
    F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResolverResult> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Wraps a synchronous closure as a field resolver.
pub fn sync_resolver<F>(f: F) -> Resolver
where
    F: Fn(ResolverContext) -> ResolverResult + Send + Sync + 'static,
{
    Arc::new(move |ctx| future::ready(f(ctx)).boxed())
}

/// Wraps an async closure producing an event stream as a subscription resolver.
pub fn stream_resolver<F, Fut, S>(f: F) -> StreamResolver
where
    F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S, ResolverError>> + Send + 'static,
    S: Stream<Item = Resolved> + Send + 'static,
{
    Arc::new(move |ctx| {
        let fut = f(ctx);
        async move { fut.await.map(StreamExt::boxed) }.boxed()
    })
}

/// Everything a resolver gets to see: the parent value, its bound arguments
/// and the caller's execution context.
#[derive(Clone)]
pub struct ResolverContext {
    pub(crate) parent: Option<ObjectValue>,
    pub(crate) args: Map<String, Value>,
    pub(crate) execution: ExecutionContext,
    pub(crate) schema: Arc<SchemaRegistry>,
}

impl ResolverContext {
    pub fn new(
        schema: Arc<SchemaRegistry>,
        parent: Option<ObjectValue>,
        args: Map<String, Value>,
        execution: ExecutionContext,
    ) -> Self {
        ResolverContext {
            parent,
            args,
            execution,
            schema,
        }
    }

    /// Deserializes a required argument.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| ResolverError::new(format!("missing argument `{name}`")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ResolverError::new(format!("argument `{name}`: {e}")))
    }

    /// Deserializes an optional argument; absent and null both yield `None`.
    pub fn opt_arg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ResolverError> {
        match self.args.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ResolverError::new(format!("argument `{name}`: {e}"))),
        }
    }

    pub fn scalar_arg<T: CustomScalar>(&self, name: &str) -> Result<T, ResolverError> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| ResolverError::new(format!("missing argument `{name}`")))?;
        Ok(T::parse_value(value)?)
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    pub fn parent(&self) -> Option<&ObjectValue> {
        self.parent.as_ref()
    }

    /// The parent downcast to the Rust value it was built from.
    pub fn parent_as<T: 'static>(&self) -> Result<&T, ResolverError> {
        self.parent
            .as_ref()
            .and_then(|parent| parent.downcast::<T>())
            .ok_or_else(|| {
                ResolverError::new(format!(
                    "parent value is not a {}",
                    std::any::type_name::<T>()
                ))
            })
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.execution
    }

    /// Shortcut for an ambient value stored on the execution context.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.execution.value::<T>()
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct WidgetInput {
        name: String,
        unit_price: f64,
    }

    fn context(args: Value) -> ResolverContext {
        let Value::Object(args) = args else {
            panic!("args must be an object")
        };
        ResolverContext::new(
            Arc::new(SchemaRegistry::new()),
            None,
            args,
            ExecutionContext::new(),
        )
    }

    #[test]
    fn deserializes_input_objects() {
        let ctx = context(json!({"widget": {"name": "gear", "unitPrice": 2.5}}));
        let input: WidgetInput = ctx.arg("widget").unwrap();
        assert_eq!(
            input,
            WidgetInput {
                name: "gear".into(),
                unit_price: 2.5
            }
        );
    }

    #[test]
    fn optional_arguments_treat_null_as_absent() {
        let ctx = context(json!({"filter": null}));
        assert_eq!(ctx.opt_arg::<i64>("filter").unwrap(), None);
        assert_eq!(ctx.opt_arg::<i64>("missing").unwrap(), None);
        assert!(ctx.arg::<i64>("missing").is_err());
    }

    #[tokio::test]
    async fn sync_resolvers_complete_immediately() {
        let r = sync_resolver(|ctx| Ok(Resolved::from(ctx.arg::<i64>("n")? * 2)));
        let out = r(context(json!({"n": 21}))).await.unwrap();
        assert_eq!(out.into_json(), json!(42));
    }
}
