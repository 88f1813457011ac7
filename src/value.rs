use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ResolverError;
use crate::types::CustomScalar;

/// Key under which a serialized value names its concrete type.
pub const TYPENAME_KEY: &str = "__typename";

/// The value a resolver hands back to the engine.
#[derive(Clone, Debug, Default)]
pub enum Resolved {
    #[default]
    Null,
    /// A scalar or enum value in its wire form.
    Leaf(Value),
    List(Vec<Resolved>),
    Object(ObjectValue),
}

impl Resolved {
    /// Serializes `value` into plain data. Objects lose their Rust source,
    /// see [`Resolved::object`] to keep it.
    pub fn value<T: Serialize>(value: &T) -> Result<Self, ResolverError> {
        Ok(Resolved::from_json(serde_json::to_value(value)?))
    }

    /// Wraps a Rust value as an object, keeping it for downcasting in
    /// field resolvers.
    pub fn object<T>(value: T) -> Result<Self, ResolverError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        Ok(Resolved::Object(ObjectValue::new(value)?))
    }

    /// Like [`Resolved::object`], with an explicit concrete type name.
    pub fn typed_object<T>(type_name: impl Into<String>, value: T) -> Result<Self, ResolverError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        Ok(Resolved::Object(ObjectValue::typed(type_name, value)?))
    }

    pub fn objects<T, I>(values: I) -> Result<Self, ResolverError>
    where
        T: Serialize + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
    {
        values
            .into_iter()
            .map(Resolved::object)
            .collect::<Result<Vec<_>, _>>()
            .map(Resolved::List)
    }

    pub fn optional_object<T>(value: Option<T>) -> Result<Self, ResolverError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        value.map_or(Ok(Resolved::Null), Resolved::object)
    }

    pub fn scalar<T: CustomScalar>(value: &T) -> Result<Self, ResolverError> {
        Ok(Resolved::Leaf(value.serialize()?))
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Resolved::Null,
            Value::Array(items) => {
                Resolved::List(items.into_iter().map(Resolved::from_json).collect())
            }
            Value::Object(fields) => Resolved::Object(ObjectValue::from_map(fields)),
            leaf => Resolved::Leaf(leaf),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Null)
    }

    /// Plain JSON view, dropping any Rust sources.
    pub fn into_json(self) -> Value {
        match self {
            Resolved::Null => Value::Null,
            Resolved::Leaf(value) => value,
            Resolved::List(items) => Value::Array(items.into_iter().map(Self::into_json).collect()),
            Resolved::Object(object) => Value::Object(object.fields().clone()),
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Resolved::from_json(value)
    }
}

impl From<ObjectValue> for Resolved {
    fn from(object: ObjectValue) -> Self {
        Resolved::Object(object)
    }
}

impl From<Vec<Resolved>> for Resolved {
    fn from(items: Vec<Resolved>) -> Self {
        Resolved::List(items)
    }
}

macro_rules! leaf_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Resolved {
            fn from(value: $ty) -> Self {
                Resolved::Leaf(Value::from(value))
            }
        })*
    };
}

leaf_from!(bool, i32, i64, u32, f64, String, &str);

impl<T: Into<Resolved>> From<Option<T>> for Resolved {
    fn from(value: Option<T>) -> Self {
        value.map_or(Resolved::Null, Into::into)
    }
}

struct ObjectInner {
    type_name: Option<String>,
    fields: Map<String, Value>,
    source: Option<Arc<dyn Any + Send + Sync>>,
}

/// An object flowing through execution: its serialized data fields, an
/// optional discriminator naming the concrete type, and optionally the Rust
/// value it was built from. Cheap to clone.
#[derive(Clone)]
pub struct ObjectValue(Arc<ObjectInner>);

impl ObjectValue {
    pub fn new<T>(value: T) -> Result<Self, ResolverError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::build(None, value)
    }

    pub fn typed<T>(type_name: impl Into<String>, value: T) -> Result<Self, ResolverError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::build(Some(type_name.into()), value)
    }

    fn build<T>(type_name: Option<String>, value: T) -> Result<Self, ResolverError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let fields = match serde_json::to_value(&value)? {
            Value::Object(fields) => fields,
            other => {
                return Err(ResolverError::new(format!(
                    "expected a value serializing to an object, got {other}"
                )));
            }
        };
        Ok(ObjectValue(Arc::new(ObjectInner {
            type_name,
            fields,
            source: Some(Arc::new(value)),
        })))
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        ObjectValue(Arc::new(ObjectInner {
            type_name: None,
            fields,
            source: None,
        }))
    }

    /// Name of the concrete type this value belongs to, if it carries one:
    /// the explicit type name first, then a `__typename` data field.
    pub fn discriminator(&self) -> Option<&str> {
        self.0
            .type_name
            .as_deref()
            .or_else(|| self.0.fields.get(TYPENAME_KEY).and_then(Value::as_str))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0.fields
    }

    /// Recovers the Rust value behind this object.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.0.source.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_name", &self.discriminator())
            .field("fields", &self.0.fields)
            .field("has_source", &self.0.source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Gadget {
        id: i32,
        label: String,
    }

    #[derive(Serialize)]
    #[serde(tag = "__typename")]
    enum Shape {
        Circle { radius: f64 },
        Square { side: f64 },
    }

    #[test]
    fn objects_keep_their_source() {
        let object = ObjectValue::new(Gadget {
            id: 3,
            label: "spring".into(),
        })
        .unwrap();
        assert_eq!(object.get("label"), Some(&json!("spring")));
        assert_eq!(object.downcast::<Gadget>().map(|g| g.id), Some(3));
        assert!(object.downcast::<String>().is_none());
    }

    #[test]
    fn discriminator_comes_from_tag_or_explicit_name() {
        let circle = ObjectValue::new(Shape::Circle { radius: 1.0 }).unwrap();
        assert_eq!(circle.discriminator(), Some("Circle"));

        let square = ObjectValue::typed("Tile", Shape::Square { side: 2.0 }).unwrap();
        assert_eq!(square.discriminator(), Some("Tile"));

        let plain = ObjectValue::from_map(Map::new());
        assert_eq!(plain.discriminator(), None);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(ObjectValue::new(5).is_err());
    }

    #[test]
    fn json_arrays_become_lists() {
        let resolved = Resolved::from_json(json!([1, {"a": 2}, null]));
        let Resolved::List(items) = resolved else {
            panic!("expected list")
        };
        assert!(matches!(items[0], Resolved::Leaf(_)));
        assert!(matches!(items[1], Resolved::Object(_)));
        assert!(items[2].is_null());
    }
}
