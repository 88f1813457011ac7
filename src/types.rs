use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RegistryError, ScalarError};
use crate::resolver::Resolver;

pub const QUERY_ROOT: &str = "Query";
pub const MUTATION_ROOT: &str = "Mutation";
pub const SUBSCRIPTION_ROOT: &str = "Subscription";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Query,
    Mutation,
    Subscription,
}

impl OperationMode {
    pub const ALL: [OperationMode; 3] = [
        OperationMode::Query,
        OperationMode::Mutation,
        OperationMode::Subscription,
    ];

    pub fn root_type(self) -> &'static str {
        match self {
            OperationMode::Query => QUERY_ROOT,
            OperationMode::Mutation => MUTATION_ROOT,
            OperationMode::Subscription => SUBSCRIPTION_ROOT,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            OperationMode::Query => 0,
            OperationMode::Mutation => 1,
            OperationMode::Subscription => 2,
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationMode::Query => "query",
            OperationMode::Mutation => "mutation",
            OperationMode::Subscription => "subscription",
        };
        f.write_str(name)
    }
}

/// A reference to a named type, possibly wrapped in list and non-null
/// modifiers. A bare `Named` or `List` is nullable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn list(self) -> Self {
        TypeRef::List(Box::new(self))
    }

    pub fn non_null(self) -> Self {
        match self {
            TypeRef::NonNull(_) => self,
            other => TypeRef::NonNull(Box::new(other)),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// Strips an outer non-null wrapper.
    pub fn nullable(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(inner) => inner,
            other => other,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.nullable(), TypeRef::List(_))
    }

    /// The innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named_type(),
        }
    }

    /// Whether a variable of type `self` may be used where `expected` is
    /// required. `has_default` relaxes a non-null requirement.
    pub fn fits(&self, expected: &TypeRef, has_default: bool) -> bool {
        match (self, expected) {
            (TypeRef::NonNull(var), TypeRef::NonNull(loc)) => var.fits(loc, false),
            (TypeRef::NonNull(var), loc) => var.fits(loc, false),
            (var, TypeRef::NonNull(loc)) => has_default && var.fits(loc, false),
            (TypeRef::List(var), TypeRef::List(loc)) => var.fits(loc, false),
            (TypeRef::Named(a), TypeRef::Named(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn from_ast(ty: &graphql_parser::query::Type<'_, String>) -> Self {
        use graphql_parser::query::Type;
        match ty {
            Type::NamedType(name) => TypeRef::Named(name.clone()),
            Type::ListType(inner) => TypeRef::List(Box::new(TypeRef::from_ast(inner))),
            Type::NonNullType(inner) => TypeRef::NonNull(Box::new(TypeRef::from_ast(inner))),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

impl FromStr for TypeRef {
    type Err = RegistryError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidTypeRef(source.to_string());
        let trimmed = source.trim();
        let (inner, non_null) = match trimmed.strip_suffix('!') {
            Some(rest) => (rest.trim_end(), true),
            None => (trimmed, false),
        };
        let base = if let Some(list) = inner.strip_prefix('[') {
            let item = list.strip_suffix(']').ok_or_else(invalid)?;
            TypeRef::List(Box::new(item.parse().map_err(|_| invalid())?))
        } else if is_name(inner) {
            TypeRef::Named(inner.to_string())
        } else {
            return Err(invalid());
        };
        Ok(if non_null {
            TypeRef::NonNull(Box::new(base))
        } else {
            base
        })
    }
}

fn is_name(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Parses a type reference, keeping the first failure around so builders can
/// stay infallible until registration.
fn parse_type(source: &str, error: &mut Option<RegistryError>) -> TypeRef {
    match source.parse() {
        Ok(ty) => ty,
        Err(err) => {
            error.get_or_insert(err);
            TypeRef::Named(source.to_string())
        }
    }
}

/// A declared argument or input field.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// A field exposed on an object, interface or root operation type.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) ty: TypeRef,
    pub(crate) params: Vec<Param>,
    pub(crate) resolver: Option<Resolver>,
    pub(crate) complexity: u64,
    pub(crate) error: Option<RegistryError>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: &str) -> Self {
        let mut error = None;
        let ty = parse_type(ty, &mut error);
        FieldDescriptor {
            name: name.into(),
            description: None,
            ty,
            params: Vec::new(),
            resolver: None,
            complexity: 1,
            error,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: &str) -> Self {
        let ty = parse_type(ty, &mut self.error);
        self.params.push(Param {
            name: name.into(),
            ty,
            default: None,
            description: None,
        });
        self
    }

    pub fn param_with_default(mut self, name: impl Into<String>, ty: &str, default: Value) -> Self {
        let ty = parse_type(ty, &mut self.error);
        self.params.push(Param {
            name: name.into(),
            ty,
            default: Some(default),
            description: None,
        });
        self
    }

    /// Resolver invoked with the parent object. Without one, the field is
    /// read from the parent's data.
    pub fn resolve(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Weight of this field in the complexity score.
    pub fn complexity(mut self, weight: u64) -> Self {
        self.complexity = weight;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param_named(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn same_shape(&self, other: &FieldDescriptor) -> bool {
        self.name == other.name
            && self.ty == other.ty
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.name == b.name && a.ty == b.ty)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("params", &self.params)
            .field("has_resolver", &self.resolver.is_some())
            .field("complexity", &self.complexity)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum TypeKind {
    Scalar(ScalarType),
    Object {
        fields: IndexMap<String, FieldDescriptor>,
        interfaces: Vec<String>,
    },
    Interface {
        fields: IndexMap<String, FieldDescriptor>,
    },
    Union {
        members: Vec<String>,
    },
    Enum {
        values: Vec<String>,
    },
    InputObject {
        fields: IndexMap<String, Param>,
    },
}

impl TypeKind {
    pub fn introspection_name(&self) -> &'static str {
        match self {
            TypeKind::Scalar(_) => "SCALAR",
            TypeKind::Object { .. } => "OBJECT",
            TypeKind::Interface { .. } => "INTERFACE",
            TypeKind::Union { .. } => "UNION",
            TypeKind::Enum { .. } => "ENUM",
            TypeKind::InputObject { .. } => "INPUT_OBJECT",
        }
    }
}

/// A registered named type.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) kind: TypeKind,
    pub(crate) error: Option<RegistryError>,
}

impl TypeDescriptor {
    fn with_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        TypeDescriptor {
            name: name.into(),
            description: None,
            kind,
            error: None,
        }
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            TypeKind::Object {
                fields: IndexMap::new(),
                interfaces: Vec::new(),
            },
        )
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            TypeKind::Interface {
                fields: IndexMap::new(),
            },
        )
    }

    pub fn union<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_kind(
            name,
            TypeKind::Union {
                members: members.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_kind(
            name,
            TypeKind::Enum {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn input_object(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            TypeKind::InputObject {
                fields: IndexMap::new(),
            },
        )
    }

    pub fn scalar(scalar: ScalarType) -> Self {
        let mut descriptor = Self::with_kind(scalar.name.clone(), TypeKind::Scalar(scalar));
        if let TypeKind::Scalar(scalar) = &descriptor.kind {
            descriptor.description = scalar.description.clone();
        }
        descriptor
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a field to an object or interface type.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        if let Some(err) = &field.error {
            self.error.get_or_insert_with(|| err.clone());
        }
        match &mut self.kind {
            TypeKind::Object { fields, .. } | TypeKind::Interface { fields } => {
                fields.insert(field.name.clone(), field);
            }
            _ => {
                self.error
                    .get_or_insert_with(|| RegistryError::ConflictingType(self.name.clone()));
            }
        }
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        match &mut self.kind {
            TypeKind::Object { interfaces, .. } => interfaces.push(interface.into()),
            _ => {
                self.error
                    .get_or_insert_with(|| RegistryError::ConflictingType(self.name.clone()));
            }
        }
        self
    }

    /// Adds a field to an input object type.
    pub fn input_field(mut self, name: impl Into<String>, ty: &str) -> Self {
        let ty = parse_type(ty, &mut self.error);
        let name = name.into();
        match &mut self.kind {
            TypeKind::InputObject { fields } => {
                fields.insert(
                    name.clone(),
                    Param {
                        name,
                        ty,
                        default: None,
                        description: None,
                    },
                );
            }
            _ => {
                self.error
                    .get_or_insert_with(|| RegistryError::ConflictingType(self.name.clone()));
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> Option<&IndexMap<String, FieldDescriptor>> {
        match &self.kind {
            TypeKind::Object { fields, .. } | TypeKind::Interface { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar(_) | TypeKind::Enum { .. })
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Object { .. } | TypeKind::Interface { .. } | TypeKind::Union { .. }
        )
    }

    pub fn is_input(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Scalar(_) | TypeKind::Enum { .. } | TypeKind::InputObject { .. }
        )
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Interface { .. } | TypeKind::Union { .. })
    }

    /// Structural equality ignoring resolvers and descriptions. Registering a
    /// type twice is allowed as long as both shapes agree.
    pub(crate) fn same_shape(&self, other: &TypeDescriptor) -> bool {
        let same_fields = |a: &IndexMap<String, FieldDescriptor>,
                           b: &IndexMap<String, FieldDescriptor>| {
            a.len() == b.len() && a.values().zip(b.values()).all(|(x, y)| x.same_shape(y))
        };
        match (&self.kind, &other.kind) {
            (TypeKind::Scalar(_), TypeKind::Scalar(_)) => true,
            (
                TypeKind::Object {
                    fields: a,
                    interfaces: ia,
                },
                TypeKind::Object {
                    fields: b,
                    interfaces: ib,
                },
            ) => ia == ib && same_fields(a, b),
            (TypeKind::Interface { fields: a }, TypeKind::Interface { fields: b }) => {
                same_fields(a, b)
            }
            (TypeKind::Union { members: a }, TypeKind::Union { members: b }) => a == b,
            (TypeKind::Enum { values: a }, TypeKind::Enum { values: b }) => a == b,
            (TypeKind::InputObject { fields: a }, TypeKind::InputObject { fields: b }) => a == b,
            _ => false,
        }
    }
}

type ScalarFn = Arc<dyn Fn(&Value) -> Result<Value, ScalarError> + Send + Sync>;

/// Serialization hooks for a scalar type, erased over the JSON wire form.
///
/// `serialize` validates a value produced by a resolver before it is written
/// to the response; `parse_value` coerces client input into the canonical
/// external representation handed to resolvers.
#[derive(Clone)]
pub struct ScalarType {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    serialize: ScalarFn,
    parse_value: ScalarFn,
}

impl ScalarType {
    pub fn new<S, P>(name: impl Into<String>, serialize: S, parse_value: P) -> Self
    where
        S: Fn(&Value) -> Result<Value, ScalarError> + Send + Sync + 'static,
        P: Fn(&Value) -> Result<Value, ScalarError> + Send + Sync + 'static,
    {
        ScalarType {
            name: name.into(),
            description: None,
            serialize: Arc::new(serialize),
            parse_value: Arc::new(parse_value),
        }
    }

    /// Builds the hooks for a Rust type implementing [`CustomScalar`].
    pub fn of<T: CustomScalar>() -> Self {
        let round_trip = |value: &Value| T::parse_value(value)?.serialize();
        let mut scalar = ScalarType::new(T::NAME, round_trip, round_trip);
        scalar.description = T::DESCRIPTION.map(str::to_string);
        scalar
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        (self.serialize)(value)
    }

    pub fn parse_value(&self, value: &Value) -> Result<Value, ScalarError> {
        (self.parse_value)(value)
    }

    pub(crate) fn builtins() -> Vec<ScalarType> {
        vec![
            ScalarType::new("Int", coerce_int, coerce_int),
            ScalarType::new("Float", coerce_float, coerce_float),
            ScalarType::new("String", coerce_string, coerce_string),
            ScalarType::new("Boolean", coerce_boolean, coerce_boolean),
            ScalarType::new("ID", coerce_id, coerce_id),
        ]
    }
}

impl fmt::Debug for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarType").field("name", &self.name).finish()
    }
}

pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// A Rust type exposed as a GraphQL scalar.
pub trait CustomScalar: Sized + Send + Sync + 'static {
    const NAME: &'static str;
    const DESCRIPTION: Option<&'static str> = None;

    fn serialize(&self) -> Result<Value, ScalarError>;

    fn parse_value(value: &Value) -> Result<Self, ScalarError>;
}

fn coerce_int(value: &Value) -> Result<Value, ScalarError> {
    match value.as_i64() {
        Some(n) if i32::try_from(n).is_ok() => Ok(Value::from(n)),
        Some(n) => Err(ScalarError(format!("Int cannot represent {n}"))),
        None => match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= f64::from(i32::MAX) => {
                Ok(Value::from(f as i64))
            }
            _ => Err(ScalarError(format!("Int cannot represent {value}"))),
        },
    }
}

fn coerce_float(value: &Value) -> Result<Value, ScalarError> {
    value
        .as_f64()
        .map(Value::from)
        .ok_or_else(|| ScalarError(format!("Float cannot represent {value}")))
}

fn coerce_string(value: &Value) -> Result<Value, ScalarError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        other => Err(ScalarError(format!("String cannot represent {other}"))),
    }
}

fn coerce_boolean(value: &Value) -> Result<Value, ScalarError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        other => Err(ScalarError(format!("Boolean cannot represent {other}"))),
    }
}

fn coerce_id(value: &Value) -> Result<Value, ScalarError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
        other => Err(ScalarError(format!("ID cannot represent {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_wrapped_type_references() {
        let ty: TypeRef = "[Widget!]!".parse().unwrap();
        assert_eq!(
            ty,
            TypeRef::named("Widget").non_null().list().non_null()
        );
        assert_eq!(ty.to_string(), "[Widget!]!");
        assert_eq!(ty.named_type(), "Widget");
        assert!(ty.is_list());
    }

    #[test]
    fn rejects_malformed_type_references() {
        for source in ["", "Int!!", "[Int", "1Int", "[Int]]"] {
            assert!(source.parse::<TypeRef>().is_err(), "{source} should fail");
        }
    }

    #[test]
    fn variable_types_fit_argument_positions() {
        let int: TypeRef = "Int".parse().unwrap();
        let int_nn: TypeRef = "Int!".parse().unwrap();
        assert!(int_nn.fits(&int, false));
        assert!(!int.fits(&int_nn, false));
        assert!(int.fits(&int_nn, true));
        assert!(!int.fits(&"String".parse().unwrap(), false));
        assert!(!int.fits(&"[Int]".parse().unwrap(), false));
    }

    #[test]
    fn builder_defers_type_errors() {
        let field = FieldDescriptor::new("broken", "[Int");
        assert_eq!(
            field.error,
            Some(RegistryError::InvalidTypeRef("[Int".to_string()))
        );
    }

    #[test]
    fn builtin_int_rejects_out_of_range() {
        let int = &ScalarType::builtins()[0];
        assert_eq!(int.parse_value(&json!(42)).unwrap(), json!(42));
        assert!(int.parse_value(&json!(1_i64 << 40)).is_err());
        assert!(int.parse_value(&json!("42")).is_err());
    }
}
