use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::OperationMode;

/// Line/column position inside a request document, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl From<graphql_parser::Pos> for Location {
    fn from(pos: graphql_parser::Pos) -> Self {
        Location {
            line: pos.line,
            column: pos.column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Failures while building or freezing the schema. All of these are fatal to startup.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("{mode} `{name}` is already registered")]
    DuplicateName { mode: OperationMode, name: String },
    #[error("type `{0}` is already registered with a different shape")]
    ConflictingType(String),
    #[error("no {mode} named `{name}` is registered")]
    NotFound { mode: OperationMode, name: String },
    #[error("schema registry is frozen, cannot register `{0}`")]
    RegistryFrozen(String),
    #[error("invalid type reference `{0}`")]
    InvalidTypeRef(String),
    #[error("type `{referenced}` used by `{by}` is not registered")]
    UnknownType { referenced: String, by: String },
    #[error("`{variant}` is a variant of `{parent}` but is not a registered object type")]
    InvalidVariant { parent: String, variant: String },
    #[error("`{object}` implements `{interface}` but does not define field `{field}`")]
    MissingInterfaceField {
        object: String,
        interface: String,
        field: String,
    },
    #[error("type `{ty}` used by `{by}` must be an {expected} type")]
    WrongTypeKind {
        ty: String,
        by: String,
        expected: &'static str,
    },
    #[error("{mode} `{name}` was registered with the wrong kind of resolver")]
    ResolverMismatch { mode: OperationMode, name: String },
}

/// The static limit a request exceeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LimitKind {
    Depth,
    Fields,
    Aliases,
    Complexity,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitKind::Depth => "max_depth",
            LimitKind::Fields => "max_fields",
            LimitKind::Aliases => "max_aliases",
            LimitKind::Complexity => "max_complexity",
        };
        f.write_str(name)
    }
}

/// Request-fatal errors. They are produced before any resolver runs and are
/// cached alongside successful plans, hence `Clone`.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        location: Option<Location>,
    },
    #[error("unknown field `{field}` on type `{parent}`")]
    UnknownField {
        parent: String,
        field: String,
        location: Location,
    },
    #[error("unknown argument `{argument}` on field `{parent}.{field}`")]
    UnknownArgument {
        parent: String,
        field: String,
        argument: String,
        location: Location,
    },
    #[error("unknown type `{name}`")]
    UnknownType { name: String, location: Location },
    #[error("unknown fragment `{name}`")]
    UnknownFragment { name: String, location: Location },
    #[error("fragment on `{condition}` can never apply to `{parent}`")]
    ImpossibleFragment {
        condition: String,
        parent: String,
        location: Location,
    },
    #[error("fragment cycle detected: {}", .cycle.join(" -> "))]
    FragmentCycle { cycle: Vec<String> },
    #[error("variable `${name}` {reason}")]
    VariableMismatch { name: String, reason: String },
    #[error("query is too complex: {limit} exceeded (measured {measured}, allowed {max})")]
    QueryTooComplex {
        limit: LimitKind,
        measured: u64,
        max: u64,
    },
    #[error("unknown operation `{0}`")]
    OperationNotFound(String),
    #[error("document contains several operations, an operation name is required")]
    OperationNameRequired,
    #[error("document does not contain an operation")]
    NoOperation,
    #[error("schema does not define any {0} fields")]
    UnsupportedOperation(OperationMode),
    #[error("subscriptions must select exactly one root field")]
    SubscriptionRootFields,
    #[error("field `{field}` of leaf type `{ty}` cannot have a selection set")]
    LeafSelection {
        field: String,
        ty: String,
        location: Location,
    },
    #[error("field `{field}` of type `{ty}` must have a selection set")]
    MissingSelection {
        field: String,
        ty: String,
        location: Location,
    },
    #[error("plan was built for schema version {plan} but the registry is at version {current}")]
    StaleSchema { plan: u64, current: u64 },
}

impl PlanError {
    pub fn locations(&self) -> Vec<Location> {
        match self {
            PlanError::Syntax { location, .. } => location.iter().copied().collect(),
            PlanError::UnknownField { location, .. }
            | PlanError::UnknownArgument { location, .. }
            | PlanError::UnknownType { location, .. }
            | PlanError::UnknownFragment { location, .. }
            | PlanError::ImpossibleFragment { location, .. }
            | PlanError::LeafSelection { location, .. }
            | PlanError::MissingSelection { location, .. } => vec![*location],
            _ => Vec::new(),
        }
    }
}

/// Error returned by a resolver. Only the message reaches the response.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct ResolverError {
    message: String,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        ResolverError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ResolverError {
    fn from(message: String) -> Self {
        ResolverError { message }
    }
}

impl From<&str> for ResolverError {
    fn from(message: &str) -> Self {
        ResolverError::new(message)
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(err: serde_json::Error) -> Self {
        ResolverError::new(err.to_string())
    }
}

impl From<ScalarError> for ResolverError {
    fn from(err: ScalarError) -> Self {
        ResolverError::new(err.0)
    }
}

/// A custom scalar rejected a value.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ScalarError(pub String);

impl ScalarError {
    pub fn new(message: impl Into<String>) -> Self {
        ScalarError(message.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldErrorKind {
    Resolver,
    ArgumentBinding,
    Cancelled,
    Panic,
    NullViolation,
    TypeDiscovery,
    ArraySizeExceeded,
    Coercion,
}

/// One segment of a response path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A non-fatal error scoped to one node of the response tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    pub path: Vec<PathSegment>,
    #[serde(skip)]
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn new(
        kind: FieldErrorKind,
        message: impl Into<String>,
        path: Vec<PathSegment>,
        location: Location,
    ) -> Self {
        FieldError {
            message: message.into(),
            locations: vec![location],
            path,
            kind,
        }
    }
}

/// Failures of the engine entry points that cannot be expressed as a
/// regular response body.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("variables must be a JSON object: {0}")]
    InvalidVariables(String),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("operation is not a subscription")]
    NotASubscription,
    #[error("subscription could not be started: {0}")]
    Subscription(String),
    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
