use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use graphql_parser::query::{
    self as ast, Definition, Document, FragmentDefinition, OperationDefinition, TypeCondition,
    parse_query,
};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::coercion::coerce_input;
use crate::config::QueryLimits;
use crate::error::{Location, PlanError};
use crate::limits::{self, PlanCost};
use crate::schema_registry::SchemaRegistry;
use crate::types::{OperationMode, TypeKind, TypeRef};

/// An argument or directive value as written in the request, variables
/// still unbound.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    Variable(String),
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    List(Vec<InputValue>),
    Object(IndexMap<String, InputValue>),
}

impl InputValue {
    fn from_ast(value: &ast::Value<'_, String>) -> Self {
        match value {
            ast::Value::Variable(name) => InputValue::Variable(name.clone()),
            ast::Value::Null => InputValue::Null,
            ast::Value::Boolean(b) => InputValue::Boolean(*b),
            ast::Value::Int(n) => n
                .as_i64()
                .map(InputValue::Int)
                .unwrap_or(InputValue::Null),
            ast::Value::Float(f) => InputValue::Float(*f),
            ast::Value::String(s) => InputValue::String(s.clone()),
            ast::Value::Enum(e) => InputValue::Enum(e.clone()),
            ast::Value::List(items) => InputValue::List(items.iter().map(Self::from_ast).collect()),
            ast::Value::Object(fields) => InputValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_ast(v)))
                    .collect(),
            ),
        }
    }

    /// Substitutes variables. A top-level variable without a value yields
    /// `None` so the caller can fall back to the declared default; nested
    /// ones become null or are left out of objects.
    pub fn bind(&self, variables: &Map<String, Value>) -> Option<Value> {
        Some(match self {
            InputValue::Variable(name) => return variables.get(name).cloned(),
            InputValue::Null => Value::Null,
            InputValue::Boolean(b) => Value::Bool(*b),
            InputValue::Int(n) => Value::from(*n),
            InputValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            InputValue::String(s) | InputValue::Enum(s) => Value::String(s.clone()),
            InputValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.bind(variables).unwrap_or(Value::Null))
                    .collect(),
            ),
            InputValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .filter_map(|(k, v)| v.bind(variables).map(|v| (k.clone(), v)))
                    .collect(),
            ),
        })
    }
}

/// A `@skip(if:)` or `@include(if:)` directive.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Skip(InputValue),
    Include(InputValue),
}

impl Condition {
    fn passes(&self, variables: &Map<String, Value>) -> bool {
        match self {
            Condition::Skip(v) => v.bind(variables) != Some(Value::Bool(true)),
            Condition::Include(v) => v.bind(variables) == Some(Value::Bool(true)),
        }
    }
}

pub(crate) fn included(conditions: &[Condition], variables: &Map<String, Value>) -> bool {
    conditions.iter().all(|c| c.passes(variables))
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedField {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, InputValue)>,
    /// Declared type of the field on its parent.
    pub ty: TypeRef,
    pub complexity: u64,
    pub selection_set: Vec<Selection>,
    pub location: Location,
    pub conditions: Vec<Condition>,
}

impl PlannedField {
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An inline fragment or an expanded fragment spread.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedFragment {
    pub type_condition: Option<String>,
    /// Shared by every spread of the same named fragment.
    pub selection_set: Arc<[Selection]>,
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Field(PlannedField),
    Fragment(PlannedFragment),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Value>,
}

/// A validated operation, ready to execute against the registry version it
/// was built for.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestPlan {
    pub mode: OperationMode,
    pub operation_name: Option<String>,
    pub variables: Vec<VariableDeclaration>,
    pub selection_set: Vec<Selection>,
    pub cost: PlanCost,
    pub schema_version: u64,
}

impl RequestPlan {
    /// Coerces caller-supplied variable values against the declarations,
    /// applying defaults.
    pub fn coerce_variables(
        &self,
        schema: &SchemaRegistry,
        values: &Map<String, Value>,
    ) -> Result<Map<String, Value>, PlanError> {
        let mut coerced = Map::new();
        for declaration in &self.variables {
            let mismatch = |reason: String| PlanError::VariableMismatch {
                name: declaration.name.clone(),
                reason,
            };
            match (values.get(&declaration.name), &declaration.default) {
                (Some(value), _) => {
                    let value = coerce_input(schema, &declaration.ty, value).map_err(mismatch)?;
                    coerced.insert(declaration.name.clone(), value);
                }
                (None, Some(default)) => {
                    coerced.insert(declaration.name.clone(), default.clone());
                }
                (None, None) if declaration.ty.is_non_null() => {
                    return Err(mismatch(format!(
                        "of required type `{}` was not provided",
                        declaration.ty
                    )));
                }
                (None, None) => {}
            }
        }
        Ok(coerced)
    }

    /// Root fields after fragment flattening, ignoring directives.
    fn root_field_count(&self) -> usize {
        fn count(selection_set: &[Selection]) -> usize {
            selection_set
                .iter()
                .map(|s| match s {
                    Selection::Field(_) => 1,
                    Selection::Fragment(f) => count(&f.selection_set),
                })
                .sum()
        }
        count(&self.selection_set)
    }
}

#[async_trait]
pub trait QueryPlanner {
    async fn plan_query(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<RequestPlan, PlanError>;

    /// Version of the registry plans are currently built against.
    fn schema_version(&self) -> u64;
}

/// Plans requests against a frozen [`SchemaRegistry`].
pub struct SchemaQueryPlanner {
    schema: Arc<SchemaRegistry>,
    limits: QueryLimits,
}

impl SchemaQueryPlanner {
    pub fn new(schema: Arc<SchemaRegistry>, limits: QueryLimits) -> Self {
        SchemaQueryPlanner { schema, limits }
    }

    pub fn plan(&self, query: &str, operation_name: Option<&str>) -> Result<RequestPlan, PlanError> {
        let document = parse_query::<String>(query).map_err(|e| {
            let message = e.to_string();
            PlanError::Syntax {
                location: syntax_location(&message),
                message,
            }
        })?;
        let operation = select_operation(&document, operation_name)?;
        let (mode, name, variable_definitions, selection_set) = match operation {
            OperationDefinition::SelectionSet(set) => (OperationMode::Query, None, &[][..], set),
            OperationDefinition::Query(q) => (
                OperationMode::Query,
                q.name.clone(),
                &q.variable_definitions[..],
                &q.selection_set,
            ),
            OperationDefinition::Mutation(m) => (
                OperationMode::Mutation,
                m.name.clone(),
                &m.variable_definitions[..],
                &m.selection_set,
            ),
            OperationDefinition::Subscription(s) => (
                OperationMode::Subscription,
                s.name.clone(),
                &s.variable_definitions[..],
                &s.selection_set,
            ),
        };
        if !self.schema.has_root(mode) {
            return Err(PlanError::UnsupportedOperation(mode));
        }

        let variables = variable_definitions
            .iter()
            .map(|definition| self.declare_variable(definition))
            .collect::<Result<Vec<_>, _>>()?;

        let fragments = document
            .definitions
            .iter()
            .filter_map(|d| match d {
                Definition::Fragment(f) => Some((f.name.as_str(), f)),
                Definition::Operation(_) => None,
            })
            .collect();
        let mut builder = PlanBuilder {
            schema: &self.schema,
            fragments,
            variables: &variables,
            fragment_stack: Vec::new(),
            planned_fragments: HashMap::new(),
        };
        let selection_set = builder.selection_set(mode.root_type(), selection_set)?;

        let cost = limits::measure(&selection_set, limits::assumed_list_size(&self.limits));
        let plan = RequestPlan {
            mode,
            operation_name: name,
            variables,
            selection_set,
            cost,
            schema_version: self.schema.version(),
        };
        if mode == OperationMode::Subscription && plan.root_field_count() != 1 {
            return Err(PlanError::SubscriptionRootFields);
        }
        limits::check(&plan.cost, &self.limits)?;

        tracing::debug!(
            %mode,
            operation = plan.operation_name.as_deref().unwrap_or(""),
            depth = plan.cost.depth,
            complexity = plan.cost.complexity,
            "planned request"
        );
        Ok(plan)
    }

    fn declare_variable(
        &self,
        definition: &ast::VariableDefinition<'_, String>,
    ) -> Result<VariableDeclaration, PlanError> {
        let ty = TypeRef::from_ast(&definition.var_type);
        match self.schema.type_of(ty.named_type()) {
            None => {
                return Err(PlanError::UnknownType {
                    name: ty.named_type().to_string(),
                    location: definition.position.into(),
                });
            }
            Some(t) if !t.is_input() => {
                return Err(PlanError::VariableMismatch {
                    name: definition.name.clone(),
                    reason: format!("has non-input type `{ty}`"),
                });
            }
            Some(_) => {}
        }
        let default = match &definition.default_value {
            Some(value) => {
                let raw = InputValue::from_ast(value)
                    .bind(&Map::new())
                    .unwrap_or(Value::Null);
                Some(coerce_input(&self.schema, &ty, &raw).map_err(|reason| {
                    PlanError::VariableMismatch {
                        name: definition.name.clone(),
                        reason: format!("has an invalid default value: {reason}"),
                    }
                })?)
            }
            None => None,
        };
        Ok(VariableDeclaration {
            name: definition.name.clone(),
            ty,
            default,
        })
    }
}

#[async_trait]
impl QueryPlanner for SchemaQueryPlanner {
    async fn plan_query(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<RequestPlan, PlanError> {
        self.plan(query, operation_name)
    }

    fn schema_version(&self) -> u64 {
        self.schema.version()
    }
}

fn select_operation<'d, 'q>(
    document: &'d Document<'q, String>,
    operation_name: Option<&str>,
) -> Result<&'d OperationDefinition<'q, String>, PlanError> {
    let mut operations = document.definitions.iter().filter_map(|d| match d {
        Definition::Operation(op) => Some(op),
        Definition::Fragment(_) => None,
    });
    match operation_name {
        Some(wanted) => operations
            .find(|op| operation_name_of(op) == Some(wanted))
            .ok_or_else(|| PlanError::OperationNotFound(wanted.to_string())),
        None => {
            let first = operations.next().ok_or(PlanError::NoOperation)?;
            match operations.next() {
                Some(_) => Err(PlanError::OperationNameRequired),
                None => Ok(first),
            }
        }
    }
}

fn operation_name_of<'d>(operation: &'d OperationDefinition<'_, String>) -> Option<&'d str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

/// Pulls the first `line:column` pair out of a parser message.
fn syntax_location(message: &str) -> Option<Location> {
    message.split_whitespace().find_map(|word| {
        let (line, column) = word.trim_end_matches([',', '.']).split_once(':')?;
        Some(Location {
            line: line.parse().ok()?,
            column: column.parse().ok()?,
        })
    })
}

struct PlanBuilder<'a, 'd, 'q> {
    schema: &'a SchemaRegistry,
    fragments: HashMap<&'d str, &'d FragmentDefinition<'q, String>>,
    variables: &'a [VariableDeclaration],
    fragment_stack: Vec<String>,
    planned_fragments: HashMap<&'d str, Arc<[Selection]>>,
}

impl<'d, 'q> PlanBuilder<'_, 'd, 'q> {
    fn selection_set(
        &mut self,
        parent_type: &str,
        set: &'d ast::SelectionSet<'q, String>,
    ) -> Result<Vec<Selection>, PlanError> {
        let mut planned = Vec::with_capacity(set.items.len());
        for item in &set.items {
            match item {
                ast::Selection::Field(field) => {
                    planned.push(Selection::Field(self.field(parent_type, field)?));
                }
                ast::Selection::InlineFragment(fragment) => {
                    let location = fragment.position.into();
                    let type_condition = match &fragment.type_condition {
                        Some(TypeCondition::On(name)) => {
                            self.fragment_type(name, parent_type, location)?;
                            Some(name.clone())
                        }
                        None => None,
                    };
                    let scope = type_condition.as_deref().unwrap_or(parent_type);
                    let selection_set = self.selection_set(scope, &fragment.selection_set)?;
                    planned.push(Selection::Fragment(PlannedFragment {
                        type_condition,
                        selection_set: selection_set.into(),
                        conditions: self.conditions(&fragment.directives)?,
                    }));
                }
                ast::Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let definition = *self.fragments.get(name).ok_or_else(|| {
                        PlanError::UnknownFragment {
                            name: name.to_string(),
                            location: spread.position.into(),
                        }
                    })?;
                    if let Some(start) = self.fragment_stack.iter().position(|f| f == name) {
                        let mut cycle = self.fragment_stack[start..].to_vec();
                        cycle.push(name.to_string());
                        return Err(PlanError::FragmentCycle { cycle });
                    }
                    let TypeCondition::On(type_name) = &definition.type_condition;
                    self.fragment_type(type_name, parent_type, spread.position.into())?;

                    let selection_set = match self.planned_fragments.get(name) {
                        Some(shared) => shared.clone(),
                        None => {
                            self.fragment_stack.push(name.to_string());
                            let built = self.selection_set(type_name, &definition.selection_set);
                            self.fragment_stack.pop();
                            let shared: Arc<[Selection]> = built?.into();
                            self.planned_fragments.insert(name, shared.clone());
                            shared
                        }
                    };
                    planned.push(Selection::Fragment(PlannedFragment {
                        type_condition: Some(type_name.clone()),
                        selection_set,
                        conditions: self.conditions(&spread.directives)?,
                    }));
                }
            }
        }
        Ok(planned)
    }

    /// A fragment's type condition must name a composite type that can
    /// overlap the type it is spread into.
    fn fragment_type(
        &self,
        condition: &str,
        parent_type: &str,
        location: Location,
    ) -> Result<(), PlanError> {
        match self.schema.type_of(condition) {
            Some(t) if t.is_composite() => {}
            _ => {
                return Err(PlanError::UnknownType {
                    name: condition.to_string(),
                    location,
                });
            }
        }
        if self.schema.types_overlap(condition, parent_type) {
            Ok(())
        } else {
            Err(PlanError::ImpossibleFragment {
                condition: condition.to_string(),
                parent: parent_type.to_string(),
                location,
            })
        }
    }

    fn field(
        &mut self,
        parent_type: &str,
        field: &'d ast::Field<'q, String>,
    ) -> Result<PlannedField, PlanError> {
        let schema = self.schema;
        let location: Location = field.position.into();
        let conditions = self.conditions(&field.directives)?;

        if field.name == "__typename" {
            if !field.selection_set.items.is_empty() {
                return Err(PlanError::LeafSelection {
                    field: field.name.clone(),
                    ty: "String!".to_string(),
                    location,
                });
            }
            return Ok(PlannedField {
                name: field.name.clone(),
                alias: field.alias.clone(),
                arguments: Vec::new(),
                ty: TypeRef::named("String").non_null(),
                complexity: 0,
                selection_set: Vec::new(),
                location,
                conditions,
            });
        }

        let descriptor =
            schema
                .field_of(parent_type, &field.name)
                .ok_or_else(|| PlanError::UnknownField {
                    parent: parent_type.to_string(),
                    field: field.name.clone(),
                    location,
                })?;

        let mut arguments = Vec::with_capacity(field.arguments.len());
        for (name, value) in &field.arguments {
            let param =
                descriptor
                    .param_named(name)
                    .ok_or_else(|| PlanError::UnknownArgument {
                        parent: parent_type.to_string(),
                        field: field.name.clone(),
                        argument: name.clone(),
                        location,
                    })?;
            self.check_variables(value, &param.ty, param.default.is_some())?;
            arguments.push((name.clone(), InputValue::from_ast(value)));
        }

        let ty = descriptor.ty().clone();
        let named = ty.named_type();
        let is_leaf = schema.type_of(named).is_some_and(|t| t.is_leaf());
        let selection_set = match (is_leaf, field.selection_set.items.is_empty()) {
            (true, false) => {
                return Err(PlanError::LeafSelection {
                    field: field.name.clone(),
                    ty: ty.to_string(),
                    location,
                });
            }
            (false, true) => {
                return Err(PlanError::MissingSelection {
                    field: field.name.clone(),
                    ty: ty.to_string(),
                    location,
                });
            }
            (true, true) => Vec::new(),
            (false, false) => self.selection_set(named, &field.selection_set)?,
        };

        Ok(PlannedField {
            name: field.name.clone(),
            alias: field.alias.clone(),
            arguments,
            ty,
            complexity: descriptor.complexity,
            selection_set,
            location,
            conditions,
        })
    }

    fn conditions(
        &self,
        directives: &[ast::Directive<'q, String>],
    ) -> Result<Vec<Condition>, PlanError> {
        let boolean = TypeRef::named("Boolean").non_null();
        let mut conditions = Vec::new();
        for directive in directives {
            let Some((_, value)) = directive.arguments.iter().find(|(name, _)| name == "if") else {
                continue;
            };
            self.check_variables(value, &boolean, false)?;
            let value = InputValue::from_ast(value);
            match directive.name.as_str() {
                "skip" => conditions.push(Condition::Skip(value)),
                "include" => conditions.push(Condition::Include(value)),
                other => tracing::debug!(directive = other, "ignoring unknown directive"),
            }
        }
        Ok(conditions)
    }

    /// Checks every variable used inside `value` is declared with a type
    /// that fits the position it is used in.
    fn check_variables(
        &self,
        value: &ast::Value<'q, String>,
        expected: &TypeRef,
        has_default: bool,
    ) -> Result<(), PlanError> {
        match value {
            ast::Value::Variable(name) => {
                let declaration = self
                    .variables
                    .iter()
                    .find(|v| &v.name == name)
                    .ok_or_else(|| PlanError::VariableMismatch {
                        name: name.clone(),
                        reason: "is not declared".to_string(),
                    })?;
                if !declaration
                    .ty
                    .fits(expected, has_default || declaration.default.is_some())
                {
                    return Err(PlanError::VariableMismatch {
                        name: name.clone(),
                        reason: format!(
                            "of type `{}` cannot be used where `{expected}` is expected",
                            declaration.ty
                        ),
                    });
                }
                Ok(())
            }
            ast::Value::List(items) => {
                let item_type = match expected.nullable() {
                    TypeRef::List(inner) => inner.as_ref(),
                    other => other,
                };
                items
                    .iter()
                    .try_for_each(|item| self.check_variables(item, item_type, false))
            }
            ast::Value::Object(fields) => {
                let Some(TypeKind::InputObject { fields: declared }) =
                    self.schema.type_of(expected.named_type()).map(|t| t.kind())
                else {
                    return Ok(());
                };
                for (name, value) in fields {
                    if let Some(param) = declared.get(name) {
                        self.check_variables(value, &param.ty, param.default.is_some())?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LimitKind;
    use crate::resolver::sync_resolver;
    use crate::types::{FieldDescriptor, TypeDescriptor};
    use crate::value::Resolved;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Arc<SchemaRegistry> {
        let noop = || sync_resolver(|_| Ok(Resolved::Null));
        let mut schema = SchemaRegistry::new();
        schema
            .register_type(
                TypeDescriptor::object("Widget")
                    .field(FieldDescriptor::new("id", "Int!"))
                    .field(FieldDescriptor::new("name", "String!"))
                    .field(FieldDescriptor::new("parts", "[Widget!]!")),
            )
            .unwrap();
        schema
            .register_type(TypeDescriptor::object("Product").field(FieldDescriptor::new("id", "Int!")))
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("widget", "Widget").param("id", "Int!"),
                noop(),
            )
            .unwrap();
        schema
            .register_query(
                FieldDescriptor::new("widgets", "[Widget!]!").param_with_default(
                    "limit",
                    "Int",
                    json!(10),
                ),
                noop(),
            )
            .unwrap();
        schema.finalize().unwrap();
        Arc::new(schema)
    }

    fn plan(query: &str) -> Result<RequestPlan, PlanError> {
        SchemaQueryPlanner::new(schema(), QueryLimits::unbounded()).plan(query, None)
    }

    #[test]
    fn plans_fields_with_arguments_and_aliases() {
        let plan = plan("{ first: widget(id: 1) { id name } }").unwrap();
        assert_eq!(plan.mode, OperationMode::Query);
        let Selection::Field(field) = &plan.selection_set[0] else {
            panic!("expected field")
        };
        assert_eq!(field.response_key(), "first");
        assert_eq!(field.arguments, vec![("id".to_string(), InputValue::Int(1))]);
        assert_eq!(field.selection_set.len(), 2);
        assert_eq!(plan.cost.aliases, 1);
    }

    #[test]
    fn reports_syntax_errors_with_location() {
        let err = plan("{ widget(id: 1) { id }").unwrap_err();
        let PlanError::Syntax { location, .. } = err else {
            panic!("expected a syntax error, got {err:?}")
        };
        assert!(location.is_some());
    }

    #[test]
    fn rejects_unknown_fields_and_arguments() {
        assert!(matches!(
            plan("{ widget(id: 1) { color } }"),
            Err(PlanError::UnknownField { ref field, .. }) if field == "color"
        ));
        assert!(matches!(
            plan("{ widget(id: 1, size: 2) { id } }"),
            Err(PlanError::UnknownArgument { ref argument, .. }) if argument == "size"
        ));
    }

    #[test]
    fn checks_selection_shapes() {
        assert!(matches!(
            plan("{ widget(id: 1) { id { x } } }"),
            Err(PlanError::LeafSelection { .. })
        ));
        assert!(matches!(
            plan("{ widget(id: 1) }"),
            Err(PlanError::MissingSelection { .. })
        ));
    }

    #[test]
    fn detects_fragment_cycles() {
        let err = plan(
            "query { widgets { ...A } }
             fragment A on Widget { parts { ...B } }
             fragment B on Widget { parts { ...A } }",
        )
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::FragmentCycle {
                cycle: vec!["A".into(), "B".into(), "A".into()]
            }
        );
        assert!(matches!(
            plan("{ widgets { ...Missing } }"),
            Err(PlanError::UnknownFragment { .. })
        ));
        assert!(matches!(
            plan("{ widgets { ... on Gadget { id } } }"),
            Err(PlanError::UnknownType { .. })
        ));
    }

    #[test]
    fn validates_variable_usage() {
        assert!(matches!(
            plan("{ widget(id: $id) { id } }"),
            Err(PlanError::VariableMismatch { ref reason, .. }) if reason == "is not declared"
        ));
        assert!(matches!(
            plan("query ($id: String!) { widget(id: $id) { id } }"),
            Err(PlanError::VariableMismatch { .. })
        ));
        assert!(plan("query ($id: Int!) { widget(id: $id) { id } }").is_ok());
        assert!(plan("query ($n: Int) { widgets(limit: $n) { id } }").is_ok());
    }

    #[test]
    fn coerces_variable_values() {
        let plan = plan("query ($id: Int!, $n: Int = 3) { widget(id: $id) { id } widgets(limit: $n) { id } }")
            .unwrap();
        let schema = schema();
        let vars = plan
            .coerce_variables(&schema, json!({"id": 7}).as_object().unwrap())
            .unwrap();
        assert_eq!(Value::Object(vars), json!({"id": 7, "n": 3}));

        let err = plan.coerce_variables(&schema, &Map::new()).unwrap_err();
        assert!(matches!(err, PlanError::VariableMismatch { ref name, .. } if name == "id"));

        let err = plan
            .coerce_variables(&schema, json!({"id": "seven"}).as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, PlanError::VariableMismatch { .. }));
    }

    #[test]
    fn selects_operations_by_name() {
        let doc = "query A { widgets { id } } query B { widgets { name } }";
        let planner = SchemaQueryPlanner::new(schema(), QueryLimits::unbounded());
        assert_eq!(planner.plan(doc, None), Err(PlanError::OperationNameRequired));
        assert_eq!(
            planner.plan(doc, Some("C")),
            Err(PlanError::OperationNotFound("C".into()))
        );
        assert_eq!(
            planner.plan(doc, Some("B")).unwrap().operation_name.as_deref(),
            Some("B")
        );
        assert_eq!(
            planner.plan("mutation { widgets { id } }", None),
            Err(PlanError::UnsupportedOperation(OperationMode::Mutation))
        );
    }

    fn plan_with(limits: QueryLimits, query: &str) -> Result<RequestPlan, PlanError> {
        SchemaQueryPlanner::new(schema(), limits).plan(query, None)
    }

    #[test]
    fn enforces_limits_before_execution() {
        let limits = QueryLimits {
            max_depth: 2,
            ..QueryLimits::unbounded()
        };
        assert_eq!(
            plan_with(limits, "{ widgets { parts { parts { id } } } }"),
            Err(PlanError::QueryTooComplex {
                limit: LimitKind::Depth,
                measured: 4,
                max: 2
            })
        );
    }

    #[test]
    fn rejects_wide_selection_sets() {
        let limits = QueryLimits {
            max_fields: 2,
            ..QueryLimits::unbounded()
        };
        assert_eq!(
            plan_with(limits, "{ widget(id: 1) { id name parts { id } } }"),
            Err(PlanError::QueryTooComplex {
                limit: LimitKind::Fields,
                measured: 3,
                max: 2
            })
        );
        assert!(plan_with(limits, "{ widget(id: 1) { id parts { id name } } }").is_ok());
    }

    #[test]
    fn counts_aliases_through_every_fragment_spread() {
        let limits = QueryLimits {
            max_aliases: 4,
            ..QueryLimits::unbounded()
        };
        let query = "{ widget(id: 1) { ...A } }
             fragment A on Widget { a: id ...B ...B }
             fragment B on Widget { b: id c: name }";
        assert_eq!(
            plan_with(limits, query),
            Err(PlanError::QueryTooComplex {
                limit: LimitKind::Aliases,
                measured: 5,
                max: 4
            })
        );
    }

    #[test]
    fn rejects_expensive_list_nesting() {
        let limits = QueryLimits {
            max_complexity: 100,
            ..QueryLimits::unbounded()
        };
        // widgets: 1 + 10 * (parts: 1 + 10 * id)
        assert_eq!(
            plan_with(limits, "{ widgets { parts { id } } }"),
            Err(PlanError::QueryTooComplex {
                limit: LimitKind::Complexity,
                measured: 111,
                max: 100
            })
        );
        assert_eq!(
            plan_with(limits, "{ widgets { id } }").unwrap().cost.complexity,
            11
        );
    }

    #[test]
    fn doubling_fragment_chains_are_rejected_quickly() {
        const LEVELS: usize = 40;
        let mut query = String::from("{ widget(id: 1) { ...F0 } }\n");
        for i in 0..LEVELS {
            query.push_str(&format!("fragment F{i} on Widget {{ ...F{n} ...F{n} }}\n", n = i + 1));
        }
        query.push_str(&format!("fragment F{LEVELS} on Widget {{ id }}\n"));

        let limits = QueryLimits {
            max_fields: 100,
            max_complexity: 1000,
            ..QueryLimits::unbounded()
        };
        let started = std::time::Instant::now();
        let err = plan_with(limits, &query).unwrap_err();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(
            err,
            PlanError::QueryTooComplex {
                limit: LimitKind::Fields,
                measured: u64::from(u32::MAX),
                max: 100
            }
        );
    }

    #[test]
    fn rejects_fragments_that_can_never_apply() {
        assert!(matches!(
            plan("{ widget(id: 1) { ... on Product { id } } }"),
            Err(PlanError::ImpossibleFragment { ref condition, ref parent, .. })
                if condition == "Product" && parent == "Widget"
        ));
        assert!(matches!(
            plan("{ widget(id: 1) { ...P } } fragment P on Product { id }"),
            Err(PlanError::ImpossibleFragment { .. })
        ));
        assert!(plan("{ widget(id: 1) { ... on Widget { id } } }").is_ok());
    }

    #[test]
    fn extracts_locations_from_parser_messages() {
        assert_eq!(
            syntax_location("query parse error: Parse error at 3:14\nUnexpected `}`"),
            Some(Location {
                line: 3,
                column: 14
            })
        );
        assert_eq!(syntax_location("no position"), None);
    }
}
