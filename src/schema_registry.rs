use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::RegistryError;
use crate::introspection;
use crate::resolver::{Resolver, ResolverHandle, StreamResolver};
use crate::types::{
    BUILTIN_SCALARS, FieldDescriptor, OperationMode, Param, ScalarType, TypeDescriptor, TypeKind,
    TypeRef,
};
use crate::value::ObjectValue;

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// A root operation field together with the resolver that produces it.
#[derive(Clone)]
pub struct SchemaBinding {
    pub mode: OperationMode,
    pub field: FieldDescriptor,
    pub handle: ResolverHandle,
}

impl SchemaBinding {
    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub fn params(&self) -> &[Param] {
        self.field.params()
    }

    pub fn return_type(&self) -> &TypeRef {
        self.field.ty()
    }
}

/// Maps exposed names to resolver bindings and type descriptors.
///
/// Built once at startup, then frozen by [`SchemaRegistry::finalize`] and
/// shared read-only behind an `Arc` while serving.
pub struct SchemaRegistry {
    roots: [IndexMap<String, SchemaBinding>; 3],
    types: IndexMap<String, TypeDescriptor>,
    possible_types: HashMap<String, Vec<String>>,
    frozen: bool,
    introspection: bool,
    version: u64,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        for scalar in ScalarType::builtins() {
            types.insert(scalar.name.clone(), TypeDescriptor::scalar(scalar));
        }
        SchemaRegistry {
            roots: Default::default(),
            types,
            possible_types: HashMap::new(),
            frozen: false,
            introspection: false,
            version: 0,
        }
    }

    pub fn register(
        &mut self,
        mode: OperationMode,
        field: FieldDescriptor,
        handle: ResolverHandle,
    ) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::RegistryFrozen(field.name.clone()));
        }
        if let Some(err) = &field.error {
            return Err(err.clone());
        }
        let streaming = matches!(handle, ResolverHandle::Stream(_));
        if streaming != (mode == OperationMode::Subscription) {
            return Err(RegistryError::ResolverMismatch {
                mode,
                name: field.name.clone(),
            });
        }
        let bindings = &mut self.roots[mode.index()];
        if bindings.contains_key(&field.name) {
            return Err(RegistryError::DuplicateName {
                mode,
                name: field.name.clone(),
            });
        }
        tracing::debug!(%mode, name = %field.name, "registered root field");
        bindings.insert(
            field.name.clone(),
            SchemaBinding {
                mode,
                field,
                handle,
            },
        );
        Ok(())
    }

    pub fn register_query(
        &mut self,
        field: FieldDescriptor,
        resolver: Resolver,
    ) -> Result<(), RegistryError> {
        self.register(OperationMode::Query, field, ResolverHandle::Field(resolver))
    }

    pub fn register_mutation(
        &mut self,
        field: FieldDescriptor,
        resolver: Resolver,
    ) -> Result<(), RegistryError> {
        self.register(OperationMode::Mutation, field, ResolverHandle::Field(resolver))
    }

    pub fn register_subscription(
        &mut self,
        field: FieldDescriptor,
        resolver: StreamResolver,
    ) -> Result<(), RegistryError> {
        self.register(
            OperationMode::Subscription,
            field,
            ResolverHandle::Stream(resolver),
        )
    }

    /// Registers a named type. Registering the same shape twice is a no-op.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::RegistryFrozen(descriptor.name.clone()));
        }
        if let Some(err) = &descriptor.error {
            return Err(err.clone());
        }
        if OperationMode::ALL
            .iter()
            .any(|mode| mode.root_type() == descriptor.name)
        {
            return Err(RegistryError::ConflictingType(descriptor.name.clone()));
        }
        match self.types.get(&descriptor.name) {
            Some(existing) if existing.same_shape(&descriptor) => Ok(()),
            Some(_) => Err(RegistryError::ConflictingType(descriptor.name.clone())),
            None => {
                tracing::debug!(
                    name = %descriptor.name,
                    kind = descriptor.kind.introspection_name(),
                    "registered type"
                );
                self.types.insert(descriptor.name.clone(), descriptor);
                Ok(())
            }
        }
    }

    pub fn register_scalar(&mut self, scalar: ScalarType) -> Result<(), RegistryError> {
        self.register_type(TypeDescriptor::scalar(scalar))
    }

    pub fn lookup(&self, mode: OperationMode, name: &str) -> Result<&SchemaBinding, RegistryError> {
        self.roots[mode.index()]
            .get(name)
            .ok_or_else(|| RegistryError::NotFound {
                mode,
                name: name.to_string(),
            })
    }

    pub fn bindings(&self, mode: OperationMode) -> impl Iterator<Item = &SchemaBinding> {
        self.roots[mode.index()].values()
    }

    pub fn has_root(&self, mode: OperationMode) -> bool {
        !self.roots[mode.index()].is_empty()
    }

    /// Freezes the registry after checking that every referenced type exists
    /// and that abstract types only name registered object variants.
    pub fn finalize(&mut self) -> Result<(), RegistryError> {
        if self.frozen {
            return Ok(());
        }
        self.validate()?;

        let mut possible_types: HashMap<String, Vec<String>> = HashMap::new();
        for descriptor in self.types.values() {
            match &descriptor.kind {
                TypeKind::Union { members } => {
                    possible_types.insert(descriptor.name.clone(), members.clone());
                }
                TypeKind::Object { interfaces, .. } => {
                    for interface in interfaces {
                        possible_types
                            .entry(interface.clone())
                            .or_default()
                            .push(descriptor.name.clone());
                    }
                }
                _ => {}
            }
        }
        self.possible_types = possible_types;
        self.version = NEXT_VERSION.fetch_add(1, Ordering::Relaxed);
        self.frozen = true;

        tracing::info!(
            version = self.version,
            types = self.types.len(),
            queries = self.roots[0].len(),
            mutations = self.roots[1].len(),
            subscriptions = self.roots[2].len(),
            "schema registry finalized"
        );
        Ok(())
    }

    /// Adds the `__schema` and `__type` root fields with their supporting
    /// types, then freezes the registry.
    pub fn enable_introspection(&mut self) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::RegistryFrozen("__schema".to_string()));
        }
        introspection::install(self)?;
        self.introspection = true;
        self.finalize()
    }

    fn validate(&self) -> Result<(), RegistryError> {
        for mode in OperationMode::ALL {
            for binding in self.roots[mode.index()].values() {
                self.check_field(mode.root_type(), &binding.field)?;
            }
        }
        for descriptor in self.types.values() {
            let by = descriptor.name.as_str();
            match &descriptor.kind {
                TypeKind::Object { fields, interfaces } => {
                    for field in fields.values() {
                        self.check_field(by, field)?;
                    }
                    for interface in interfaces {
                        let Some(TypeKind::Interface {
                            fields: required, ..
                        }) = self.types.get(interface).map(|t| &t.kind)
                        else {
                            return Err(self.missing_or_wrong(interface, by, "interface"));
                        };
                        for name in required.keys() {
                            if !fields.contains_key(name) {
                                return Err(RegistryError::MissingInterfaceField {
                                    object: by.to_string(),
                                    interface: interface.clone(),
                                    field: name.clone(),
                                });
                            }
                        }
                    }
                }
                TypeKind::Interface { fields } => {
                    for field in fields.values() {
                        self.check_field(by, field)?;
                    }
                }
                TypeKind::Union { members } => {
                    for member in members {
                        if !matches!(
                            self.types.get(member).map(|t| &t.kind),
                            Some(TypeKind::Object { .. })
                        ) {
                            return Err(RegistryError::InvalidVariant {
                                parent: by.to_string(),
                                variant: member.clone(),
                            });
                        }
                    }
                }
                TypeKind::InputObject { fields } => {
                    for param in fields.values() {
                        self.check_input(by, &param.ty)?;
                    }
                }
                TypeKind::Scalar(_) | TypeKind::Enum { .. } => {}
            }
        }
        Ok(())
    }

    fn check_field(&self, parent: &str, field: &FieldDescriptor) -> Result<(), RegistryError> {
        let by = format!("{parent}.{}", field.name);
        let named = field.ty.named_type();
        match self.types.get(named) {
            None => {
                return Err(RegistryError::UnknownType {
                    referenced: named.to_string(),
                    by,
                });
            }
            Some(t) if matches!(t.kind, TypeKind::InputObject { .. }) => {
                return Err(RegistryError::WrongTypeKind {
                    ty: named.to_string(),
                    by,
                    expected: "output",
                });
            }
            Some(_) => {}
        }
        for param in &field.params {
            self.check_input(&format!("{by}({})", param.name), &param.ty)?;
        }
        Ok(())
    }

    fn check_input(&self, by: &str, ty: &TypeRef) -> Result<(), RegistryError> {
        match self.types.get(ty.named_type()) {
            Some(t) if t.is_input() => Ok(()),
            _ => Err(self.missing_or_wrong(ty.named_type(), by, "input")),
        }
    }

    fn missing_or_wrong(&self, name: &str, by: &str, expected: &'static str) -> RegistryError {
        if self.types.contains_key(name) {
            RegistryError::WrongTypeKind {
                ty: name.to_string(),
                by: by.to_string(),
                expected,
            }
        } else {
            RegistryError::UnknownType {
                referenced: name.to_string(),
                by: by.to_string(),
            }
        }
    }

    pub fn type_of(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Looks up a field on a named type, root operation types included.
    pub fn field_of(&self, parent_type: &str, name: &str) -> Option<&FieldDescriptor> {
        if let Some(mode) = OperationMode::ALL
            .into_iter()
            .find(|mode| mode.root_type() == parent_type)
        {
            return self.roots[mode.index()].get(name).map(|b| &b.field);
        }
        self.types.get(parent_type)?.fields()?.get(name)
    }

    pub fn possible_types(&self, abstract_type: &str) -> &[String] {
        self.possible_types
            .get(abstract_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_possible_type(&self, abstract_type: &str, concrete: &str) -> bool {
        abstract_type == concrete
            || self
                .possible_types(abstract_type)
                .iter()
                .any(|name| name == concrete)
    }

    /// Whether some object type can be both `a` and `b`.
    pub fn types_overlap(&self, a: &str, b: &str) -> bool {
        match self.possible_types(a) {
            [] => self.is_possible_type(b, a),
            members => a == b || members.iter().any(|m| self.is_possible_type(b, m)),
        }
    }

    /// Finds the concrete object type of `value` in a position declared as
    /// `declared`. Abstract positions require the value to name one of the
    /// registered variants, unless the abstract type has a single variant.
    pub fn discover(&self, declared: &str, value: &ObjectValue) -> Result<&TypeDescriptor, String> {
        let declared_type = self
            .types
            .get(declared)
            .ok_or_else(|| format!("type `{declared}` is not registered"))?;
        if !declared_type.is_abstract() {
            return Ok(declared_type);
        }
        let concrete = match value.discriminator() {
            Some(name) => name,
            None => match self.possible_types(declared) {
                [only] => only.as_str(),
                _ => {
                    return Err(format!(
                        "cannot determine the concrete type of `{declared}`: value carries no type discriminator"
                    ));
                }
            },
        };
        match self.types.get(concrete) {
            Some(t)
                if matches!(t.kind, TypeKind::Object { .. })
                    && self.is_possible_type(declared, concrete) =>
            {
                Ok(t)
            }
            _ => Err(format!(
                "`{concrete}` is not a possible type of `{declared}`"
            )),
        }
    }

    /// Version stamp assigned at finalize; zero while still mutable.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn introspection_enabled(&self) -> bool {
        self.introspection
    }

    /// Renders the registered types and root operation types as SDL.
    pub fn schema_definition(&self) -> String {
        let mut out = String::new();
        for descriptor in self.types.values() {
            if descriptor.name.starts_with("__")
                || BUILTIN_SCALARS.contains(&descriptor.name.as_str())
            {
                continue;
            }
            push_description(&mut out, descriptor.description.as_deref(), "");
            match &descriptor.kind {
                TypeKind::Scalar(_) => out.push_str(&format!("scalar {}\n\n", descriptor.name)),
                TypeKind::Object { fields, interfaces } => {
                    out.push_str(&format!("type {}", descriptor.name));
                    if !interfaces.is_empty() {
                        out.push_str(&format!(" implements {}", interfaces.join(" & ")));
                    }
                    push_fields(&mut out, fields.values());
                }
                TypeKind::Interface { fields } => {
                    out.push_str(&format!("interface {}", descriptor.name));
                    push_fields(&mut out, fields.values());
                }
                TypeKind::Union { members } => {
                    out.push_str(&format!(
                        "union {} = {}\n\n",
                        descriptor.name,
                        members.join(" | ")
                    ));
                }
                TypeKind::Enum { values } => {
                    out.push_str(&format!("enum {} {{\n", descriptor.name));
                    for value in values {
                        out.push_str(&format!("  {value}\n"));
                    }
                    out.push_str("}\n\n");
                }
                TypeKind::InputObject { fields } => {
                    out.push_str(&format!("input {} {{\n", descriptor.name));
                    for param in fields.values() {
                        out.push_str(&format!("  {}\n", render_param(param)));
                    }
                    out.push_str("}\n\n");
                }
            }
        }
        for mode in OperationMode::ALL {
            let fields: Vec<_> = self.roots[mode.index()]
                .values()
                .map(|b| &b.field)
                .filter(|f| !f.name.starts_with("__"))
                .collect();
            if fields.is_empty() {
                continue;
            }
            out.push_str(&format!("type {}", mode.root_type()));
            push_fields(&mut out, fields);
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
        out
    }
}

fn push_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(text) = description {
        let quoted = serde_json::to_string(text).unwrap_or_default();
        out.push_str(&format!("{indent}{quoted}\n"));
    }
}

fn push_fields<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a FieldDescriptor>) {
    out.push_str(" {\n");
    for field in fields {
        push_description(out, field.description.as_deref(), "  ");
        out.push_str(&format!("  {}", field.name));
        if !field.params.is_empty() {
            let params: Vec<_> = field.params.iter().map(render_param).collect();
            out.push_str(&format!("({})", params.join(", ")));
        }
        out.push_str(&format!(": {}\n", field.ty));
    }
    out.push_str("}\n\n");
}

fn render_param(param: &Param) -> String {
    match &param.default {
        Some(default) => format!("{}: {} = {}", param.name, param.ty, graphql_literal(default)),
        None => format!("{}: {}", param.name, param.ty),
    }
}

/// Formats a JSON value as a GraphQL input literal.
pub(crate) fn graphql_literal(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(graphql_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(fields) => {
            let fields: Vec<_> = fields
                .iter()
                .map(|(k, v)| format!("{k}: {}", graphql_literal(v)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{stream_resolver, sync_resolver};
    use crate::value::Resolved;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use serde::Serialize;
    use serde_json::json;

    fn noop() -> Resolver {
        sync_resolver(|_| Ok(Resolved::Null))
    }

    fn shapes() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register_type(TypeDescriptor::interface("Shape").field(FieldDescriptor::new("area", "Float!")))
            .unwrap();
        registry
            .register_type(
                TypeDescriptor::object("Circle")
                    .implements("Shape")
                    .field(FieldDescriptor::new("area", "Float!"))
                    .field(FieldDescriptor::new("radius", "Float!")),
            )
            .unwrap();
        registry
            .register_type(
                TypeDescriptor::object("Square")
                    .implements("Shape")
                    .field(FieldDescriptor::new("area", "Float!")),
            )
            .unwrap();
        registry
            .register_query(FieldDescriptor::new("shapes", "[Shape!]!"), noop())
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_root_names_are_rejected_per_mode() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_query(FieldDescriptor::new("widget", "String"), noop())
            .unwrap();
        assert_eq!(
            registry.register_query(FieldDescriptor::new("widget", "String"), noop()),
            Err(RegistryError::DuplicateName {
                mode: OperationMode::Query,
                name: "widget".into()
            })
        );
        registry
            .register_mutation(FieldDescriptor::new("widget", "String"), noop())
            .unwrap();
    }

    #[test]
    fn subscription_roots_need_stream_resolvers() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register(
                OperationMode::Subscription,
                FieldDescriptor::new("ticks", "Int"),
                ResolverHandle::Field(noop()),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::ResolverMismatch { .. }));
        registry
            .register_subscription(
                FieldDescriptor::new("ticks", "Int"),
                stream_resolver(|_| async { Ok(stream::empty()) }),
            )
            .unwrap();
    }

    #[test]
    fn identical_types_register_once_and_conflicts_fail() {
        let mut registry = SchemaRegistry::new();
        let status = || TypeDescriptor::enumeration("Status", ["ACTIVE", "DRAFT"]);
        registry.register_type(status()).unwrap();
        registry.register_type(status()).unwrap();
        assert_eq!(
            registry.register_type(TypeDescriptor::enumeration("Status", ["ACTIVE"])),
            Err(RegistryError::ConflictingType("Status".into()))
        );
        assert_eq!(
            registry.register_type(TypeDescriptor::object("Query")),
            Err(RegistryError::ConflictingType("Query".into()))
        );
    }

    #[test]
    fn lookup_reports_missing_bindings() {
        let registry = shapes();
        assert_eq!(
            registry.lookup(OperationMode::Query, "shapes").unwrap().name(),
            "shapes"
        );
        assert_eq!(
            registry.lookup(OperationMode::Mutation, "shapes").err(),
            Some(RegistryError::NotFound {
                mode: OperationMode::Mutation,
                name: "shapes".into()
            })
        );
    }

    #[test]
    fn finalize_rejects_unknown_references() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_query(FieldDescriptor::new("gadget", "Gadget"), noop())
            .unwrap();
        assert_eq!(
            registry.finalize(),
            Err(RegistryError::UnknownType {
                referenced: "Gadget".into(),
                by: "Query.gadget".into()
            })
        );
    }

    #[test]
    fn finalize_rejects_non_object_variants() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_type(TypeDescriptor::union("Anything", ["String"]))
            .unwrap();
        assert_eq!(
            registry.finalize(),
            Err(RegistryError::InvalidVariant {
                parent: "Anything".into(),
                variant: "String".into()
            })
        );
    }

    #[test]
    fn finalize_checks_interface_fields() {
        let mut registry = shapes();
        registry
            .register_type(
                TypeDescriptor::object("Blob")
                    .implements("Shape")
                    .field(FieldDescriptor::new("volume", "Float")),
            )
            .unwrap();
        assert!(matches!(
            registry.finalize(),
            Err(RegistryError::MissingInterfaceField { .. })
        ));
    }

    #[test]
    fn frozen_registry_rejects_registration() {
        let mut registry = shapes();
        registry.finalize().unwrap();
        assert!(registry.version() > 0);
        assert_eq!(
            registry.register_query(FieldDescriptor::new("late", "Int"), noop()),
            Err(RegistryError::RegistryFrozen("late".into()))
        );
    }

    #[derive(Serialize)]
    #[serde(tag = "__typename")]
    enum Shape {
        Circle { area: f64, radius: f64 },
        Triangle { area: f64 },
    }

    #[test]
    fn discovers_variants_from_discriminator() {
        let mut registry = shapes();
        registry.finalize().unwrap();
        let circle = ObjectValue::new(Shape::Circle {
            area: 3.14,
            radius: 1.0,
        })
        .unwrap();
        assert_eq!(registry.discover("Shape", &circle).unwrap().name(), "Circle");

        let triangle = ObjectValue::new(Shape::Triangle { area: 1.0 }).unwrap();
        assert!(registry.discover("Shape", &triangle).is_err());

        let anonymous = ObjectValue::from_map(serde_json::Map::new());
        assert!(registry.discover("Shape", &anonymous).is_err());
        assert_eq!(
            registry.discover("Circle", &anonymous).unwrap().name(),
            "Circle"
        );
    }

    #[test]
    fn overlap_follows_possible_types() {
        let mut registry = shapes();
        registry
            .register_type(TypeDescriptor::union("Round", ["Circle"]))
            .unwrap();
        registry.finalize().unwrap();

        assert!(registry.types_overlap("Circle", "Circle"));
        assert!(registry.types_overlap("Circle", "Shape"));
        assert!(registry.types_overlap("Shape", "Circle"));
        assert!(registry.types_overlap("Shape", "Round"));
        assert!(!registry.types_overlap("Square", "Round"));
        assert!(!registry.types_overlap("Round", "Square"));
        assert!(!registry.types_overlap("Circle", "Square"));
    }

    #[test]
    fn schema_definition_is_valid_sdl() {
        let mut registry = shapes();
        registry
            .register_type(
                TypeDescriptor::input_object("ShapeFilter").input_field("minArea", "Float"),
            )
            .unwrap();
        registry
            .register_query(
                FieldDescriptor::new("largest", "Shape")
                    .description("The shape with the \"largest\" area")
                    .param("filter", "ShapeFilter")
                    .param_with_default("limit", "Int", json!(10)),
                noop(),
            )
            .unwrap();
        registry.finalize().unwrap();

        let sdl = registry.schema_definition();
        assert!(sdl.contains("type Circle implements Shape {"));
        assert!(sdl.contains("largest(filter: ShapeFilter, limit: Int = 10): Shape"));
        assert!(!sdl.contains("scalar Int"));
        graphql_parser::parse_schema::<String>(&sdl).unwrap();
    }

    #[test]
    fn introspection_adds_meta_fields() {
        let mut registry = shapes();
        registry.enable_introspection().unwrap();
        assert!(registry.introspection_enabled());
        assert!(registry.lookup(OperationMode::Query, "__schema").is_ok());
        assert!(registry.type_of("__Type").is_some());
        assert!(!registry.schema_definition().contains("__"));
    }
}
