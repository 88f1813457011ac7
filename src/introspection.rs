//! The `__schema` / `__type` meta fields, resolved against the registry that
//! serves the request.

use serde::Serialize;
use serde_json::json;

use crate::error::{RegistryError, ResolverError};
use crate::resolver::{Resolver, ResolverContext, sync_resolver};
use crate::schema_registry::{SchemaRegistry, graphql_literal};
use crate::types::{FieldDescriptor, OperationMode, Param, TypeDescriptor, TypeKind, TypeRef};
use crate::value::Resolved;

#[derive(Clone, Serialize)]
struct SchemaNode {
    description: Option<String>,
}

#[derive(Clone, Serialize)]
struct TypeNode {
    kind: &'static str,
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "specifiedByURL")]
    specified_by_url: Option<String>,
    #[serde(skip)]
    reference: TypeRef,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldNode {
    name: String,
    description: Option<String>,
    is_deprecated: bool,
    deprecation_reason: Option<String>,
    #[serde(skip)]
    ty: TypeRef,
    #[serde(skip)]
    params: Vec<Param>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputValueNode {
    name: String,
    description: Option<String>,
    default_value: Option<String>,
    is_deprecated: bool,
    deprecation_reason: Option<String>,
    #[serde(skip)]
    ty: TypeRef,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnumValueNode {
    name: String,
    description: Option<String>,
    is_deprecated: bool,
    deprecation_reason: Option<String>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectiveNode {
    name: &'static str,
    description: Option<&'static str>,
    locations: Vec<&'static str>,
    is_repeatable: bool,
}

impl From<&FieldDescriptor> for FieldNode {
    fn from(field: &FieldDescriptor) -> Self {
        FieldNode {
            name: field.name().to_string(),
            description: field.description_text().map(str::to_string),
            is_deprecated: false,
            deprecation_reason: None,
            ty: field.ty().clone(),
            params: field.params().to_vec(),
        }
    }
}

impl From<&Param> for InputValueNode {
    fn from(param: &Param) -> Self {
        InputValueNode {
            name: param.name.clone(),
            description: param.description.clone(),
            default_value: param.default.as_ref().map(graphql_literal),
            is_deprecated: false,
            deprecation_reason: None,
            ty: param.ty.clone(),
        }
    }
}

fn enum_value(name: &str) -> EnumValueNode {
    EnumValueNode {
        name: name.to_string(),
        description: None,
        is_deprecated: false,
        deprecation_reason: None,
    }
}

fn root_mode(schema: &SchemaRegistry, name: &str) -> Option<OperationMode> {
    OperationMode::ALL
        .into_iter()
        .find(|mode| mode.root_type() == name && schema.has_root(*mode))
}

fn named_type(schema: &SchemaRegistry, name: &str) -> Option<TypeNode> {
    let (kind, description) = if root_mode(schema, name).is_some() {
        ("OBJECT", None)
    } else {
        let descriptor = schema.type_of(name)?;
        (
            descriptor.kind().introspection_name(),
            descriptor.description_text().map(str::to_string),
        )
    };
    Some(TypeNode {
        kind,
        name: Some(name.to_string()),
        description,
        specified_by_url: None,
        reference: TypeRef::named(name),
    })
}

fn type_node(schema: &SchemaRegistry, ty: &TypeRef) -> TypeNode {
    let kind = match ty {
        TypeRef::Named(name) => {
            if let Some(node) = named_type(schema, name) {
                return node;
            }
            "SCALAR"
        }
        TypeRef::List(_) => "LIST",
        TypeRef::NonNull(_) => "NON_NULL",
    };
    TypeNode {
        kind,
        name: None,
        description: None,
        specified_by_url: None,
        reference: ty.clone(),
    }
}

/// The named type behind a `__Type` parent; wrappers yield `None`.
fn parent_type<'a>(ctx: &'a ResolverContext) -> Result<Option<&'a str>, ResolverError> {
    match &ctx.parent_as::<TypeNode>()?.reference {
        TypeRef::Named(name) => Ok(Some(name.as_str())),
        _ => Ok(None),
    }
}

fn parent_kind<'a>(ctx: &'a ResolverContext) -> Result<Option<(&'a str, &'a TypeDescriptor)>, ResolverError> {
    Ok(parent_type(ctx)?.and_then(|name| ctx.schema().type_of(name).map(|t| (name, t))))
}

fn type_list<'a, I>(schema: &SchemaRegistry, names: I) -> Result<Resolved, ResolverError>
where
    I: IntoIterator<Item = &'a String>,
{
    Resolved::objects(names.into_iter().filter_map(|name| named_type(schema, name)))
}

pub(crate) fn install(registry: &mut SchemaRegistry) -> Result<(), RegistryError> {
    registry.register_type(TypeDescriptor::enumeration(
        "__TypeKind",
        [
            "SCALAR",
            "OBJECT",
            "INTERFACE",
            "UNION",
            "ENUM",
            "INPUT_OBJECT",
            "LIST",
            "NON_NULL",
        ],
    ))?;
    registry.register_type(TypeDescriptor::enumeration(
        "__DirectiveLocation",
        ["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
    ))?;

    registry.register_type(
        TypeDescriptor::object("__Schema")
            .field(FieldDescriptor::new("description", "String"))
            .field(FieldDescriptor::new("types", "[__Type!]!").resolve(sync_resolver(|ctx| {
                let schema = ctx.schema();
                let roots = OperationMode::ALL
                    .into_iter()
                    .filter(|mode| schema.has_root(*mode))
                    .filter_map(|mode| named_type(schema, mode.root_type()));
                let types = schema
                    .types()
                    .filter_map(|t| named_type(schema, t.name()));
                Resolved::objects(roots.chain(types))
            })))
            .field(FieldDescriptor::new("queryType", "__Type!").resolve(root_resolver(OperationMode::Query)))
            .field(FieldDescriptor::new("mutationType", "__Type").resolve(root_resolver(OperationMode::Mutation)))
            .field(
                FieldDescriptor::new("subscriptionType", "__Type")
                    .resolve(root_resolver(OperationMode::Subscription)),
            )
            .field(FieldDescriptor::new("directives", "[__Directive!]!").resolve(sync_resolver(|_| {
                let conditional = |name, description| DirectiveNode {
                    name,
                    description: Some(description),
                    locations: vec!["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
                    is_repeatable: false,
                };
                Resolved::objects([
                    conditional("skip", "Skips the selection when `if` is true."),
                    conditional("include", "Includes the selection only when `if` is true."),
                ])
            }))),
    )?;

    registry.register_type(
        TypeDescriptor::object("__Type")
            .field(FieldDescriptor::new("kind", "__TypeKind!"))
            .field(FieldDescriptor::new("name", "String"))
            .field(FieldDescriptor::new("description", "String"))
            .field(FieldDescriptor::new("specifiedByURL", "String"))
            .field(
                FieldDescriptor::new("fields", "[__Field!]")
                    .param_with_default("includeDeprecated", "Boolean", json!(false))
                    .resolve(sync_resolver(|ctx| {
                        let Some(name) = parent_type(&ctx)? else {
                            return Ok(Resolved::Null);
                        };
                        let schema = ctx.schema();
                        let fields: Vec<FieldNode> = match root_mode(schema, name) {
                            Some(mode) => schema
                                .bindings(mode)
                                .map(|b| &b.field)
                                .filter(|f| !f.name().starts_with("__"))
                                .map(FieldNode::from)
                                .collect(),
                            None => match schema.type_of(name).and_then(TypeDescriptor::fields) {
                                Some(fields) => fields.values().map(FieldNode::from).collect(),
                                None => return Ok(Resolved::Null),
                            },
                        };
                        Resolved::objects(fields)
                    })),
            )
            .field(FieldDescriptor::new("interfaces", "[__Type!]").resolve(sync_resolver(|ctx| {
                if parent_type(&ctx)?.is_some_and(|name| root_mode(ctx.schema(), name).is_some()) {
                    return Ok(Resolved::List(Vec::new()));
                }
                match parent_kind(&ctx)? {
                    Some((_, t)) => match t.kind() {
                        TypeKind::Object { interfaces, .. } => type_list(ctx.schema(), interfaces),
                        TypeKind::Interface { .. } => Ok(Resolved::List(Vec::new())),
                        _ => Ok(Resolved::Null),
                    },
                    None => Ok(Resolved::Null),
                }
            })))
            .field(FieldDescriptor::new("possibleTypes", "[__Type!]").resolve(sync_resolver(|ctx| {
                match parent_kind(&ctx)? {
                    Some((name, t)) if t.is_abstract() => {
                        type_list(ctx.schema(), ctx.schema().possible_types(name))
                    }
                    _ => Ok(Resolved::Null),
                }
            })))
            .field(
                FieldDescriptor::new("enumValues", "[__EnumValue!]")
                    .param_with_default("includeDeprecated", "Boolean", json!(false))
                    .resolve(sync_resolver(|ctx| match parent_kind(&ctx)? {
                        Some((_, t)) => match t.kind() {
                            TypeKind::Enum { values } => {
                                Resolved::objects(values.iter().map(|v| enum_value(v)))
                            }
                            _ => Ok(Resolved::Null),
                        },
                        None => Ok(Resolved::Null),
                    })),
            )
            .field(FieldDescriptor::new("inputFields", "[__InputValue!]").resolve(sync_resolver(
                |ctx| match parent_kind(&ctx)? {
                    Some((_, t)) => match t.kind() {
                        TypeKind::InputObject { fields } => {
                            Resolved::objects(fields.values().map(InputValueNode::from))
                        }
                        _ => Ok(Resolved::Null),
                    },
                    None => Ok(Resolved::Null),
                },
            )))
            .field(FieldDescriptor::new("ofType", "__Type").resolve(sync_resolver(|ctx| {
                match &ctx.parent_as::<TypeNode>()?.reference {
                    TypeRef::List(inner) | TypeRef::NonNull(inner) => {
                        Resolved::object(type_node(ctx.schema(), inner))
                    }
                    TypeRef::Named(_) => Ok(Resolved::Null),
                }
            }))),
    )?;

    registry.register_type(
        TypeDescriptor::object("__Field")
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("description", "String"))
            .field(FieldDescriptor::new("args", "[__InputValue!]!").resolve(sync_resolver(|ctx| {
                let field = ctx.parent_as::<FieldNode>()?;
                Resolved::objects(field.params.iter().map(InputValueNode::from))
            })))
            .field(FieldDescriptor::new("type", "__Type!").resolve(sync_resolver(|ctx| {
                let field = ctx.parent_as::<FieldNode>()?;
                Resolved::object(type_node(ctx.schema(), &field.ty))
            })))
            .field(FieldDescriptor::new("isDeprecated", "Boolean!"))
            .field(FieldDescriptor::new("deprecationReason", "String")),
    )?;

    registry.register_type(
        TypeDescriptor::object("__InputValue")
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("description", "String"))
            .field(FieldDescriptor::new("type", "__Type!").resolve(sync_resolver(|ctx| {
                let input = ctx.parent_as::<InputValueNode>()?;
                Resolved::object(type_node(ctx.schema(), &input.ty))
            })))
            .field(FieldDescriptor::new("defaultValue", "String"))
            .field(FieldDescriptor::new("isDeprecated", "Boolean!"))
            .field(FieldDescriptor::new("deprecationReason", "String")),
    )?;

    registry.register_type(
        TypeDescriptor::object("__EnumValue")
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("description", "String"))
            .field(FieldDescriptor::new("isDeprecated", "Boolean!"))
            .field(FieldDescriptor::new("deprecationReason", "String")),
    )?;

    registry.register_type(
        TypeDescriptor::object("__Directive")
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("description", "String"))
            .field(FieldDescriptor::new("locations", "[__DirectiveLocation!]!"))
            .field(FieldDescriptor::new("args", "[__InputValue!]!").resolve(sync_resolver(|_| {
                let condition = Param {
                    name: "if".to_string(),
                    ty: TypeRef::named("Boolean").non_null(),
                    default: None,
                    description: None,
                };
                Resolved::objects([InputValueNode::from(&condition)])
            })))
            .field(FieldDescriptor::new("isRepeatable", "Boolean!")),
    )?;

    registry.register_query(
        FieldDescriptor::new("__schema", "__Schema!").complexity(0),
        sync_resolver(|_| Resolved::object(SchemaNode { description: None })),
    )?;
    registry.register_query(
        FieldDescriptor::new("__type", "__Type")
            .param("name", "String!")
            .complexity(0),
        sync_resolver(|ctx| {
            let name: String = ctx.arg("name")?;
            Resolved::optional_object(named_type(ctx.schema(), &name))
        }),
    )?;
    Ok(())
}

fn root_resolver(mode: OperationMode) -> Resolver {
    sync_resolver(move |ctx| Resolved::optional_object(named_type(ctx.schema(), mode.root_type())))
}
