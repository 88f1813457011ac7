//! Input coercion shared by variable values and field arguments.

use serde_json::{Map, Value};

use crate::schema_registry::SchemaRegistry;
use crate::types::{TypeKind, TypeRef};

/// Coerces `value` against the declared input type `ty`, returning the
/// canonical value handed to resolvers.
pub(crate) fn coerce_input(
    schema: &SchemaRegistry,
    ty: &TypeRef,
    value: &Value,
) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(format!("expected a non-null value of type `{ty}`"));
            }
            coerce_input(schema, inner, value)
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_input(schema, inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            single => Ok(Value::Array(vec![coerce_input(schema, inner, single)?])),
        },
        TypeRef::Named(name) => {
            let descriptor = schema
                .type_of(name)
                .ok_or_else(|| format!("unknown input type `{name}`"))?;
            match descriptor.kind() {
                TypeKind::Scalar(scalar) => scalar.parse_value(value).map_err(|e| e.0),
                TypeKind::Enum { values } => match value.as_str() {
                    Some(v) if values.iter().any(|known| known == v) => Ok(value.clone()),
                    _ => Err(format!("`{value}` is not a value of enum `{name}`")),
                },
                TypeKind::InputObject { fields } => {
                    let Value::Object(provided) = value else {
                        return Err(format!("expected an object of type `{name}`, got {value}"));
                    };
                    if let Some(unknown) = provided.keys().find(|k| !fields.contains_key(*k)) {
                        return Err(format!("`{unknown}` is not a field of `{name}`"));
                    }
                    let mut coerced = Map::new();
                    for (field, param) in fields {
                        match provided.get(field) {
                            Some(v) => {
                                let v = coerce_input(schema, &param.ty, v)
                                    .map_err(|e| format!("{name}.{field}: {e}"))?;
                                coerced.insert(field.clone(), v);
                            }
                            None => match &param.default {
                                Some(default) => {
                                    coerced.insert(field.clone(), default.clone());
                                }
                                None if param.ty.is_non_null() => {
                                    return Err(format!(
                                        "missing required field `{field}` of `{name}`"
                                    ));
                                }
                                None => {}
                            },
                        }
                    }
                    Ok(Value::Object(coerced))
                }
                _ => Err(format!("`{name}` is not an input type")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        schema
            .register_type(TypeDescriptor::enumeration("Status", ["ACTIVE", "DRAFT"]))
            .unwrap();
        schema
            .register_type(
                TypeDescriptor::input_object("WidgetInput")
                    .input_field("name", "String!")
                    .input_field("status", "Status"),
            )
            .unwrap();
        schema
    }

    fn ty(source: &str) -> TypeRef {
        source.parse().unwrap()
    }

    #[test]
    fn promotes_single_values_to_lists() {
        let out = coerce_input(&schema(), &ty("[Int!]"), &json!(4)).unwrap();
        assert_eq!(out, json!([4]));
    }

    #[test]
    fn rejects_null_in_non_null_position() {
        assert!(coerce_input(&schema(), &ty("Int!"), &Value::Null).is_err());
        assert_eq!(coerce_input(&schema(), &ty("Int"), &Value::Null), Ok(Value::Null));
    }

    #[test]
    fn checks_enum_membership() {
        assert!(coerce_input(&schema(), &ty("Status"), &json!("ACTIVE")).is_ok());
        assert!(coerce_input(&schema(), &ty("Status"), &json!("GONE")).is_err());
    }

    #[test]
    fn coerces_input_objects_field_by_field() {
        let schema = schema();
        let out = coerce_input(&schema, &ty("WidgetInput!"), &json!({"name": "gear"})).unwrap();
        assert_eq!(out, json!({"name": "gear"}));

        let err = coerce_input(&schema, &ty("WidgetInput"), &json!({"status": "ACTIVE"}))
            .unwrap_err();
        assert!(err.contains("name"));

        let err = coerce_input(&schema, &ty("WidgetInput"), &json!({"name": "a", "color": 1}))
            .unwrap_err();
        assert!(err.contains("color"));
    }
}
