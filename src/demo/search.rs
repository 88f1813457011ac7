use std::sync::Arc;

use crate::error::RegistryError;
use crate::resolver::sync_resolver;
use crate::schema_registry::SchemaRegistry;
use crate::types::{FieldDescriptor, TypeDescriptor};
use crate::value::Resolved;

use super::employee::{Employee, Role};
use super::product::Catalog;
use super::store::Store;
use super::widget::Widget;

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn employee_matches(employee: &Employee, needle: &str) -> bool {
    contains(&employee.name, needle)
        || contains(&employee.email, needle)
        || matches!(&employee.role, Role::Manager { department, .. } if contains(department, needle))
}

/// Registers `search(query)`, a case-insensitive match across widgets,
/// products and employees returned as the `SearchResult` union.
pub(super) fn register(
    registry: &mut SchemaRegistry,
    widgets: Arc<Store<Widget>>,
    catalog: Arc<Catalog>,
    employees: Arc<Store<Employee>>,
) -> Result<(), RegistryError> {
    registry.register_type(TypeDescriptor::union(
        "SearchResult",
        ["Widget", "Product", "Developer", "Manager"],
    ))?;
    registry.register_query(
        FieldDescriptor::new("search", "[SearchResult!]!").param("query", "String!"),
        sync_resolver(move |ctx| {
            let needle = ctx.arg::<String>("query")?.to_lowercase();
            let mut results = Vec::new();
            for widget in widgets.filter(|w| contains(&w.name, &needle)) {
                results.push(Resolved::typed_object("Widget", widget)?);
            }
            for product in catalog
                .products
                .filter(|p| contains(&p.name, &needle) || contains(&p.description, &needle))
            {
                results.push(Resolved::typed_object("Product", product)?);
            }
            // Employees carry their own discriminator.
            for employee in employees.filter(|e| employee_matches(e, &needle)) {
                results.push(Resolved::object(employee)?);
            }
            tracing::debug!(query = %needle, hits = results.len(), "search");
            Ok(Resolved::List(results))
        }),
    )?;
    Ok(())
}
