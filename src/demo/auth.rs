use std::sync::Arc;

use crate::error::RegistryError;
use crate::resolver::{ResolverContext, sync_resolver};
use crate::schema_registry::SchemaRegistry;
use crate::server::BearerToken;
use crate::subscription::Broadcaster;
use crate::types::FieldDescriptor;
use crate::value::Resolved;

use super::product::{Catalog, ProductUpdate, User, UserRole, create_product};
use super::store::Store;

/// Maps the demo bearer tokens onto seeded users.
pub fn user_id_for_token(token: &str) -> Option<i64> {
    match token {
        "admin-token" => Some(1),
        "user-token" => Some(2),
        _ => None,
    }
}

/// The user authenticated for this request, if any.
pub(super) fn current_user(ctx: &ResolverContext, users: &Store<User>) -> Option<User> {
    let BearerToken(token) = ctx.value::<BearerToken>()?;
    users.get(user_id_for_token(token)?)
}

pub(super) fn register(
    registry: &mut SchemaRegistry,
    catalog: Arc<Catalog>,
    events: Broadcaster<ProductUpdate>,
) -> Result<(), RegistryError> {
    let users = catalog.users.clone();
    registry.register_query(
        FieldDescriptor::new("currentUser", "User!"),
        sync_resolver(move |ctx| {
            let user = current_user(&ctx, &users).ok_or("not authenticated")?;
            Resolved::object(user)
        }),
    )?;

    registry.register_mutation(
        FieldDescriptor::new("createProductWithAuth", "Product!").param("input", "ProductInput!"),
        sync_resolver(move |ctx| {
            let user = current_user(&ctx, &catalog.users).ok_or("authentication required")?;
            if user.role != UserRole::Admin {
                tracing::warn!(user = user.id, "admin role required for createProductWithAuth");
                return Err("admin role required".into());
            }
            let product = create_product(&catalog, &events, ctx.arg("input")?)?;
            Resolved::object(product)
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_known_tokens_map_to_users() {
        assert_eq!(user_id_for_token("admin-token"), Some(1));
        assert_eq!(user_id_for_token("user-token"), Some(2));
        assert_eq!(user_id_for_token("Bearer admin-token"), None);
    }
}
