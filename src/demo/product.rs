//! Product catalog: products, categories, reviews and the users writing them.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, ResolverError};
use crate::resolver::sync_resolver;
use crate::schema_registry::SchemaRegistry;
use crate::subscription::Broadcaster;
use crate::types::{FieldDescriptor, TypeDescriptor};
use crate::value::Resolved;

use super::scalars::{Money, Timestamp};
use super::store::{Identified, Store};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Draft,
    Active,
    Discontinued,
    OutOfStock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Customer,
    Guest,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub status: ProductStatus,
    pub category_id: i64,
    pub in_stock: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub product_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

macro_rules! identified {
    ($($ty:ty),*) => {
        $(impl Identified for $ty {
            fn id(&self) -> i64 {
                self.id
            }
        })*
    };
}

identified!(Product, Category, Review, User);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProductInput {
    name: String,
    description: String,
    price: f64,
    category_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProductFilter {
    category_id: Option<i64>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    status: Option<ProductStatus>,
    in_stock: Option<bool>,
}

impl ProductFilter {
    fn matches(&self, product: &Product) -> bool {
        self.category_id.is_none_or(|id| product.category_id == id)
            && self.min_price.is_none_or(|min| product.price >= min)
            && self.max_price.is_none_or(|max| product.price <= max)
            && self.status.is_none_or(|status| product.status == status)
            && self.in_stock.is_none_or(|in_stock| product.in_stock == in_stock)
    }
}

#[derive(Debug, Deserialize)]
struct ReviewInput {
    rating: i64,
    comment: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductUpdate {
    pub product: Product,
    pub action: String,
    pub timestamp: Timestamp,
}

impl ProductUpdate {
    pub fn new(product: Product, action: &str) -> Self {
        ProductUpdate {
            product,
            action: action.to_string(),
            timestamp: Timestamp::now(),
        }
    }
}

/// All catalog tables. Users are shared with the employee and auth resolvers.
pub struct Catalog {
    pub products: Store<Product>,
    pub categories: Store<Category>,
    pub reviews: Store<Review>,
    pub users: Arc<Store<User>>,
}

impl Catalog {
    pub fn seeded() -> Self {
        let category = |id, name: &str, description: Option<&str>| Category {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        let product = |id, name: &str, description: &str, price, status, category_id, in_stock| {
            Product {
                id,
                name: name.to_string(),
                description: description.to_string(),
                price,
                status,
                category_id,
                in_stock,
            }
        };
        let user = |id, username: &str, email: &str, role| User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            role,
        };
        let review = |id, product_id, user_id, rating, comment: &str, created_at: &str| Review {
            id,
            product_id,
            user_id,
            rating,
            comment: comment.to_string(),
            created_at: created_at.to_string(),
        };

        use ProductStatus::*;
        Catalog {
            categories: Store::new(vec![
                category(1, "Electronics", Some("Electronic devices and accessories")),
                category(2, "Books", Some("Physical and digital books")),
                category(3, "Clothing", None),
            ]),
            products: Store::new(vec![
                product(1, "Laptop", "High-performance laptop", 999.99, Active, 1, true),
                product(2, "Go Programming Book", "Learn Go in 30 days", 39.99, Active, 2, true),
                product(3, "Vintage T-Shirt", "Retro design", 24.99, OutOfStock, 3, false),
                product(4, "Smartphone", "Latest model", 699.99, Active, 1, true),
            ]),
            users: Arc::new(Store::new(vec![
                user(1, "admin", "admin@example.com", UserRole::Admin),
                user(2, "john_customer", "john@example.com", UserRole::Customer),
                user(3, "jane_customer", "jane@example.com", UserRole::Customer),
            ])),
            reviews: Store::new(vec![
                review(1, 1, 2, 5, "Excellent laptop!", "2024-01-15T10:00:00Z"),
                review(2, 1, 3, 4, "Good value for money", "2024-01-16T14:30:00Z"),
                review(3, 2, 2, 5, "Great book for beginners", "2024-01-17T09:15:00Z"),
            ]),
        }
    }

    fn average_rating(&self, product_id: i64) -> Option<f64> {
        let ratings: Vec<i64> = self
            .reviews
            .filter(|r| r.product_id == product_id)
            .into_iter()
            .map(|r| r.rating)
            .collect();
        if ratings.is_empty() {
            return None;
        }
        Some(ratings.iter().sum::<i64>() as f64 / ratings.len() as f64)
    }
}

/// Creates a draft product after checking its category exists.
pub(super) fn create_product(
    catalog: &Catalog,
    events: &Broadcaster<ProductUpdate>,
    input: ProductInput,
) -> Result<Product, ResolverError> {
    if catalog.categories.get(input.category_id).is_none() {
        return Err(format!("category with id {} not found", input.category_id).into());
    }
    let product = catalog.products.insert_with(|id| Product {
        id,
        name: input.name,
        description: input.description,
        price: input.price,
        status: ProductStatus::Draft,
        category_id: input.category_id,
        in_stock: false,
    });
    events.broadcast(&ProductUpdate::new(product.clone(), "created"));
    Ok(product)
}

fn register_types(
    registry: &mut SchemaRegistry,
    catalog: &Arc<Catalog>,
) -> Result<(), RegistryError> {
    registry.register_type(TypeDescriptor::enumeration(
        "ProductStatus",
        ["DRAFT", "ACTIVE", "DISCONTINUED", "OUT_OF_STOCK"],
    ))?;
    registry.register_type(TypeDescriptor::enumeration(
        "UserRole",
        ["ADMIN", "CUSTOMER", "GUEST"],
    ))?;

    let for_category = catalog.clone();
    let for_reviews = catalog.clone();
    let for_rating = catalog.clone();
    registry.register_type(
        TypeDescriptor::object("Product")
            .field(FieldDescriptor::new("id", "Int!"))
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("description", "String!"))
            .field(FieldDescriptor::new("price", "Float!"))
            .field(FieldDescriptor::new("status", "ProductStatus!"))
            .field(FieldDescriptor::new("categoryId", "Int!"))
            .field(FieldDescriptor::new("inStock", "Boolean!"))
            .field(
                FieldDescriptor::new("listPrice", "Money!").resolve(sync_resolver(|ctx| {
                    let product = ctx.parent_as::<Product>()?;
                    Resolved::scalar(&Money::usd(product.price))
                })),
            )
            .field(
                FieldDescriptor::new("category", "Category").resolve(sync_resolver(move |ctx| {
                    let product = ctx.parent_as::<Product>()?;
                    let category = for_category
                        .categories
                        .get(product.category_id)
                        .ok_or_else(|| {
                            format!("category with id {} not found", product.category_id)
                        })?;
                    Resolved::object(category)
                })),
            )
            .field(
                FieldDescriptor::new("reviews", "[Review!]!").resolve(sync_resolver(
                    move |ctx| {
                        let product = ctx.parent_as::<Product>()?;
                        Resolved::objects(
                            for_reviews.reviews.filter(|r| r.product_id == product.id),
                        )
                    },
                )),
            )
            .field(
                FieldDescriptor::new("averageRating", "Float").resolve(sync_resolver(
                    move |ctx| {
                        let product = ctx.parent_as::<Product>()?;
                        Ok(Resolved::from(for_rating.average_rating(product.id)))
                    },
                )),
            ),
    )?;

    let products = catalog.clone();
    registry.register_type(
        TypeDescriptor::object("Category")
            .field(FieldDescriptor::new("id", "Int!"))
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("description", "String"))
            .field(
                FieldDescriptor::new("products", "[Product!]!").resolve(sync_resolver(
                    move |ctx| {
                        let category = ctx.parent_as::<Category>()?;
                        Resolved::objects(
                            products.products.filter(|p| p.category_id == category.id),
                        )
                    },
                )),
            ),
    )?;

    let users = catalog.clone();
    registry.register_type(
        TypeDescriptor::object("Review")
            .field(FieldDescriptor::new("id", "Int!"))
            .field(FieldDescriptor::new("productId", "Int!"))
            .field(FieldDescriptor::new("userId", "Int!"))
            .field(FieldDescriptor::new("rating", "Int!"))
            .field(FieldDescriptor::new("comment", "String!"))
            .field(FieldDescriptor::new("createdAt", "String!"))
            .field(
                FieldDescriptor::new("user", "User").resolve(sync_resolver(move |ctx| {
                    let review = ctx.parent_as::<Review>()?;
                    let user = users
                        .users
                        .get(review.user_id)
                        .ok_or_else(|| format!("user with id {} not found", review.user_id))?;
                    Resolved::object(user)
                })),
            ),
    )?;

    let reviews = catalog.clone();
    registry.register_type(
        TypeDescriptor::object("User")
            .field(FieldDescriptor::new("id", "Int!"))
            .field(FieldDescriptor::new("username", "String!"))
            .field(FieldDescriptor::new("email", "String!"))
            .field(FieldDescriptor::new("role", "UserRole!"))
            .field(
                FieldDescriptor::new("reviews", "[Review!]!").resolve(sync_resolver(move |ctx| {
                    let user = ctx.parent_as::<User>()?;
                    Resolved::objects(reviews.reviews.filter(|r| r.user_id == user.id))
                })),
            ),
    )?;

    registry.register_type(
        TypeDescriptor::input_object("ProductInput")
            .input_field("name", "String!")
            .input_field("description", "String!")
            .input_field("price", "Float!")
            .input_field("categoryId", "Int!"),
    )?;
    registry.register_type(
        TypeDescriptor::input_object("ProductFilter")
            .input_field("categoryId", "Int")
            .input_field("minPrice", "Float")
            .input_field("maxPrice", "Float")
            .input_field("status", "ProductStatus")
            .input_field("inStock", "Boolean"),
    )?;
    registry.register_type(
        TypeDescriptor::input_object("ReviewInput")
            .input_field("rating", "Int!")
            .input_field("comment", "String!"),
    )?;
    Ok(())
}

pub(super) fn register(
    registry: &mut SchemaRegistry,
    catalog: Arc<Catalog>,
    events: Broadcaster<ProductUpdate>,
) -> Result<(), RegistryError> {
    register_types(registry, &catalog)?;

    let store = catalog.clone();
    registry.register_query(
        FieldDescriptor::new("product", "Product").param("id", "Int!"),
        sync_resolver(move |ctx| {
            let id: i64 = ctx.arg("id")?;
            let product = store
                .products
                .get(id)
                .ok_or_else(|| format!("product with id {id} not found"))?;
            Resolved::object(product)
        }),
    )?;

    let store = catalog.clone();
    registry.register_query(
        FieldDescriptor::new("products", "[Product!]!").param("filter", "ProductFilter"),
        sync_resolver(move |ctx| {
            let filter: ProductFilter = ctx.opt_arg("filter")?.unwrap_or_default();
            Resolved::objects(store.products.filter(|p| filter.matches(p)))
        }),
    )?;

    let store = catalog.clone();
    registry.register_query(
        FieldDescriptor::new("categories", "[Category!]!"),
        sync_resolver(move |_| Resolved::objects(store.categories.list())),
    )?;

    let store = catalog.clone();
    let created = events.clone();
    registry.register_mutation(
        FieldDescriptor::new("createProduct", "Product!").param("input", "ProductInput!"),
        sync_resolver(move |ctx| {
            let product = create_product(&store, &created, ctx.arg("input")?)?;
            Resolved::object(product)
        }),
    )?;

    let store = catalog.clone();
    registry.register_mutation(
        FieldDescriptor::new("updateProductStatus", "Product!")
            .param("id", "Int!")
            .param("status", "ProductStatus!"),
        sync_resolver(move |ctx| {
            let id: i64 = ctx.arg("id")?;
            let status: ProductStatus = ctx.arg("status")?;
            let product = store
                .products
                .update(id, |product| {
                    product.status = status;
                    match status {
                        ProductStatus::OutOfStock => product.in_stock = false,
                        ProductStatus::Active => product.in_stock = true,
                        _ => {}
                    }
                })
                .ok_or_else(|| format!("product with id {id} not found"))?;
            events.broadcast(&ProductUpdate::new(product.clone(), "updated"));
            Resolved::object(product)
        }),
    )?;

    let store = catalog;
    registry.register_mutation(
        FieldDescriptor::new("addProductReview", "Review!")
            .param("productId", "Int!")
            .param("review", "ReviewInput!"),
        sync_resolver(move |ctx| {
            let product_id: i64 = ctx.arg("productId")?;
            let input: ReviewInput = ctx.arg("review")?;
            if !(1..=5).contains(&input.rating) {
                return Err("rating must be between 1 and 5".into());
            }
            if store.products.get(product_id).is_none() {
                return Err(format!("product with id {product_id} not found").into());
            }
            let review = store.reviews.insert_with(|id| Review {
                id,
                product_id,
                user_id: 2,
                rating: input.rating,
                comment: input.comment,
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            });
            Resolved::object(review)
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filters_combine() {
        let catalog = Catalog::seeded();
        let filter = ProductFilter {
            category_id: Some(1),
            max_price: Some(800.0),
            ..Default::default()
        };
        let names: Vec<_> = catalog
            .products
            .filter(|p| filter.matches(p))
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Smartphone".to_string()]);
    }

    #[test]
    fn averages_ratings_per_product() {
        let catalog = Catalog::seeded();
        assert_eq!(catalog.average_rating(1), Some(4.5));
        assert_eq!(catalog.average_rating(4), None);
    }

    #[test]
    fn new_products_start_as_drafts() {
        let catalog = Catalog::seeded();
        let events = Broadcaster::new(4);
        let input = ProductInput {
            name: "Tablet".into(),
            description: "Portable".into(),
            price: 299.0,
            category_id: 1,
        };
        let product = create_product(&catalog, &events, input).unwrap();
        assert_eq!((product.id, product.status), (5, ProductStatus::Draft));

        let orphan = ProductInput {
            name: "Mystery".into(),
            description: String::new(),
            price: 1.0,
            category_id: 42,
        };
        let err = create_product(&catalog, &events, orphan).unwrap_err();
        assert_eq!(err.message(), "category with id 42 not found");
    }
}
