//! Sample domain served by the `quickgraph` binary: widgets, employees, a
//! product catalog, search, auth-aware fields, custom scalars and live
//! subscriptions.

mod auth;
mod employee;
mod product;
mod scalars;
mod search;
mod store;
mod subscription;
mod widget;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::GraphEngine;
use crate::error::RegistryError;
use crate::schema_registry::SchemaRegistry;

pub use auth::user_id_for_token;
pub use employee::{Employee, Role};
pub use product::{Catalog, Category, Product, ProductStatus, ProductUpdate, Review, User, UserRole};
pub use scalars::{EmailAddress, EmployeeId, HexColor, Money, Timestamp};
pub use store::{Identified, Store};
pub use subscription::{Feeds, OrderUpdate};
pub use widget::{Widget, WidgetUpdate};

/// Shared state behind every demo resolver.
#[derive(Clone)]
pub struct Demo {
    pub widgets: Arc<Store<Widget>>,
    pub employees: Arc<Store<Employee>>,
    pub catalog: Arc<Catalog>,
    pub feeds: Feeds,
}

impl Demo {
    /// Seeded stores, with subscriber queues of `buffer_size` events.
    pub fn new(buffer_size: usize) -> Self {
        Demo {
            widgets: Arc::new(Store::new(widget::seed())),
            employees: Arc::new(Store::new(employee::seed())),
            catalog: Arc::new(Catalog::seeded()),
            feeds: Feeds::new(buffer_size),
        }
    }

    pub fn register(&self, registry: &mut SchemaRegistry) -> Result<(), RegistryError> {
        scalars::register(registry, self.employees.clone())?;
        widget::register(registry, self.widgets.clone(), self.feeds.widgets.clone())?;
        product::register(registry, self.catalog.clone(), self.feeds.products.clone())?;
        employee::register(registry, self.employees.clone(), self.catalog.users.clone())?;
        auth::register(registry, self.catalog.clone(), self.feeds.products.clone())?;
        search::register(
            registry,
            self.widgets.clone(),
            self.catalog.clone(),
            self.employees.clone(),
        )?;
        subscription::register(registry, &self.feeds)
    }

    /// Registers the demo schema and builds an engine over it.
    pub fn build_engine(&self, config: EngineConfig) -> Result<GraphEngine, RegistryError> {
        let mut registry = SchemaRegistry::new();
        self.register(&mut registry)?;
        GraphEngine::new(registry, config)
    }
}
