use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::resolver::sync_resolver;
use crate::schema_registry::SchemaRegistry;
use crate::subscription::Broadcaster;
use crate::types::{FieldDescriptor, TypeDescriptor};
use crate::value::Resolved;

use super::scalars::Timestamp;
use super::store::{Identified, Store};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

impl Identified for Widget {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Deserialize)]
struct WidgetInput {
    name: String,
    price: f64,
    quantity: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct WidgetUpdate {
    pub widget: Widget,
    pub action: String,
    pub timestamp: Timestamp,
}

impl WidgetUpdate {
    pub fn new(widget: Widget, action: &str) -> Self {
        WidgetUpdate {
            widget,
            action: action.to_string(),
            timestamp: Timestamp::now(),
        }
    }

    /// First event of every widget subscription.
    pub fn connected() -> Self {
        WidgetUpdate::new(
            Widget {
                id: 0,
                name: "Connection established".to_string(),
                price: 0.0,
                quantity: 0,
            },
            "connected",
        )
    }
}

pub(super) fn seed() -> Vec<Widget> {
    vec![Widget {
        id: 1,
        name: "Widget 1".to_string(),
        price: 1.0,
        quantity: 10,
    }]
}

pub(super) fn register(
    registry: &mut SchemaRegistry,
    widgets: Arc<Store<Widget>>,
    events: Broadcaster<WidgetUpdate>,
) -> Result<(), RegistryError> {
    registry.register_type(
        TypeDescriptor::object("Widget")
            .field(FieldDescriptor::new("id", "Int!"))
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("price", "Float!"))
            .field(FieldDescriptor::new("quantity", "Int!")),
    )?;
    registry.register_type(
        TypeDescriptor::input_object("WidgetInput")
            .input_field("name", "String!")
            .input_field("price", "Float!")
            .input_field("quantity", "Int!"),
    )?;
    registry.register_type(
        TypeDescriptor::input_object("WidgetUpdateInput")
            .input_field("id", "Int!")
            .input_field("name", "String!")
            .input_field("price", "Float!")
            .input_field("quantity", "Int!"),
    )?;

    let store = widgets.clone();
    registry.register_query(
        FieldDescriptor::new("widget", "Widget").param("id", "Int!"),
        sync_resolver(move |ctx| {
            let id: i64 = ctx.arg("id")?;
            let widget = store.get(id).ok_or("widget not found")?;
            Resolved::object(widget)
        }),
    )?;

    let store = widgets.clone();
    registry.register_query(
        FieldDescriptor::new("widgets", "[Widget!]!"),
        sync_resolver(move |_| Resolved::objects(store.list())),
    )?;

    let store = widgets.clone();
    let created = events.clone();
    registry.register_mutation(
        FieldDescriptor::new("createWidget", "Widget!").param("widget", "WidgetInput!"),
        sync_resolver(move |ctx| {
            let input: WidgetInput = ctx.arg("widget")?;
            let widget = store.insert_with(|id| Widget {
                id,
                name: input.name,
                price: input.price,
                quantity: input.quantity,
            });
            created.broadcast(&WidgetUpdate::new(widget.clone(), "created"));
            Resolved::object(widget)
        }),
    )?;

    let store = widgets;
    registry.register_mutation(
        FieldDescriptor::new("updateWidget", "Widget").param("widget", "WidgetUpdateInput!"),
        sync_resolver(move |ctx| {
            let widget: Widget = ctx.arg("widget")?;
            if widget.quantity < 0 {
                return Err("quantity cannot be negative".into());
            }
            let updated = store
                .update(widget.id, |existing| *existing = widget.clone())
                .ok_or("widget not found")?;
            events.broadcast(&WidgetUpdate::new(updated.clone(), "updated"));
            Resolved::object(updated)
        }),
    )?;
    Ok(())
}
