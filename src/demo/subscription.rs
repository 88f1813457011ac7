//! Live feeds: widget and product changes, simulated order progress and a
//! clock.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::{StreamExt, future};
use serde::Serialize;
use serde_json::json;
use tokio::time::{Instant, interval_at, sleep};
use tokio_stream::wrappers::IntervalStream;

use crate::context::ExecutionContext;
use crate::error::RegistryError;
use crate::resolver::{stream_resolver, sync_resolver};
use crate::schema_registry::SchemaRegistry;
use crate::subscription::{Broadcaster, Filter};
use crate::types::{FieldDescriptor, TypeDescriptor};
use crate::value::Resolved;

use super::product::ProductUpdate;
use super::scalars::Timestamp;
use super::widget::WidgetUpdate;

const DEFAULT_TICK_MS: u64 = 1000;
const MIN_TICK_MS: i64 = 100;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: String,
    pub message: String,
    pub timestamp: Timestamp,
}

impl OrderUpdate {
    fn new(order_id: &str, status: &str, message: &str) -> Self {
        OrderUpdate {
            order_id: order_id.to_string(),
            status: status.to_string(),
            message: message.to_string(),
            timestamp: Timestamp::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct TimeUpdate {
    timestamp: i64,
    formatted: String,
}

impl TimeUpdate {
    fn at(now: DateTime<Utc>) -> Self {
        TimeUpdate {
            timestamp: now.timestamp(),
            formatted: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Feeds for the subscription root.
#[derive(Clone)]
pub struct Feeds {
    pub widgets: Broadcaster<WidgetUpdate>,
    pub products: Broadcaster<ProductUpdate>,
    pub orders: Broadcaster<OrderUpdate>,
}

impl Feeds {
    pub fn new(buffer_size: usize) -> Self {
        Feeds {
            widgets: Broadcaster::new(buffer_size),
            products: Broadcaster::new(buffer_size),
            orders: Broadcaster::new(buffer_size),
        }
    }

    pub fn close(&self) {
        self.widgets.close();
        self.products.close();
        self.orders.close();
    }
}

/// Plays an order through processing, shipping and delivery unless the
/// subscriber goes away first.
async fn simulate_order(orders: Broadcaster<OrderUpdate>, order_id: String, ctx: ExecutionContext) {
    let steps = [
        (100, "processing", "Order is being processed"),
        (2000, "shipped", "Order has been shipped"),
        (3000, "delivered", "Order has been delivered"),
    ];
    for (delay_ms, status, message) in steps {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return,
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }
        orders.broadcast(&OrderUpdate::new(&order_id, status, message));
    }
}

fn tick_interval(interval_ms: i64) -> Duration {
    if interval_ms < MIN_TICK_MS {
        Duration::from_millis(DEFAULT_TICK_MS)
    } else {
        Duration::from_millis(interval_ms.unsigned_abs())
    }
}

fn event_object<E: Serialize + Send + Sync + 'static>(event: E) -> future::Ready<Option<Resolved>> {
    future::ready(Resolved::object(event).ok())
}

fn register_types(registry: &mut SchemaRegistry) -> Result<(), RegistryError> {
    registry.register_type(
        TypeDescriptor::object("WidgetUpdate")
            .field(FieldDescriptor::new("widget", "Widget!"))
            .field(FieldDescriptor::new("action", "String!"))
            .field(FieldDescriptor::new("timestamp", "DateTime!")),
    )?;
    registry.register_type(
        TypeDescriptor::object("ProductUpdate")
            .field(FieldDescriptor::new("product", "Product!"))
            .field(FieldDescriptor::new("action", "String!"))
            .field(FieldDescriptor::new("timestamp", "DateTime!")),
    )?;
    registry.register_type(
        TypeDescriptor::object("OrderUpdate")
            .field(FieldDescriptor::new("orderId", "String!"))
            .field(FieldDescriptor::new("status", "String!"))
            .field(FieldDescriptor::new("message", "String!"))
            .field(FieldDescriptor::new("timestamp", "DateTime!")),
    )?;
    registry.register_type(
        TypeDescriptor::object("TimeUpdate")
            .field(FieldDescriptor::new("timestamp", "Int!"))
            .field(FieldDescriptor::new("formatted", "String!")),
    )
}

pub(super) fn register(registry: &mut SchemaRegistry, feeds: &Feeds) -> Result<(), RegistryError> {
    register_types(registry)?;

    registry.register_query(
        FieldDescriptor::new("greeting", "String!").param_with_default(
            "name",
            "String",
            json!("World"),
        ),
        sync_resolver(|ctx| {
            let name = ctx.opt_arg::<String>("name")?.unwrap_or_else(|| "World".to_string());
            Ok(Resolved::from(format!("Hello, {name}!")))
        }),
    )?;

    let widgets = feeds.widgets.clone();
    registry.register_subscription(
        FieldDescriptor::new("widgetUpdates", "WidgetUpdate!")
            .param_with_default("widgetId", "Int", json!(-1))
            .description("Use -1 to follow every widget"),
        stream_resolver(move |ctx| {
            let widgets = widgets.clone();
            async move {
                let filter = Filter::from_sentinel(ctx.opt_arg("widgetId")?.unwrap_or(-1));
                let events = widgets.subscribe_with_greeting(
                    move |update: &WidgetUpdate| filter.matches(&update.widget.id),
                    WidgetUpdate::connected(),
                    ctx.context(),
                );
                Ok(events.filter_map(event_object))
            }
        }),
    )?;

    let products = feeds.products.clone();
    registry.register_subscription(
        FieldDescriptor::new("productUpdates", "ProductUpdate!")
            .param_with_default("categoryId", "Int", json!(-1))
            .description("Use -1 to follow every category"),
        stream_resolver(move |ctx| {
            let products = products.clone();
            async move {
                let filter = Filter::from_sentinel(ctx.opt_arg("categoryId")?.unwrap_or(-1));
                let events = products.subscribe(
                    move |update: &ProductUpdate| filter.matches(&update.product.category_id),
                    ctx.context(),
                );
                Ok(events.filter_map(event_object))
            }
        }),
    )?;

    let orders = feeds.orders.clone();
    registry.register_subscription(
        FieldDescriptor::new("orderStatusUpdates", "OrderUpdate!").param("orderId", "String!"),
        stream_resolver(move |ctx| {
            let orders = orders.clone();
            async move {
                let order_id: String = ctx.arg("orderId")?;
                if order_id.is_empty() {
                    return Err("orderId is required".into());
                }
                let filter = Filter::Matching(order_id.clone());
                let events = orders.subscribe(
                    move |update: &OrderUpdate| filter.matches(&update.order_id),
                    ctx.context(),
                );
                tokio::spawn(simulate_order(orders, order_id, ctx.context().clone()));
                Ok(events.filter_map(event_object))
            }
        }),
    )?;

    registry.register_subscription(
        FieldDescriptor::new("currentTime", "TimeUpdate!")
            .param_with_default("intervalMs", "Int", json!(1000)),
        stream_resolver(|ctx| async move {
            let period = tick_interval(ctx.opt_arg("intervalMs")?.unwrap_or(1000));
            let ticks = IntervalStream::new(interval_at(Instant::now() + period, period));
            Ok(ticks.filter_map(|_| event_object(TimeUpdate::at(Utc::now()))))
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_intervals_fall_back_to_one_second() {
        assert_eq!(tick_interval(10), Duration::from_secs(1));
        assert_eq!(tick_interval(-5), Duration::from_secs(1));
        assert_eq!(tick_interval(250), Duration::from_millis(250));
    }

    #[test]
    fn time_updates_carry_both_forms() {
        let now = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let update = TimeUpdate::at(now);
        assert_eq!(update.timestamp, 1_704_110_400);
        assert_eq!(update.formatted, "2024-01-01T12:00:00Z");
    }

    #[tokio::test(start_paused = true)]
    async fn orders_progress_until_delivered() {
        let orders = Broadcaster::new(8);
        let ctx = ExecutionContext::new();
        let filter = Filter::Matching("A-1".to_string());
        let events = orders.subscribe(
            move |update: &OrderUpdate| filter.matches(&update.order_id),
            &ctx,
        );
        tokio::spawn(simulate_order(orders.clone(), "A-1".to_string(), ctx.clone()));
        tokio::spawn(simulate_order(orders, "B-2".to_string(), ctx.clone()));

        let statuses: Vec<_> = events.take(3).map(|update| update.status).collect().await;
        assert_eq!(statuses, vec!["processing", "shipped", "delivered"]);
    }
}
