//! Order data models and API request/response types.
//!
//! This module defines:
//! - `Order`: Database entity with a JSONB snapshot of its line items
//! - `CreateOrderRequest`: cart submitted by the client
//! - `OrderItem`: a priced line, immutable once stored

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Currency used when no priced line declares one.
pub const DEFAULT_CURRENCY: &str = "₽";

/// A priced order line as persisted in `orders.items`.
///
/// `price` is the unit price resolved from the catalog at order time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: String,
    pub qty: i32,
    pub volume: f64,
    pub mix: String,
    pub price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.qty)
    }
}

/// Represents an order record from the database.
///
/// # Database Table
///
/// Maps to the `orders` table. `fulfilled` flips false → true once, with a
/// stock side effect handled by the order workflow.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,

    /// NULL for guest orders
    pub user_id: Option<String>,

    pub is_anonymous: bool,

    pub email: String,

    pub display_name: String,

    pub phone: String,

    pub items: Json<Vec<OrderItem>>,

    /// Σ price × qty over `items`, computed server-side
    pub total: Decimal,

    pub currency: String,

    pub channel: String,

    pub delivery_method: String,

    pub delivery_address: String,

    pub fulfilled: bool,

    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<String>,
    pub is_anonymous: bool,
    pub email: String,
    pub display_name: String,
    pub phone: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub currency: String,
    pub channel: String,
    pub delivery_method: String,
    pub delivery_address: String,
}

/// One cart line as submitted by the client.
///
/// Any client-sent `price` is ignored; the catalog price is authoritative.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartLine {
    #[serde(default)]
    pub id: String,

    #[serde(default, alias = "quantity")]
    pub qty: i32,

    #[serde(default)]
    pub volume: f64,

    #[serde(default)]
    pub mix: String,
}

/// Optional contact overrides. Empty fields fall back to the account profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryInfo {
    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub address: String,
}

/// Request body for `POST /api/orders`.
///
/// # JSON Example
///
/// ```json
/// {
///   "items": [{ "id": "p1", "qty": 2, "volume": 5, "mix": "" }],
///   "contact": { "name": "Alice", "phone": "+7 900 123-45-67" },
///   "delivery": { "method": "courier", "address": "Moscow" },
///   "channel": "web"
/// }
/// ```
///
/// A client-side `total` or `currency` may be present and is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<CartLine>,

    #[serde(default)]
    pub contact: ContactInfo,

    #[serde(default)]
    pub delivery: DeliveryInfo,

    #[serde(default)]
    pub channel: String,
}

/// Response body for `POST /api/orders` (201 Created).
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderCreatedResponse {
    pub id: Uuid,
    pub total: Decimal,
    pub currency: String,
}

/// Request body for `PUT /api/orders/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub fulfilled: bool,
}

/// Full order view returned to admins.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub is_anonymous: bool,
    pub email: String,
    pub display_name: String,
    pub phone: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub currency: String,
    pub channel: String,
    pub delivery_method: String,
    pub delivery_address: String,
    pub fulfilled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            is_anonymous: order.is_anonymous,
            email: order.email,
            display_name: order.display_name,
            phone: order.phone,
            items: order.items.0,
            total: order.total,
            currency: order.currency,
            channel: order.channel,
            delivery_method: order.delivery_method,
            delivery_address: order.delivery_address,
            fulfilled: order.fulfilled,
            created_at: order.created_at,
        }
    }
}
