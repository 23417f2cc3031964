//! Order API seam
//!
//! The dashboard talks to the server through [`OrderApi`]. [`crate::HttpClient`]
//! is the network implementation; tests drive the connection manager with
//! scripted ones.

use crate::error::ClientResult;
use crate::sse::FrameStream;
use async_trait::async_trait;
use serde::Deserialize;
use shared::order::{Order, OrderStatus};
use shared::util::id_from_string_or_number;

/// External order endpoints the dashboard depends on
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Open the store-scoped event stream
    async fn open_stream(&self, store_id: &str) -> ClientResult<FrameStream>;

    /// Fetch the full current order list of a store
    async fn fetch_orders(&self, store_id: &str) -> ClientResult<Vec<Order>>;

    /// Ask the server to change an order's status
    async fn update_status(&self, order_id: &str, status: OrderStatus)
    -> ClientResult<StatusChange>;

    /// Ask the server to delete an order
    async fn delete_order(&self, order_id: &str) -> ClientResult<DeletedOrder>;
}

/// Server confirmation of a status change
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusChange {
    #[serde(alias = "orderId", deserialize_with = "id_from_string_or_number")]
    pub order_id: String,
    pub status: OrderStatus,
}

/// Server confirmation of a deletion
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeletedOrder {
    #[serde(alias = "orderId", deserialize_with = "id_from_string_or_number")]
    pub order_id: String,
    #[serde(
        default,
        alias = "tableId",
        deserialize_with = "id_from_string_or_number"
    )]
    pub table_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of the order query endpoint
///
/// Either a flat order list or the admin endpoint's per-table grouping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OrdersPayload {
    Flat(Vec<Order>),
    Grouped(GroupedOrders),
}

#[derive(Debug, Deserialize)]
pub struct GroupedOrders {
    #[serde(default)]
    pub tables: Vec<TableBlock>,
}

#[derive(Debug, Deserialize)]
pub struct TableBlock {
    #[serde(alias = "tableId", deserialize_with = "id_from_string_or_number")]
    pub table_id: String,
    #[serde(alias = "tableNumber")]
    pub table_number: u32,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl OrdersPayload {
    /// Flatten into the cache's order list, stamping table fields on nested orders
    pub fn into_orders(self) -> Vec<Order> {
        match self {
            OrdersPayload::Flat(orders) => orders,
            OrdersPayload::Grouped(grouped) => grouped
                .tables
                .into_iter()
                .flat_map(|table| {
                    let TableBlock {
                        table_id,
                        table_number,
                        orders,
                    } = table;
                    orders.into_iter().map(move |mut order| {
                        if order.table_id.is_empty() {
                            order.table_id = table_id.clone();
                        }
                        if order.table_number == 0 {
                            order.table_number = table_number;
                        }
                        order
                    })
                })
                .collect(),
        }
    }
}
