//! Per-table dashboard view
//!
//! Derived from the flat order list on every read; never stored.

use super::types::Order;
use serde::Serialize;
use std::collections::HashMap;

/// How many recent orders a table card shows
pub const LATEST_ORDER_COUNT: usize = 3;

/// Orders of one table, aggregated for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOrders {
    pub table_id: String,
    pub table_number: u32,
    /// Sum of the contained orders' totals
    pub total_amount: i64,
    /// Orders in cache order
    pub orders: Vec<Order>,
    /// Most recent orders first, at most [`LATEST_ORDER_COUNT`]
    pub latest_orders: Vec<Order>,
    /// Any contained order still carries the highlight marker
    pub has_new_order: bool,
}

impl TableOrders {
    fn empty(table_id: &str, table_number: u32) -> Self {
        Self {
            table_id: table_id.to_string(),
            table_number,
            total_amount: 0,
            orders: Vec::new(),
            latest_orders: Vec::new(),
            has_new_order: false,
        }
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Group orders by table id, sorted by table number.
pub fn group_by_table(orders: &[Order]) -> Vec<TableOrders> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut tables: Vec<TableOrders> = Vec::new();

    for order in orders {
        let slot = *index.entry(order.table_id.as_str()).or_insert_with(|| {
            tables.push(TableOrders::empty(&order.table_id, order.table_number));
            tables.len() - 1
        });
        let table = &mut tables[slot];
        table.total_amount = table.total_amount.saturating_add(order.total_amount);
        table.has_new_order |= order.is_new;
        table.orders.push(order.clone());
    }

    for table in &mut tables {
        let mut latest = table.orders.clone();
        latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        latest.truncate(LATEST_ORDER_COUNT);
        table.latest_orders = latest;
    }

    tables.sort_by_key(|t| t.table_number);
    tables
}
