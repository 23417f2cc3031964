//! Order list reducers
//!
//! Every function takes the current list by reference and returns a fresh
//! one. The input is never mutated, so readers holding the previous snapshot
//! keep a consistent view while an update is being applied.

use super::types::{Order, OrderStatus};
use crate::message::OrderEvent;

/// Fold one stream event into an order list.
pub fn apply_event(orders: &[Order], event: &OrderEvent) -> Vec<Order> {
    match event {
        OrderEvent::Initial { orders: snapshot } => snapshot.clone(),
        OrderEvent::OrderCreated { order } => insert_created(orders, order),
        OrderEvent::OrderUpdated { order_id, status } => update_status(orders, order_id, *status),
        OrderEvent::OrderDeleted { order_id } => orders
            .iter()
            .filter(|o| &o.order_id != order_id)
            .cloned()
            .collect(),
        OrderEvent::SessionEnded { table_id } => orders
            .iter()
            .filter(|o| &o.table_id != table_id)
            .cloned()
            .collect(),
    }
}

/// Append a freshly created order with the highlight marker set.
///
/// A re-delivered creation for an id already present replaces that entry in
/// place instead of duplicating it.
fn insert_created(orders: &[Order], created: &Order) -> Vec<Order> {
    let fresh = created.with_new_flag(true);
    let mut next: Vec<Order> = Vec::with_capacity(orders.len() + 1);
    let mut replaced = false;
    for order in orders {
        if order.order_id == created.order_id {
            next.push(fresh.clone());
            replaced = true;
        } else {
            next.push(order.clone());
        }
    }
    if !replaced {
        next.push(fresh);
    }
    next
}

/// Replace only the status of the matching order.
///
/// Unknown ids and transitions outside the status table leave the list as is.
fn update_status(orders: &[Order], order_id: &str, status: OrderStatus) -> Vec<Order> {
    orders
        .iter()
        .map(|order| {
            if order.order_id != order_id || order.status == status {
                return order.clone();
            }
            if !order.status.can_transition_to(status) {
                tracing::warn!(
                    order_id = %order_id,
                    from = %order.status,
                    to = %status,
                    "Ignoring status update outside the transition table"
                );
                return order.clone();
            }
            order.with_status(status)
        })
        .collect()
}

/// Clear the highlight marker of one order. Absent ids are a no-op.
pub fn clear_new_flag(orders: &[Order], order_id: &str) -> Vec<Order> {
    orders
        .iter()
        .map(|order| {
            if order.order_id == order_id && order.is_new {
                order.with_new_flag(false)
            } else {
                order.clone()
            }
        })
        .collect()
}
