//! Per-store order cache
//!
//! Each store maps to an immutable `Arc<Vec<Order>>`. Updates compute a new
//! list from the current one and swap it in under the map's entry lock, so a
//! reader always sees one whole snapshot, never a half-applied update.

use crate::types::SyncUpdate;
use dashmap::DashMap;
use shared::message::OrderEvent;
use shared::order::{self, Order, TableOrders};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct CacheInner {
    stores: DashMap<String, Arc<Vec<Order>>>,
    revision: watch::Sender<u64>,
}

/// Shared handle to the order cache; clones point at the same data
#[derive(Debug, Clone)]
pub struct OrderCache {
    inner: Arc<CacheInner>,
}

impl OrderCache {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(CacheInner {
                stores: DashMap::new(),
                revision,
            }),
        }
    }

    /// Current snapshot of a store's orders (empty if never loaded)
    pub fn orders(&self, store_id: &str) -> Arc<Vec<Order>> {
        self.inner
            .stores
            .get(store_id)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default()
    }

    pub fn order(&self, store_id: &str, order_id: &str) -> Option<Order> {
        self.orders(store_id)
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
    }

    /// Orders grouped per table, sorted by table number
    pub fn tables(&self, store_id: &str) -> Vec<TableOrders> {
        order::group_by_table(&self.orders(store_id))
    }

    /// Replace a store's list wholesale
    pub fn replace(&self, store_id: &str, orders: Vec<Order>) {
        self.update_with(store_id, |_| orders);
    }

    /// Fold one stream event into a store's list
    pub fn apply_event(&self, store_id: &str, event: &OrderEvent) {
        self.update_with(store_id, |current| order::apply_event(current, event));
    }

    /// Apply an update from the connection manager
    pub fn apply(&self, update: SyncUpdate) {
        match update {
            SyncUpdate::Event { store_id, event } => {
                tracing::debug!(store_id = %store_id, kind = event.kind(), "Applying order event");
                self.apply_event(&store_id, &event);
            }
            SyncUpdate::Snapshot { store_id, orders } => {
                tracing::debug!(
                    store_id = %store_id,
                    count = orders.len(),
                    "Replacing order snapshot"
                );
                self.replace(&store_id, orders);
            }
            SyncUpdate::NewFlagExpired { store_id, order_id } => {
                self.update_with(&store_id, |current| order::clear_new_flag(current, &order_id));
            }
        }
    }

    /// Revision counter, bumped on every replacement
    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Watch the revision counter to learn about cache changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    fn update_with(&self, store_id: &str, f: impl FnOnce(&[Order]) -> Vec<Order>) {
        {
            let mut slot = self.inner.stores.entry(store_id.to_string()).or_default();
            let next = f(slot.as_slice());
            *slot = Arc::new(next);
        }
        self.bump();
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new()
    }
}
