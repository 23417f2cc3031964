//! Dashboard facade
//!
//! Wires a [`ConnectionManager`] to an [`OrderCache`] and exposes the admin
//! actions (status change, delete) on top of them.

use crate::api::{DeletedOrder, OrderApi, StatusChange};
use crate::cache::OrderCache;
use crate::connection::{ConnectionManager, SyncConfig};
use crate::error::{ClientError, ClientResult};
use crate::types::{ConnectionState, SyncUpdate};
use crate::{ClientConfig, HttpClient};
use shared::message::OrderEvent;
use shared::order::{Order, OrderStatus, TableOrders};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Live order dashboard for one store at a time
pub struct Dashboard {
    api: Arc<dyn OrderApi>,
    cache: OrderCache,
    manager: ConnectionManager,
    reconciler: JoinHandle<()>,
}

impl Dashboard {
    /// Start syncing `store_id` through `api`
    pub fn start(api: Arc<dyn OrderApi>, store_id: impl Into<String>, config: SyncConfig) -> Self {
        let cache = OrderCache::new();
        let (manager, updates) = ConnectionManager::start(Arc::clone(&api), store_id, config);
        let reconciler = tokio::spawn(reconcile(cache.clone(), updates));

        Self {
            api,
            cache,
            manager,
            reconciler,
        }
    }

    /// Start syncing over HTTP with the given client configuration
    pub fn connect(
        client: &ClientConfig,
        store_id: impl Into<String>,
        config: SyncConfig,
    ) -> ClientResult<Self> {
        let http = HttpClient::new(client)?;
        Ok(Self::start(Arc::new(http), store_id, config))
    }

    pub fn store_id(&self) -> &str {
        self.manager.store_id()
    }

    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }

    /// Current store's orders
    pub fn orders(&self) -> Arc<Vec<Order>> {
        self.cache.orders(self.store_id())
    }

    /// Current store's orders grouped per table
    pub fn tables(&self) -> Vec<TableOrders> {
        self.cache.tables(self.store_id())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Streaming was abandoned and the list is refreshed periodically
    pub fn is_fallback_active(&self) -> bool {
        self.manager.state().is_polling()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    /// Fires whenever the cache changes, for any store
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.cache.subscribe()
    }

    /// Request a status change for an order of the current store.
    ///
    /// The transition is checked locally first; an invalid one never reaches
    /// the network. The cache only changes once the server confirms.
    pub async fn change_status(
        &self,
        order_id: &str,
        to: OrderStatus,
    ) -> ClientResult<StatusChange> {
        let store_id = self.store_id().to_string();
        let current = self
            .cache
            .order(&store_id, order_id)
            .ok_or_else(|| ClientError::NotFound(format!("order {order_id}")))?;

        if !current.status.can_transition_to(to) {
            return Err(ClientError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let confirmed = self.api.update_status(order_id, to).await.inspect_err(|e| {
            tracing::warn!(store_id = %store_id, order_id, "Status change rejected: {e}");
        })?;

        self.cache.apply_event(
            &store_id,
            &OrderEvent::OrderUpdated {
                order_id: confirmed.order_id.clone(),
                status: confirmed.status,
            },
        );
        tracing::info!(
            store_id = %store_id,
            order_id,
            status = %confirmed.status,
            "Order status changed"
        );
        Ok(confirmed)
    }

    /// Delete an order; the cache drops it once the server confirms
    pub async fn delete_order(&self, order_id: &str) -> ClientResult<DeletedOrder> {
        let store_id = self.store_id().to_string();
        let deleted = self.api.delete_order(order_id).await.inspect_err(|e| {
            tracing::warn!(store_id = %store_id, order_id, "Order delete rejected: {e}");
        })?;

        self.cache.apply_event(
            &store_id,
            &OrderEvent::OrderDeleted {
                order_id: order_id.to_string(),
            },
        );
        tracing::info!(store_id = %store_id, order_id, "Order deleted");
        Ok(deleted)
    }

    /// Re-fetch the full order list now
    pub async fn refresh(&self) -> ClientResult<usize> {
        self.manager.refresh().await
    }

    /// Show another store; its orders stream in once the new connection opens
    pub fn switch_store(&mut self, store_id: impl Into<String>) -> ClientResult<()> {
        self.manager.switch_store(store_id)
    }

    /// Stop syncing and wait for background tasks to finish
    pub async fn stop(self) {
        self.manager.stop().await;
        if let Err(e) = self.reconciler.await {
            tracing::error!("Order reconciler panicked: {e}");
        }
    }
}

/// Apply updates to the cache in the order the manager emitted them
async fn reconcile(cache: OrderCache, mut updates: mpsc::Receiver<SyncUpdate>) {
    while let Some(update) = updates.recv().await {
        cache.apply(update);
    }
    tracing::debug!("Update channel closed, reconciler finished");
}
