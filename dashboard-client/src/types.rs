//! Connection state and sync update types.
//!
//! Shared by the connection manager (producer), the order cache (consumer)
//! and the dashboard facade.

use shared::message::OrderEvent;
use shared::order::Order;
use std::fmt;
use std::time::Duration;

// ============================================================================
// Connection State
// ============================================================================

/// Live-update connection state of one dashboard.
///
/// Transitions:
/// - `Idle` -> `Connecting` on start or store change
/// - `Connecting` -> `Connected` once the stream opens
/// - `Connecting` / `Connected` -> `DisconnectedRetrying` on error or close
/// - `DisconnectedRetrying` -> `Connecting` when the backoff delay elapses
/// - `DisconnectedRetrying` -> `DisconnectedPolling` once retries are exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect number `attempt` (1-based)
    DisconnectedRetrying { attempt: u32, delay: Duration },
    /// Streaming abandoned; the order list is refreshed on a fixed interval
    DisconnectedPolling,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Polling fallback is active (the UI shows its "periodic refresh" notice)
    pub fn is_polling(&self) -> bool {
        matches!(self, ConnectionState::DisconnectedPolling)
    }

    pub fn is_retrying(&self) -> bool {
        matches!(self, ConnectionState::DisconnectedRetrying { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::DisconnectedRetrying { attempt, delay } => write!(
                f,
                "disconnected-retrying (attempt {attempt} in {}ms)",
                delay.as_millis()
            ),
            ConnectionState::DisconnectedPolling => write!(f, "disconnected-polling"),
        }
    }
}

// ============================================================================
// Sync Updates
// ============================================================================

/// One cache mutation emitted by the connection manager, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// Decoded stream event
    Event { store_id: String, event: OrderEvent },
    /// Full order list from the query endpoint (polling or manual refresh)
    Snapshot { store_id: String, orders: Vec<Order> },
    /// Highlight timer of a created order elapsed
    NewFlagExpired { store_id: String, order_id: String },
}

impl SyncUpdate {
    pub fn store_id(&self) -> &str {
        match self {
            SyncUpdate::Event { store_id, .. }
            | SyncUpdate::Snapshot { store_id, .. }
            | SyncUpdate::NewFlagExpired { store_id, .. } => store_id,
        }
    }
}
