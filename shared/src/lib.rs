//! Shared types for the order dashboard
//!
//! Wire and domain types used by dashboard clients: orders and their status
//! state machine, the per-table dashboard view, the order event stream
//! decoder, and the pure reducers that fold events into an order list.

pub mod message;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use message::{DecodeError, OrderEvent};
pub use order::{Order, OrderItem, OrderStatus, TableOrders};
