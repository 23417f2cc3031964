//! Order domain
//!
//! - Types: orders, line items and the status state machine
//! - Table view: orders grouped per table for the dashboard
//! - Reducer: pure folding of stream events into an order list

pub mod reducer;
pub mod table;
pub mod types;

// Re-exports
pub use reducer::{apply_event, clear_new_flag};
pub use table::{LATEST_ORDER_COUNT, TableOrders, group_by_table};
pub use types::*;
