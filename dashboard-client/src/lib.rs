//! Dashboard Client - live order dashboard sync for the store admin screen
//!
//! Keeps a per-store order cache in sync with the order API: a server-sent
//! event stream with exponential-backoff reconnects, falling back to periodic
//! full refreshes when the stream stays down.

pub mod api;
pub mod cache;
pub mod config;
pub mod connection;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod sse;
pub mod types;

pub use api::{DeletedOrder, OrderApi, StatusChange};
pub use cache::OrderCache;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, SyncConfig};
pub use dashboard::Dashboard;
pub use error::{ClientError, ClientResult};
pub use http::HttpClient;
pub use sse::{FrameStream, SseFrame};
pub use types::{ConnectionState, SyncUpdate};

// Re-export shared types for convenience
pub use shared::message::OrderEvent;
pub use shared::order::{Order, OrderItem, OrderStatus, TableOrders};
