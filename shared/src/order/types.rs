//! Order model and status state machine

use crate::util::{id_from_string_or_number, timestamp_lenient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order status
///
/// The server's own labels (`대기중`, `준비중`, `완료`) are accepted on input;
/// output always uses the lowercase English names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    #[serde(alias = "대기중")]
    Pending,
    #[serde(alias = "준비중")]
    Preparing,
    #[serde(alias = "완료")]
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Completed,
    ];

    /// Statuses reachable from `self` in one step
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Preparing, OrderStatus::Completed],
            OrderStatus::Preparing => &[OrderStatus::Completed],
            OrderStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unrecognised status label
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "대기중" => Ok(OrderStatus::Pending),
            "preparing" | "준비중" => Ok(OrderStatus::Preparing),
            "completed" | "완료" => Ok(OrderStatus::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Whether `from -> to` appears in the status transition table.
///
/// Used both to gate outbound status changes and to screen inbound
/// `order_updated` events.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from.can_transition_to(to)
}

/// Order line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(alias = "menu_id", deserialize_with = "id_from_string_or_number")]
    pub menu_id: String,
    #[serde(rename = "menuName", alias = "menu_name", alias = "name")]
    pub name: String,
    /// Unit price in minor currency units
    #[serde(rename = "unitPrice", alias = "unit_price", alias = "price")]
    pub unit_price: i64,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<i64>,
}

impl OrderItem {
    /// Line total, preferring the server-computed subtotal
    pub fn line_total(&self) -> i64 {
        self.subtotal
            .unwrap_or_else(|| self.unit_price.saturating_mul(i64::from(self.quantity)))
    }
}

/// Order as shown on the live dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "order_id", deserialize_with = "id_from_string_or_number")]
    pub order_id: String,
    /// Empty when the order arrived nested under its table (filled in by the caller)
    #[serde(
        default,
        alias = "table_id",
        deserialize_with = "id_from_string_or_number"
    )]
    pub table_id: String,
    #[serde(default, alias = "table_number")]
    pub table_number: u32,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Total amount in minor currency units
    #[serde(alias = "total_amount")]
    pub total_amount: i64,
    pub status: OrderStatus,
    #[serde(
        rename = "orderTime",
        alias = "order_time",
        alias = "createdAt",
        alias = "created_at",
        deserialize_with = "timestamp_lenient"
    )]
    pub created_at: DateTime<Utc>,
    /// Transient highlight marker, set for a few seconds after a creation push
    #[serde(default, alias = "is_new")]
    pub is_new: bool,
}

impl Order {
    /// Copy of this order with a different status
    pub fn with_status(&self, status: OrderStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Copy of this order with the highlight marker set or cleared
    pub fn with_new_flag(&self, is_new: bool) -> Self {
        Self {
            is_new,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;

        assert!(is_valid_transition(Pending, Completed));
        assert!(is_valid_transition(Pending, Preparing));
        assert!(is_valid_transition(Preparing, Completed));

        assert!(!is_valid_transition(Completed, Pending));
        assert!(!is_valid_transition(Preparing, Pending));
        assert!(!is_valid_transition(Completed, Preparing));

        // Staying put is not a transition
        for status in OrderStatus::ALL {
            assert!(!is_valid_transition(status, status));
        }

        assert!(Completed.is_terminal());
        assert!(!Pending.is_terminal());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!("preparing".parse::<OrderStatus>(), Ok(OrderStatus::Preparing));
        assert_eq!("완료".parse::<OrderStatus>(), Ok(OrderStatus::Completed));
        assert!("cancelled".parse::<OrderStatus>().is_err());

        let korean: OrderStatus = serde_json::from_str(r#""준비중""#).unwrap();
        assert_eq!(korean, OrderStatus::Preparing);
        assert_eq!(
            serde_json::to_string(&OrderStatus::Pending).unwrap(),
            r#""pending""#
        );
    }

    #[test]
    fn test_order_accepts_stream_and_query_spellings() {
        let stream = r#"{
            "orderId": "101",
            "tableId": "3",
            "tableNumber": 3,
            "items": [{"menuId": "m1", "menuName": "Bibimbap", "unitPrice": 9000, "quantity": 1}],
            "totalAmount": 9000,
            "status": "pending",
            "orderTime": "2025-03-01T12:00:00Z"
        }"#;
        let query = r#"{
            "order_id": 101,
            "total_amount": 9000,
            "status": "대기중",
            "order_time": "2025-03-01T12:00:00",
            "items": [{"order_item_id": 1, "menu_id": 7, "menu_name": "Bibimbap",
                       "quantity": 1, "unit_price": 9000, "subtotal": 9000}]
        }"#;

        let a: Order = serde_json::from_str(stream).unwrap();
        let b: Order = serde_json::from_str(query).unwrap();

        assert_eq!(a.order_id, b.order_id);
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(a.status, b.status);
        assert_eq!(a.table_id, "3");
        assert!(b.table_id.is_empty());
        assert!(!a.is_new);
        assert_eq!(b.items[0].menu_id, "7");
        assert_eq!(b.items[0].line_total(), 9000);
    }

    #[test]
    fn test_line_total_without_subtotal() {
        let item = OrderItem {
            menu_id: "m1".into(),
            name: "Tteokbokki".into(),
            unit_price: 4500,
            quantity: 2,
            subtotal: None,
        };
        assert_eq!(item.line_total(), 9000);

        let bulk = OrderItem {
            unit_price: i64::MAX / 2,
            quantity: 3,
            ..item
        };
        assert_eq!(bulk.line_total(), i64::MAX);
    }
}
