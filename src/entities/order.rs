use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sales order lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Draft,
    Confirmed,
    Done,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Draft => "draft",
            OrderState::Confirmed => "confirmed",
            OrderState::Done => "done",
            OrderState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(OrderState::Draft),
            "confirmed" => Some(OrderState::Confirmed),
            "done" => Some(OrderState::Done),
            "cancelled" => Some(OrderState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sales order. Owns its order lines (held in the order store) and knows
/// the fulfillment route its outgoing operations run on: stock is taken from
/// under `source_location_id` and shipped to `dest_location_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub state: OrderState,
    /// Root of the warehouse zone this order is fulfilled from.
    pub source_location_id: Uuid,
    /// Customer-side destination for outgoing operations.
    pub dest_location_id: Uuid,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        order_number: impl Into<String>,
        customer_id: Uuid,
        source_location_id: Uuid,
        dest_location_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_number: order_number.into(),
            customer_id,
            state: OrderState::Draft,
            source_location_id,
            dest_location_id,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == OrderState::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_state_conversion() {
        assert_eq!(OrderState::Draft.as_str(), "draft");
        assert_eq!(OrderState::Confirmed.as_str(), "confirmed");
        assert_eq!(
            OrderState::from_str("cancelled"),
            Some(OrderState::Cancelled)
        );
        assert_eq!(OrderState::from_str("unknown"), None);
    }
}
