use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a warehouse operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Outgoing,
    Incoming,
    Internal,
}

/// Warehouse operation lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Draft,
    Waiting,
    Confirmed,
    PartiallyAvailable,
    Assigned,
    Done,
    Cancelled,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Draft => "draft",
            OperationState::Waiting => "waiting",
            OperationState::Confirmed => "confirmed",
            OperationState::PartiallyAvailable => "partially_available",
            OperationState::Assigned => "assigned",
            OperationState::Done => "done",
            OperationState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(OperationState::Draft),
            "waiting" => Some(OperationState::Waiting),
            "confirmed" => Some(OperationState::Confirmed),
            "partially_available" => Some(OperationState::PartiallyAvailable),
            "assigned" => Some(OperationState::Assigned),
            "done" => Some(OperationState::Done),
            "cancelled" => Some(OperationState::Cancelled),
            _ => None,
        }
    }

    /// Still participates in reconciliation and sync.
    pub fn is_active(&self) -> bool {
        !matches!(self, OperationState::Done | OperationState::Cancelled)
    }

    /// Reservations on this operation reflect a settled picking decision,
    /// safe to propagate back to the sales side.
    pub fn is_reservation_stable(&self) -> bool {
        matches!(self, OperationState::Assigned | OperationState::Done)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A warehouse stock operation (one product movement for an order).
/// Created by the host's default confirmation flow, never by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub order_id: Uuid,
    /// The order line this operation fulfills, when known.
    pub line_id: Option<Uuid>,
    pub product_id: Uuid,
    pub kind: OperationKind,
    pub state: OperationState,
    pub source_location_id: Uuid,
    pub dest_location_id: Uuid,
    /// Demand quantity to move.
    pub demand: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Operation {
    pub fn outgoing(
        order_id: Uuid,
        line_id: Option<Uuid>,
        product_id: Uuid,
        source_location_id: Uuid,
        dest_location_id: Uuid,
        demand: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            line_id,
            product_id,
            kind: OperationKind::Outgoing,
            state: OperationState::Confirmed,
            source_location_id,
            dest_location_id,
            demand,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
