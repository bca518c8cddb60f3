use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One product position on a sales order, carrying the user-chosen slab
/// selection.
///
/// When `selected_lot_ids` is non-empty and resolves to positive internal
/// stock, `quantity` equals the summed on-hand quantity of those lots. A
/// stale or failed lookup never silently zeroes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// The visual slab selection; mutable pre- and post-confirmation.
    pub selected_lot_ids: Vec<Uuid>,
    /// Demand quantity, derived from the selection.
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderLine {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            selected_lot_ids: Vec::new(),
            quantity,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_selection(&self) -> bool {
        !self.selected_lot_ids.is_empty()
    }

    /// Selection as a set, for order-insensitive comparison.
    pub fn selection_set(&self) -> std::collections::HashSet<Uuid> {
        self.selected_lot_ids.iter().copied().collect()
    }
}
