use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// On-hand stock of one product (and optionally one lot) at one location.
///
/// Invariant: `reserved_quantity <= quantity`. The ledger maintains
/// `reserved_quantity` as reservations are created and deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quant {
    pub id: Uuid,
    /// None for untracked stock.
    pub lot_id: Option<Uuid>,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub reserved_quantity: Decimal,
    /// Arrival timestamp; FIFO reservation walks quants oldest-first.
    pub received_at: DateTime<Utc>,
}

impl Quant {
    pub fn new(
        lot_id: Option<Uuid>,
        product_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lot_id,
            product_id,
            location_id,
            quantity,
            reserved_quantity: Decimal::ZERO,
            received_at: Utc::now(),
        }
    }

    pub fn available_quantity(&self) -> Decimal {
        self.quantity - self.reserved_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn available_quantity_subtracts_reserved() {
        let mut quant = Quant::new(None, Uuid::new_v4(), Uuid::new_v4(), dec!(8));
        assert_eq!(quant.available_quantity(), dec!(8));

        quant.reserved_quantity = dec!(3);
        assert_eq!(quant.available_quantity(), dec!(5));
    }
}
