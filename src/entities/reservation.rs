use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One reserved stock detail on an operation: this much of this lot, taken
/// from this location. A reservation is live for as long as the row exists;
/// releasing stock deletes the row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub product_id: Uuid,
    /// None for untracked stock.
    pub lot_id: Option<Uuid>,
    pub source_location_id: Uuid,
    pub dest_location_id: Uuid,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
}
