use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked stone slab. One lot is one physical slab: it sells as a single
/// indivisible unit and its descriptive attributes never change due to
/// reservation activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    /// Lot/serial number shown to the user (e.g. "L-2024-0042").
    pub name: String,
    pub product_id: Uuid,
    /// Quarry block the slab was cut from.
    pub block: Option<String>,
    /// Bundle within the block.
    pub bundle: Option<String>,
    /// Shipping container reference.
    pub container: Option<String>,
    /// Customs entry document number.
    pub customs_entry: Option<String>,
    /// Slab height in the warehouse unit of measure.
    pub height: Option<Decimal>,
    /// Slab width in the warehouse unit of measure.
    pub width: Option<Decimal>,
    /// Slab thickness in the warehouse unit of measure.
    pub thickness: Option<Decimal>,
    /// Material kind (e.g. "granite", "quartzite").
    pub slab_kind: Option<String>,
    pub color: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    pub fn new(name: impl Into<String>, product_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            product_id,
            block: None,
            bundle: None,
            container: None,
            customs_entry: None,
            height: None,
            width: None,
            thickness: None,
            slab_kind: None,
            color: None,
            supplier_id: None,
            photo_url: None,
            created_at: Utc::now(),
        }
    }

    /// Face area (height x width) when both dimensions are known.
    pub fn face_area(&self) -> Option<Decimal> {
        match (self.height, self.width) {
            (Some(h), Some(w)) => Some(h * w),
            _ => None,
        }
    }
}
