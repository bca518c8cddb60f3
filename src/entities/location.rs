use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a stock location is used for. Only `Internal` locations hold
/// sellable on-hand stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LocationUsage {
    Internal,
    Customer,
    Supplier,
    Transit,
}

impl LocationUsage {
    pub fn is_internal(&self) -> bool {
        matches!(self, LocationUsage::Internal)
    }
}

/// A warehouse location. Locations form a tree through `parent_id`;
/// subtree membership is resolved by walking parents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub usage: LocationUsage,
    pub parent_id: Option<Uuid>,
}

impl Location {
    pub fn new(name: impl Into<String>, usage: LocationUsage) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            usage,
            parent_id: None,
        }
    }

    pub fn child_of(name: impl Into<String>, usage: LocationUsage, parent_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            usage,
            parent_id: Some(parent_id),
        }
    }
}
