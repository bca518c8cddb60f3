//! Lot Directory Service
//!
//! Read-only lookup that answers one question: where can a given slab be
//! reserved from right now? Stock already sitting under the fulfilling
//! location wins; stock in any other internal location is an acceptable
//! fallback. Stock at customers, suppliers or in transit never qualifies.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::Quant;
use crate::errors::ServiceError;
use crate::store::StockLedger;

/// Service resolving lot selections to concrete quants.
#[derive(Clone)]
pub struct LotDirectory {
    ledger: Arc<dyn StockLedger>,
}

impl LotDirectory {
    pub fn new(ledger: Arc<dyn StockLedger>) -> Self {
        Self { ledger }
    }

    /// Finds a quant holding positive on-hand stock of `lot_id`.
    ///
    /// Quants under `within_location` are preferred over quants in other
    /// internal locations; within a bucket the oldest arrival wins. Returns
    /// `None` when the lot has no positive internal stock anywhere, which
    /// callers treat as "cannot reserve, do not block".
    #[instrument(skip(self))]
    pub async fn find_available_quant(
        &self,
        lot_id: Uuid,
        product_id: Uuid,
        within_location: Uuid,
    ) -> Result<Option<Quant>, ServiceError> {
        let mut in_subtree: Vec<Quant> = Vec::new();
        let mut internal_elsewhere: Vec<Quant> = Vec::new();

        for quant in self.ledger.quants_for_lot(lot_id).await? {
            if quant.product_id != product_id || quant.quantity <= Decimal::ZERO {
                continue;
            }
            if self
                .ledger
                .location_in_subtree(quant.location_id, within_location)
                .await?
            {
                in_subtree.push(quant);
            } else if self.is_internal(quant.location_id).await? {
                internal_elsewhere.push(quant);
            }
        }

        in_subtree.sort_by_key(|quant| (quant.received_at, quant.id));
        internal_elsewhere.sort_by_key(|quant| (quant.received_at, quant.id));

        Ok(in_subtree
            .into_iter()
            .next()
            .or_else(|| internal_elsewhere.into_iter().next()))
    }

    async fn is_internal(&self, location_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .ledger
            .get_location(location_id)
            .await?
            .map(|location| location.usage.is_internal())
            .unwrap_or(false))
    }
}
