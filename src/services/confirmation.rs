/*!
# Confirmation Flow Seam

The host system owns order confirmation: it creates the outgoing operations
and whatever baseline reservations its own policy dictates. The reconciler
drives that flow through the [`ConfirmationFlow`] trait and then rewrites
its reservation result, so the trait implementation must never assume its
lot choices survive.

[`FifoConfirmation`] is the reference implementation: oldest internal stock
first, blind to line-level lot selections, exactly the behavior the
reconciler exists to override.

[`AutoAssignCleaner`] is the optional second seam: a host hook that strips
every baseline reservation from a set of operations before the user's lots
are injected. When absent, the reconciler clears selectively on its own.
*/

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::{Operation, OperationState, Order, OrderLine};
use crate::errors::ServiceError;
use crate::store::{NewReservation, StockLedger};
use crate::sync::SyncContext;

/// Host-owned order confirmation: creates operations and baseline
/// reservations for every line of the order.
#[async_trait]
pub trait ConfirmationFlow: Send + Sync {
    /// Runs the default confirmation for `order`, returning the created
    /// operations. `ctx` carries the reconciler's feedback suppression and
    /// must be threaded into any sync triggers the host fires.
    async fn default_confirm(
        &self,
        order: &Order,
        lines: &[OrderLine],
        ctx: SyncContext,
    ) -> Result<Vec<Operation>, ServiceError>;
}

/// Optional host hook clearing baseline reservations wholesale.
#[async_trait]
pub trait AutoAssignCleaner: Send + Sync {
    /// Removes every reservation from the given operations, returning how
    /// many rows were deleted.
    async fn strip_reservations(&self, operation_ids: &[Uuid]) -> Result<u64, ServiceError>;
}

/// Reference confirmation flow: one outgoing operation per line, reserved
/// from the oldest internal quants first.
#[derive(Clone)]
pub struct FifoConfirmation {
    ledger: Arc<dyn StockLedger>,
}

impl FifoConfirmation {
    pub fn new(ledger: Arc<dyn StockLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl ConfirmationFlow for FifoConfirmation {
    #[instrument(skip(self, order, lines), fields(order_id = %order.id, lines = lines.len()))]
    async fn default_confirm(
        &self,
        order: &Order,
        lines: &[OrderLine],
        _ctx: SyncContext,
    ) -> Result<Vec<Operation>, ServiceError> {
        let mut operations = Vec::with_capacity(lines.len());

        for line in lines {
            let mut operation = Operation::outgoing(
                order.id,
                Some(line.id),
                line.product_id,
                order.source_location_id,
                order.dest_location_id,
                line.quantity,
            );
            self.ledger.insert_operation(operation.clone()).await?;

            let mut quants = self.ledger.quants_for_product(line.product_id).await?;
            quants.sort_by_key(|quant| (quant.received_at, quant.id));

            let mut remaining = line.quantity;
            let mut reserved_any = false;
            for quant in quants {
                if remaining <= Decimal::ZERO {
                    break;
                }
                if quant.available_quantity() <= Decimal::ZERO {
                    continue;
                }
                let Some(location) = self.ledger.get_location(quant.location_id).await? else {
                    continue;
                };
                if !location.usage.is_internal() {
                    continue;
                }

                let take = remaining.min(quant.available_quantity());
                match self
                    .ledger
                    .create_reservation(NewReservation {
                        operation_id: operation.id,
                        product_id: line.product_id,
                        lot_id: quant.lot_id,
                        source_location_id: quant.location_id,
                        dest_location_id: order.dest_location_id,
                        quantity: take,
                    })
                    .await
                {
                    Ok(_) => {
                        remaining -= take;
                        reserved_any = true;
                    }
                    Err(err) => {
                        // Lost a race on this quant; the next one may do.
                        warn!(
                            quant_id = %quant.id,
                            error = %err,
                            "Baseline reservation failed, trying next quant"
                        );
                    }
                }
            }

            let state = if remaining <= Decimal::ZERO {
                OperationState::Assigned
            } else if reserved_any {
                OperationState::PartiallyAvailable
            } else {
                OperationState::Confirmed
            };
            if state != operation.state {
                self.ledger.set_operation_state(operation.id, state).await?;
                operation.state = state;
            }
            debug!(
                operation_id = %operation.id,
                state = %operation.state,
                "Baseline confirmation prepared operation"
            );
            operations.push(operation);
        }

        Ok(operations)
    }
}

/// Reference cleaner: deletes reservation rows straight through the ledger.
#[derive(Clone)]
pub struct StripAllCleaner {
    ledger: Arc<dyn StockLedger>,
}

impl StripAllCleaner {
    pub fn new(ledger: Arc<dyn StockLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl AutoAssignCleaner for StripAllCleaner {
    #[instrument(skip(self, operation_ids), fields(operations = operation_ids.len()))]
    async fn strip_reservations(&self, operation_ids: &[Uuid]) -> Result<u64, ServiceError> {
        let mut removed = 0u64;
        for &operation_id in operation_ids {
            for reservation in self.ledger.reservations_for_operation(operation_id).await? {
                self.ledger.delete_reservation(reservation.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
