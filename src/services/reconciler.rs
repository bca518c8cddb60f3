//! Reservation Reconciler Service
//!
//! The confirmation-time state machine. The host's default flow reserves
//! whatever FIFO hands it; this service makes sure the warehouse ends up
//! holding exactly the slabs the customer was sold. Selections are
//! snapshotted before the default flow runs, validated against other
//! confirmed orders, and then forced onto every active operation: strays
//! deleted, missing lots reserved at full slab quantity, the line's
//! selection restored if the flow rewrote it.
//!
//! Per-lot failures (no stock, write refused) are logged, surfaced as
//! events and collected in the outcome, but never abort the confirmation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{Operation, Order, OrderState};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::confirmation::{AutoAssignCleaner, ConfirmationFlow};
use crate::services::conflict::ConflictValidator;
use crate::services::lot_directory::LotDirectory;
use crate::store::{NewReservation, OrderStore, StockLedger};
use crate::sync::SyncContext;

/// Why a selected lot ended up without a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// No positive internal stock anywhere.
    StockNotFound,
    /// The store refused the reservation write.
    WriteFailed,
}

/// A selected lot the reconciler could not reserve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedLot {
    pub line_id: Uuid,
    pub lot_id: Uuid,
    pub lot_name: String,
    pub reason: SkipReason,
}

/// What a confirmation call did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub order_id: Uuid,
    /// True when the order was already confirmed and nothing was touched.
    pub already_confirmed: bool,
    pub operation_count: usize,
    pub reservations_created: u64,
    pub reservations_removed: u64,
    pub skipped_lots: Vec<SkippedLot>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

struct SelectionSnapshot {
    line_id: Uuid,
    product_id: Uuid,
    lot_ids: Vec<Uuid>,
}

impl SelectionSnapshot {
    fn lot_set(&self) -> HashSet<Uuid> {
        self.lot_ids.iter().copied().collect()
    }
}

/// Service enforcing exact lot reservations at confirmation.
#[derive(Clone)]
pub struct ReservationReconciler {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn StockLedger>,
    flow: Arc<dyn ConfirmationFlow>,
    cleaner: Option<Arc<dyn AutoAssignCleaner>>,
    conflicts: ConflictValidator,
    directory: LotDirectory,
    events: Option<EventSender>,
}

impl ReservationReconciler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn StockLedger>,
        flow: Arc<dyn ConfirmationFlow>,
        cleaner: Option<Arc<dyn AutoAssignCleaner>>,
        events: Option<EventSender>,
    ) -> Self {
        let conflicts = ConflictValidator::new(orders.clone(), ledger.clone());
        let directory = LotDirectory::new(ledger.clone());
        Self {
            orders,
            ledger,
            flow,
            cleaner,
            conflicts,
            directory,
            events,
        }
    }

    /// Confirms `order_id`, reconciling reservations to the lines' lot
    /// selections.
    ///
    /// Already-confirmed orders return their existing state untouched.
    /// Done or cancelled orders are refused. Lots committed to another
    /// confirmed order abort before any state changes.
    #[instrument(skip(self))]
    pub async fn confirm(&self, order_id: Uuid) -> Result<ConfirmOutcome, ServiceError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;

        match order.state {
            OrderState::Confirmed => return self.existing_outcome(order).await,
            OrderState::Done | OrderState::Cancelled => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Order {} cannot be confirmed from state {}",
                    order.order_number, order.state
                )));
            }
            OrderState::Draft => {}
        }

        let lines = self.orders.lines_for_order(order_id).await?;

        // The default flow may rewrite selections; what the user picked is
        // captured first and wins.
        let snapshots: Vec<SelectionSnapshot> = lines
            .iter()
            .filter(|line| line.has_selection())
            .map(|line| SelectionSnapshot {
                line_id: line.id,
                product_id: line.product_id,
                lot_ids: line.selected_lot_ids.clone(),
            })
            .collect();

        let conflict_checks = snapshots.iter().map(|snapshot| {
            self.conflicts
                .find_conflicting_lots(&snapshot.lot_ids, snapshot.product_id, Some(order_id))
        });
        let mut conflicts = Vec::new();
        for result in join_all(conflict_checks).await {
            conflicts.extend(result?);
        }
        if !conflicts.is_empty() {
            let lots = conflicts
                .iter()
                .map(|conflict| format!("{} ({})", conflict.lot_name, conflict.order_number))
                .collect();
            return Err(ServiceError::ConflictingLots { lots });
        }

        let ctx = SyncContext::confirming();
        let operations = self.flow.default_confirm(&order, &lines, ctx).await?;

        let mut outcome = ConfirmOutcome {
            order_id,
            already_confirmed: false,
            operation_count: operations.len(),
            reservations_created: 0,
            reservations_removed: 0,
            skipped_lots: Vec::new(),
            confirmed_at: None,
        };

        for snapshot in &snapshots {
            let protected = snapshot.lot_set();
            for operation in operations
                .iter()
                .filter(|op| op.state.is_active() && op.product_id == snapshot.product_id)
            {
                outcome.reservations_removed +=
                    self.strip_unselected(operation, &protected).await?;
                outcome.reservations_created += self
                    .inject_selection(&order, snapshot, operation, &mut outcome.skipped_lots)
                    .await?;
            }
        }

        for snapshot in &snapshots {
            self.restore_selection(snapshot).await?;
        }

        self.orders
            .set_order_state(order_id, OrderState::Confirmed)
            .await?;
        outcome.confirmed_at = self
            .orders
            .get_order(order_id)
            .await?
            .and_then(|order| order.confirmed_at);

        if let Some(events) = &self.events {
            events
                .send_or_log(Event::OrderConfirmed {
                    order_id,
                    reservations_created: outcome.reservations_created,
                    lots_skipped: outcome.skipped_lots.len() as u64,
                })
                .await;
        }
        info!(
            order_id = %order_id,
            operations = outcome.operation_count,
            created = outcome.reservations_created,
            removed = outcome.reservations_removed,
            skipped = outcome.skipped_lots.len(),
            "Order confirmed with reconciled lot reservations"
        );
        Ok(outcome)
    }

    async fn existing_outcome(&self, order: Order) -> Result<ConfirmOutcome, ServiceError> {
        let operations = self.ledger.operations_for_order(order.id).await?;
        info!(
            order_id = %order.id,
            "Order already confirmed; leaving reservations untouched"
        );
        Ok(ConfirmOutcome {
            order_id: order.id,
            already_confirmed: true,
            operation_count: operations.len(),
            reservations_created: 0,
            reservations_removed: 0,
            skipped_lots: Vec::new(),
            confirmed_at: order.confirmed_at,
        })
    }

    /// Clears baseline reservations that are not part of the protected lot
    /// set. With an external cleaner everything goes and the injection step
    /// rebuilds the selected part.
    async fn strip_unselected(
        &self,
        operation: &Operation,
        protected: &HashSet<Uuid>,
    ) -> Result<u64, ServiceError> {
        let removed = if let Some(cleaner) = &self.cleaner {
            cleaner.strip_reservations(&[operation.id]).await?
        } else {
            let mut removed = 0u64;
            for reservation in self.ledger.reservations_for_operation(operation.id).await? {
                let keep = reservation
                    .lot_id
                    .map(|lot_id| protected.contains(&lot_id))
                    .unwrap_or(false);
                if !keep {
                    self.ledger.delete_reservation(reservation.id).await?;
                    removed += 1;
                }
            }
            removed
        };

        if removed > 0 {
            if let Some(events) = &self.events {
                events
                    .send_or_log(Event::ReservationsCleared {
                        operation_id: operation.id,
                        removed,
                    })
                    .await;
            }
            info!(
                operation_id = %operation.id,
                removed = removed,
                "Cleared auto-assigned reservations"
            );
        }
        Ok(removed)
    }

    /// Reserves every snapshot lot not yet present on the operation, at the
    /// full on-hand quantity of the located quant. A slab is sold whole.
    async fn inject_selection(
        &self,
        order: &Order,
        snapshot: &SelectionSnapshot,
        operation: &Operation,
        skipped: &mut Vec<SkippedLot>,
    ) -> Result<u64, ServiceError> {
        let existing: HashSet<Uuid> = self
            .ledger
            .reservations_for_operation(operation.id)
            .await?
            .iter()
            .filter_map(|reservation| reservation.lot_id)
            .collect();

        let mut created = 0u64;
        for &lot_id in &snapshot.lot_ids {
            if existing.contains(&lot_id) {
                continue;
            }

            let quant = self
                .directory
                .find_available_quant(lot_id, snapshot.product_id, operation.source_location_id)
                .await?;
            let Some(quant) = quant else {
                let lot_name = self.lot_name(lot_id).await?;
                warn!(
                    lot_id = %lot_id,
                    lot_name = %lot_name,
                    line_id = %snapshot.line_id,
                    "Selected lot has no internal stock; skipping"
                );
                if let Some(events) = &self.events {
                    events
                        .send_or_log(Event::LotUnassignable {
                            order_id: order.id,
                            line_id: snapshot.line_id,
                            lot_id,
                        })
                        .await;
                }
                skipped.push(SkippedLot {
                    line_id: snapshot.line_id,
                    lot_id,
                    lot_name,
                    reason: SkipReason::StockNotFound,
                });
                continue;
            };

            match self
                .ledger
                .create_reservation(NewReservation {
                    operation_id: operation.id,
                    product_id: snapshot.product_id,
                    lot_id: Some(lot_id),
                    source_location_id: quant.location_id,
                    dest_location_id: operation.dest_location_id,
                    quantity: quant.quantity,
                })
                .await
            {
                Ok(reservation) => {
                    created += 1;
                    if let Some(events) = &self.events {
                        events
                            .send_or_log(Event::ReservationCreated {
                                operation_id: operation.id,
                                lot_id: reservation.lot_id,
                                quantity: reservation.quantity,
                            })
                            .await;
                    }
                    info!(
                        operation_id = %operation.id,
                        lot_id = %lot_id,
                        quantity = %reservation.quantity,
                        "Reserved selected lot"
                    );
                }
                Err(err) => {
                    let lot_name = self.lot_name(lot_id).await?;
                    warn!(
                        operation_id = %operation.id,
                        lot_id = %lot_id,
                        error = %err,
                        "Reservation write failed; skipping lot"
                    );
                    if let Some(events) = &self.events {
                        events
                            .send_or_log(Event::ReservationWriteFailed {
                                operation_id: operation.id,
                                lot_id,
                                reason: err.to_string(),
                            })
                            .await;
                    }
                    skipped.push(SkippedLot {
                        line_id: snapshot.line_id,
                        lot_id,
                        lot_name,
                        reason: SkipReason::WriteFailed,
                    });
                }
            }
        }
        Ok(created)
    }

    /// Puts the snapshot selection back on the line when the default flow
    /// rewrote it.
    async fn restore_selection(&self, snapshot: &SelectionSnapshot) -> Result<(), ServiceError> {
        let line = self
            .orders
            .get_line(snapshot.line_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order line", snapshot.line_id))?;
        if line.selection_set() != snapshot.lot_set() {
            self.orders
                .set_line_selection(snapshot.line_id, snapshot.lot_ids.clone())
                .await?;
            info!(
                line_id = %snapshot.line_id,
                lots = snapshot.lot_ids.len(),
                "Restored user lot selection after default flow"
            );
        }
        Ok(())
    }

    async fn lot_name(&self, lot_id: Uuid) -> Result<String, ServiceError> {
        Ok(self
            .ledger
            .get_lot(lot_id)
            .await?
            .map(|lot| lot.name)
            .unwrap_or_else(|| lot_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::entities::{Location, LocationUsage, Lot, OrderLine, Quant};
    use crate::services::confirmation::FifoConfirmation;
    use crate::store::memory::{InMemoryOrderStore, InMemoryStockLedger};

    /// Ledger wrapper whose reservation writes always fail, for exercising
    /// the per-lot skip path.
    struct RefusingLedger {
        inner: Arc<InMemoryStockLedger>,
    }

    #[async_trait::async_trait]
    impl StockLedger for RefusingLedger {
        async fn get_lot(&self, lot_id: Uuid) -> Result<Option<Lot>, ServiceError> {
            self.inner.get_lot(lot_id).await
        }
        async fn insert_lot(&self, lot: Lot) -> Result<(), ServiceError> {
            self.inner.insert_lot(lot).await
        }
        async fn get_location(
            &self,
            location_id: Uuid,
        ) -> Result<Option<Location>, ServiceError> {
            self.inner.get_location(location_id).await
        }
        async fn insert_location(&self, location: Location) -> Result<(), ServiceError> {
            self.inner.insert_location(location).await
        }
        async fn location_in_subtree(
            &self,
            location_id: Uuid,
            root_id: Uuid,
        ) -> Result<bool, ServiceError> {
            self.inner.location_in_subtree(location_id, root_id).await
        }
        async fn get_quant(&self, quant_id: Uuid) -> Result<Option<Quant>, ServiceError> {
            self.inner.get_quant(quant_id).await
        }
        async fn insert_quant(&self, quant: Quant) -> Result<(), ServiceError> {
            self.inner.insert_quant(quant).await
        }
        async fn quants_for_lot(&self, lot_id: Uuid) -> Result<Vec<Quant>, ServiceError> {
            self.inner.quants_for_lot(lot_id).await
        }
        async fn quants_for_product(&self, product_id: Uuid) -> Result<Vec<Quant>, ServiceError> {
            self.inner.quants_for_product(product_id).await
        }
        async fn get_operation(
            &self,
            operation_id: Uuid,
        ) -> Result<Option<Operation>, ServiceError> {
            self.inner.get_operation(operation_id).await
        }
        async fn insert_operation(&self, operation: Operation) -> Result<(), ServiceError> {
            self.inner.insert_operation(operation).await
        }
        async fn set_operation_state(
            &self,
            operation_id: Uuid,
            state: crate::entities::OperationState,
        ) -> Result<(), ServiceError> {
            self.inner.set_operation_state(operation_id, state).await
        }
        async fn operations_for_order(
            &self,
            order_id: Uuid,
        ) -> Result<Vec<Operation>, ServiceError> {
            self.inner.operations_for_order(order_id).await
        }
        async fn reservations_for_operation(
            &self,
            operation_id: Uuid,
        ) -> Result<Vec<crate::entities::Reservation>, ServiceError> {
            self.inner.reservations_for_operation(operation_id).await
        }
        async fn reservations_for_lot(
            &self,
            lot_id: Uuid,
        ) -> Result<Vec<crate::entities::Reservation>, ServiceError> {
            self.inner.reservations_for_lot(lot_id).await
        }
        async fn reservations_for_order(
            &self,
            order_id: Uuid,
        ) -> Result<Vec<crate::entities::Reservation>, ServiceError> {
            self.inner.reservations_for_order(order_id).await
        }
        async fn create_reservation(
            &self,
            _new: NewReservation,
        ) -> Result<crate::entities::Reservation, ServiceError> {
            Err(ServiceError::StorageError(
                "reservation writes disabled".to_string(),
            ))
        }
        async fn delete_reservation(&self, reservation_id: Uuid) -> Result<(), ServiceError> {
            self.inner.delete_reservation(reservation_id).await
        }
    }

    async fn seed_world() -> (
        Arc<InMemoryOrderStore>,
        Arc<InMemoryStockLedger>,
        Uuid,
        Uuid,
        Uuid,
    ) {
        let orders = Arc::new(InMemoryOrderStore::new());
        let ledger = Arc::new(InMemoryStockLedger::new());
        let stock = Location::new("Stock", LocationUsage::Internal);
        let customers = Location::new("Customers", LocationUsage::Customer);
        let (stock_id, customers_id) = (stock.id, customers.id);
        ledger.insert_location(stock).await.unwrap();
        ledger.insert_location(customers).await.unwrap();
        (orders, ledger, Uuid::new_v4(), stock_id, customers_id)
    }

    fn reconciler_over(
        orders: Arc<InMemoryOrderStore>,
        ledger: Arc<dyn StockLedger>,
    ) -> ReservationReconciler {
        let flow = Arc::new(FifoConfirmation::new(ledger.clone()));
        ReservationReconciler::new(orders, ledger, flow, None, None)
    }

    #[tokio::test]
    async fn done_and_cancelled_orders_are_refused() {
        let (orders, ledger, _product, stock_id, customers_id) = seed_world().await;
        let mut order = Order::new("S00020", Uuid::new_v4(), stock_id, customers_id);
        order.state = OrderState::Done;
        let order_id = order.id;
        orders.insert_order(order).await.unwrap();

        let reconciler = reconciler_over(orders, ledger);
        let err = reconciler.confirm(order_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn write_failures_skip_the_lot_but_confirm_the_order() {
        let (orders, ledger, product_id, stock_id, customers_id) = seed_world().await;
        let lot = Lot::new("L-0500", product_id);
        let lot_id = lot.id;
        ledger.insert_lot(lot).await.unwrap();
        ledger
            .insert_quant(Quant::new(Some(lot_id), product_id, stock_id, dec!(7)))
            .await
            .unwrap();

        let order = Order::new("S00021", Uuid::new_v4(), stock_id, customers_id);
        let order_id = order.id;
        orders.insert_order(order).await.unwrap();
        let mut line = OrderLine::new(order_id, product_id, dec!(7));
        line.selected_lot_ids = vec![lot_id];
        orders.insert_line(line).await.unwrap();

        let refusing = Arc::new(RefusingLedger { inner: ledger });
        let reconciler = reconciler_over(orders.clone(), refusing);
        let outcome = reconciler.confirm(order_id).await.unwrap();

        assert_eq!(outcome.reservations_created, 0);
        assert_eq!(outcome.skipped_lots.len(), 1);
        assert_eq!(outcome.skipped_lots[0].reason, SkipReason::WriteFailed);
        let order = orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.state, OrderState::Confirmed);
    }
}
