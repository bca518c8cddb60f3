//! Bidirectional Sync Guard
//!
//! After confirmation the lot set lives in two places: on the order line
//! (what was sold) and on the warehouse operations (what is reserved). Both
//! sides stay editable, so every edit on one side is pushed to the other
//! through the two hooks here. The explicit [`SyncContext`] plus
//! set-equality change detection keep the push from echoing back: a relayed
//! edit either arrives with its direction muted or finds the sets already
//! equal and writes nothing.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{Operation, OperationKind, Order, OrderLine};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::lot_directory::LotDirectory;
use crate::store::{NewReservation, OrderStore, StockLedger};
use crate::sync::SyncContext;

/// What a line-side hook invocation did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSyncOutcome {
    pub line_id: Uuid,
    /// New derived quantity, when the recomputation wrote one.
    pub recomputed_quantity: Option<Decimal>,
    /// Operations whose reservations were rewritten.
    pub synced_operations: usize,
    /// True when `ctx` muted the line-to-operation direction.
    pub suppressed: bool,
}

/// What an operation-side hook invocation did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSyncOutcome {
    pub operation_id: Uuid,
    pub line_id: Option<Uuid>,
    /// Selection written to the line, when the lot sets differed.
    pub new_selection: Option<Vec<Uuid>>,
    /// True when `ctx` muted the operation-to-line direction.
    pub suppressed: bool,
}

/// Service propagating lot-set edits between lines and operations.
#[derive(Clone)]
pub struct SyncGuard {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn StockLedger>,
    directory: LotDirectory,
    events: Option<EventSender>,
}

impl SyncGuard {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn StockLedger>,
        events: Option<EventSender>,
    ) -> Self {
        let directory = LotDirectory::new(ledger.clone());
        Self {
            orders,
            ledger,
            directory,
            events,
        }
    }

    /// Reacts to an edit of a line's `selected_lot_ids`.
    ///
    /// The derived quantity is recomputed first, regardless of `ctx`. The
    /// selection is then pushed to every active operation fulfilling the
    /// line's product, unless the order is not confirmed yet or `ctx` mutes
    /// the line-to-operation direction.
    #[instrument(skip(self, ctx))]
    pub async fn on_line_selection_changed(
        &self,
        line_id: Uuid,
        ctx: SyncContext,
    ) -> Result<LineSyncOutcome, ServiceError> {
        let line = self
            .orders
            .get_line(line_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order line", line_id))?;

        let mut outcome = LineSyncOutcome {
            line_id,
            recomputed_quantity: self.recompute_quantity(&line).await?,
            synced_operations: 0,
            suppressed: false,
        };

        if ctx.blocks_line_sync() {
            outcome.suppressed = true;
            return Ok(outcome);
        }

        let order = self
            .orders
            .get_order(line.order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", line.order_id))?;
        if !order.is_confirmed() {
            return Ok(outcome);
        }

        let selection = line.selection_set();
        for operation in self.ledger.operations_for_order(order.id).await? {
            if !operation.state.is_active() || operation.product_id != line.product_id {
                continue;
            }
            if self
                .sync_operation_to_selection(&order, &line, &operation, &selection)
                .await?
            {
                outcome.synced_operations += 1;
            }
        }
        Ok(outcome)
    }

    /// Reacts to a warehouse-side rewrite of an operation's reservations.
    ///
    /// Only outgoing, reservation-stable (assigned or done) operations
    /// linked to a line push back. The line's new lot set is the union over
    /// all active operations fulfilling that product; an operation with no
    /// reservation rows yet keeps the line's current lots alive in the
    /// union until it has spoken.
    #[instrument(skip(self, ctx))]
    pub async fn on_operation_reservation_changed(
        &self,
        operation_id: Uuid,
        ctx: SyncContext,
    ) -> Result<OperationSyncOutcome, ServiceError> {
        let operation = self
            .ledger
            .get_operation(operation_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("operation", operation_id))?;

        let mut outcome = OperationSyncOutcome {
            operation_id,
            line_id: operation.line_id,
            new_selection: None,
            suppressed: false,
        };

        if ctx.blocks_operation_sync() {
            outcome.suppressed = true;
            return Ok(outcome);
        }
        if operation.kind != OperationKind::Outgoing || !operation.state.is_reservation_stable() {
            return Ok(outcome);
        }
        let Some(line_id) = operation.line_id else {
            return Ok(outcome);
        };
        let line = self
            .orders
            .get_line(line_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order line", line_id))?;
        let order = self
            .orders
            .get_order(line.order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", line.order_id))?;
        if !order.is_confirmed() {
            return Ok(outcome);
        }

        let mut union: HashSet<Uuid> = HashSet::new();
        let mut has_pending_operation = false;
        for sibling in self.ledger.operations_for_order(order.id).await? {
            if !sibling.state.is_active() || sibling.product_id != line.product_id {
                continue;
            }
            let reservations = self.ledger.reservations_for_operation(sibling.id).await?;
            if reservations.is_empty() {
                has_pending_operation = true;
                continue;
            }
            union.extend(reservations.iter().filter_map(|r| r.lot_id));
        }
        if has_pending_operation {
            union.extend(line.selection_set());
        }

        if union == line.selection_set() {
            return Ok(outcome);
        }

        let mut new_selection: Vec<Uuid> = union.into_iter().collect();
        new_selection.sort();
        self.orders
            .set_line_selection(line.id, new_selection.clone())
            .await?;
        if let Some(events) = &self.events {
            events
                .send_or_log(Event::LineSelectionSynced {
                    line_id: line.id,
                    operation_id,
                    lot_count: new_selection.len() as u64,
                })
                .await;
        }
        info!(
            line_id = %line.id,
            operation_id = %operation_id,
            lots = new_selection.len(),
            "Synced reservation lot set back to order line"
        );

        // Quantity follows the new selection; the line hook runs with the
        // line-to-operation direction muted so this cannot bounce back.
        self.on_line_selection_changed(line.id, ctx.muting_line_echo())
            .await?;

        outcome.new_selection = Some(new_selection);
        Ok(outcome)
    }

    /// Derives the line quantity from its selection: the sum of positive
    /// internal on-hand stock over the selected lots. A selection that
    /// resolves to nothing keeps the existing quantity; demand is never
    /// silently zeroed by a stale lookup.
    async fn recompute_quantity(
        &self,
        line: &OrderLine,
    ) -> Result<Option<Decimal>, ServiceError> {
        if !line.has_selection() {
            return Ok(None);
        }

        let mut total = Decimal::ZERO;
        for &lot_id in &line.selected_lot_ids {
            for quant in self.ledger.quants_for_lot(lot_id).await? {
                if quant.product_id != line.product_id || quant.quantity <= Decimal::ZERO {
                    continue;
                }
                let Some(location) = self.ledger.get_location(quant.location_id).await? else {
                    continue;
                };
                if location.usage.is_internal() {
                    total += quant.quantity;
                }
            }
        }

        if total <= Decimal::ZERO {
            warn!(
                line_id = %line.id,
                "Selection resolved to no internal stock; keeping current quantity"
            );
            return Ok(None);
        }
        if total == line.quantity {
            return Ok(None);
        }

        self.orders.set_line_quantity(line.id, total).await?;
        if let Some(events) = &self.events {
            events
                .send_or_log(Event::LineQuantityRecomputed {
                    line_id: line.id,
                    quantity: total,
                })
                .await;
        }
        info!(line_id = %line.id, quantity = %total, "Recomputed line quantity from selection");
        Ok(Some(total))
    }

    /// Rewrites one operation's reservations to the selection. Returns
    /// whether anything was written; equal sets short-circuit without a
    /// single store call beyond the read.
    async fn sync_operation_to_selection(
        &self,
        order: &Order,
        line: &OrderLine,
        operation: &Operation,
        selection: &HashSet<Uuid>,
    ) -> Result<bool, ServiceError> {
        let reservations = self.ledger.reservations_for_operation(operation.id).await?;
        let current: HashSet<Uuid> = reservations
            .iter()
            .filter_map(|reservation| reservation.lot_id)
            .collect();
        if current == *selection {
            return Ok(false);
        }

        let mut removed = 0u64;
        for reservation in &reservations {
            let keep = reservation
                .lot_id
                .map(|lot_id| selection.contains(&lot_id))
                .unwrap_or(false);
            if !keep {
                self.ledger.delete_reservation(reservation.id).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            if let Some(events) = &self.events {
                events
                    .send_or_log(Event::ReservationsCleared {
                        operation_id: operation.id,
                        removed,
                    })
                    .await;
            }
        }

        for &lot_id in selection {
            if current.contains(&lot_id) {
                continue;
            }
            match self
                .directory
                .find_available_quant(lot_id, line.product_id, operation.source_location_id)
                .await?
            {
                Some(quant) => {
                    match self
                        .ledger
                        .create_reservation(NewReservation {
                            operation_id: operation.id,
                            product_id: line.product_id,
                            lot_id: Some(lot_id),
                            source_location_id: quant.location_id,
                            dest_location_id: operation.dest_location_id,
                            quantity: quant.quantity,
                        })
                        .await
                    {
                        Ok(reservation) => {
                            if let Some(events) = &self.events {
                                events
                                    .send_or_log(Event::ReservationCreated {
                                        operation_id: operation.id,
                                        lot_id: reservation.lot_id,
                                        quantity: reservation.quantity,
                                    })
                                    .await;
                            }
                        }
                        Err(err) => {
                            warn!(
                                operation_id = %operation.id,
                                lot_id = %lot_id,
                                error = %err,
                                "Reservation write failed during line sync"
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
                        }
                    }
                }
                None => {
                    warn!(
                        operation_id = %operation.id,
                        lot_id = %lot_id,
                        "Selected lot has no internal stock during line sync"
                    );
                    if let Some(events) = &self.events {
                        events
                            .send_or_log(Event::LotUnassignable {
                                order_id: order.id,
                                line_id: line.id,
                                lot_id,
                            })
                            .await;
                    }
                }
            }
        }

        info!(
            operation_id = %operation.id,
            line_id = %line.id,
            removed = removed,
            "Synced line selection onto operation reservations"
        );
        Ok(true)
    }
}
