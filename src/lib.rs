//! Slabstock Reservation Engine
//!
//! Keeps physical-stock reservations in lockstep with the specific stone
//! slabs a customer was sold: confirmation overrides the host's FIFO
//! auto-reservation with the lines' explicit lot selections, and the sync
//! guard keeps later edits on either side from drifting apart or looping.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod services;
pub mod store;
pub mod sync;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::entities::{Order, OrderLine, Reservation};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::availability::{
    AvailabilityFilter, BlockGroup, SelectableSlab, SlabFilters,
};
use crate::services::confirmation::{AutoAssignCleaner, ConfirmationFlow, FifoConfirmation};
use crate::services::conflict::{ConflictValidator, LotConflict};
use crate::services::reconciler::{ConfirmOutcome, ReservationReconciler};
use crate::services::sync_guard::{LineSyncOutcome, OperationSyncOutcome, SyncGuard};
use crate::store::memory::{InMemoryOrderStore, InMemoryStockLedger};
use crate::store::{OrderStore, StockLedger};
use crate::sync::SyncContext;

/// Reservation state of one order line, for operational tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineReservations {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub selected_lot_ids: Vec<Uuid>,
    pub reservations: Vec<Reservation>,
}

/// Facade wiring the engine's services over one store pair.
///
/// Hosts construct it with their own [`OrderStore`] / [`StockLedger`]
/// implementations and their confirmation flow; [`Engine::in_memory`] wires
/// the bundled reference implementations for tests and embedded use.
#[derive(Clone)]
pub struct Engine {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn StockLedger>,
    config: EngineConfig,
    event_sender: Option<EventSender>,
    conflicts: ConflictValidator,
    availability: AvailabilityFilter,
    reconciler: ReservationReconciler,
    sync_guard: SyncGuard,
}

impl Engine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn StockLedger>,
        flow: Arc<dyn ConfirmationFlow>,
        cleaner: Option<Arc<dyn AutoAssignCleaner>>,
        config: EngineConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        let conflicts = ConflictValidator::new(orders.clone(), ledger.clone());
        let availability = AvailabilityFilter::new(ledger.clone(), conflicts.clone(), &config);
        let reconciler = ReservationReconciler::new(
            orders.clone(),
            ledger.clone(),
            flow,
            cleaner,
            event_sender.clone(),
        );
        let sync_guard = SyncGuard::new(orders.clone(), ledger.clone(), event_sender.clone());
        Self {
            orders,
            ledger,
            config,
            event_sender,
            conflicts,
            availability,
            reconciler,
            sync_guard,
        }
    }

    /// Engine over fresh in-memory stores and the FIFO reference flow.
    pub fn in_memory(config: EngineConfig, event_sender: Option<EventSender>) -> Self {
        let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let ledger: Arc<dyn StockLedger> = Arc::new(InMemoryStockLedger::new());
        let flow = Arc::new(FifoConfirmation::new(ledger.clone()));
        Self::new(orders, ledger, flow, None, config, event_sender)
    }

    pub fn orders(&self) -> Arc<dyn OrderStore> {
        self.orders.clone()
    }

    pub fn ledger(&self) -> Arc<dyn StockLedger> {
        self.ledger.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn availability(&self) -> &AvailabilityFilter {
        &self.availability
    }

    pub fn conflict_validator(&self) -> &ConflictValidator {
        &self.conflicts
    }

    pub fn reconciler(&self) -> &ReservationReconciler {
        &self.reconciler
    }

    pub fn sync_guard(&self) -> &SyncGuard {
        &self.sync_guard
    }

    /// Confirms an order, reconciling its reservations to the lot
    /// selections. See [`ReservationReconciler::confirm`].
    pub async fn confirm(&self, order_id: Uuid) -> Result<ConfirmOutcome, ServiceError> {
        self.reconciler.confirm(order_id).await
    }

    /// Line-side sync hook. See [`SyncGuard::on_line_selection_changed`].
    pub async fn on_line_selection_changed(
        &self,
        line_id: Uuid,
        ctx: SyncContext,
    ) -> Result<LineSyncOutcome, ServiceError> {
        self.sync_guard.on_line_selection_changed(line_id, ctx).await
    }

    /// Operation-side sync hook. See
    /// [`SyncGuard::on_operation_reservation_changed`].
    pub async fn on_operation_reservation_changed(
        &self,
        operation_id: Uuid,
        ctx: SyncContext,
    ) -> Result<OperationSyncOutcome, ServiceError> {
        self.sync_guard
            .on_operation_reservation_changed(operation_id, ctx)
            .await
    }

    /// Selectable-slab listing. See
    /// [`AvailabilityFilter::list_selectable_slabs`].
    pub async fn list_selectable_slabs(
        &self,
        product_id: Uuid,
        filters: &SlabFilters,
        current_selection: &[Uuid],
    ) -> Result<Vec<SelectableSlab>, ServiceError> {
        self.availability
            .list_selectable_slabs(product_id, filters, current_selection)
            .await
    }

    /// Paginated selectable-slab listing. See
    /// [`AvailabilityFilter::list_selectable_slabs_paginated`].
    pub async fn list_selectable_slabs_paginated(
        &self,
        product_id: Uuid,
        filters: &SlabFilters,
        current_selection: &[Uuid],
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<SelectableSlab>, u64), ServiceError> {
        self.availability
            .list_selectable_slabs_paginated(product_id, filters, current_selection, page, page_size)
            .await
    }

    /// Groups listing rows by quarry block.
    pub fn group_by_block(&self, rows: Vec<SelectableSlab>) -> Vec<BlockGroup> {
        self.availability.group_by_block(rows)
    }

    /// Pre-confirmation conflict check. See
    /// [`ConflictValidator::find_conflicting_lots`].
    pub async fn find_conflicting_lots(
        &self,
        candidate_lots: &[Uuid],
        product_id: Uuid,
        excluding_order: Option<Uuid>,
    ) -> Result<Vec<LotConflict>, ServiceError> {
        self.conflicts
            .find_conflicting_lots(candidate_lots, product_id, excluding_order)
            .await
    }

    /// Read-only per-line reservation overview of an order.
    #[instrument(skip(self))]
    pub async fn order_reservations(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<LineReservations>, ServiceError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;

        let lines = self.orders.lines_for_order(order_id).await?;
        let operations = self.ledger.operations_for_order(order_id).await?;

        let mut rows = Vec::with_capacity(lines.len());
        for line in lines {
            let mut reservations = Vec::new();
            for operation in operations.iter().filter(|op| {
                op.line_id == Some(line.id)
                    || (op.line_id.is_none() && op.product_id == line.product_id)
            }) {
                reservations
                    .extend(self.ledger.reservations_for_operation(operation.id).await?);
            }
            rows.push(LineReservations {
                line_id: line.id,
                product_id: line.product_id,
                selected_lot_ids: line.selected_lot_ids,
                reservations,
            });
        }
        Ok(rows)
    }

    /// Copies an order into a fresh draft: lines and lot selections
    /// survive, operations and reservations do not.
    #[instrument(skip(self))]
    pub async fn duplicate_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let source = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;
        let lines = self.orders.lines_for_order(order_id).await?;

        let copy = Order::new(
            format!("{} (copy)", source.order_number),
            source.customer_id,
            source.source_location_id,
            source.dest_location_id,
        );
        self.orders.insert_order(copy.clone()).await?;

        for line in &lines {
            let mut new_line = OrderLine::new(copy.id, line.product_id, line.quantity);
            new_line.selected_lot_ids = line.selected_lot_ids.clone();
            self.orders.insert_line(new_line).await?;
        }

        if let Some(events) = &self.event_sender {
            events
                .send_or_log(Event::OrderDuplicated {
                    source_order_id: order_id,
                    new_order_id: copy.id,
                })
                .await;
        }
        info!(
            source_order_id = %order_id,
            new_order_id = %copy.id,
            lines = lines.len(),
            "Duplicated order with selections intact"
        );
        Ok(copy)
    }
}

pub mod prelude {
    pub use crate::config::*;
    pub use crate::entities::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::services::*;
    pub use crate::store::*;
    pub use crate::sync::*;
    pub use crate::{Engine, LineReservations};
}
