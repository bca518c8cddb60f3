use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use super::{NewReservation, OrderStore, StockLedger};
use crate::entities::{
    Location, Lot, Operation, OperationState, Order, OrderLine, OrderState, Quant, Reservation,
};
use crate::errors::ServiceError;

/// In-memory order store over concurrent maps.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    lines: DashMap<Uuid, OrderLine>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&order_id).map(|entry| entry.clone()))
    }

    async fn insert_order(&self, order: Order) -> Result<(), ServiceError> {
        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn set_order_state(
        &self,
        order_id: Uuid,
        state: OrderState,
    ) -> Result<(), ServiceError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;
        order.state = state;
        order.updated_at = Utc::now();
        if state == OrderState::Confirmed && order.confirmed_at.is_none() {
            order.confirmed_at = Some(order.updated_at);
        }
        Ok(())
    }

    async fn get_line(&self, line_id: Uuid) -> Result<Option<OrderLine>, ServiceError> {
        Ok(self.lines.get(&line_id).map(|entry| entry.clone()))
    }

    async fn lines_for_order(&self, order_id: Uuid) -> Result<Vec<OrderLine>, ServiceError> {
        let mut lines: Vec<OrderLine> = self
            .lines
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .map(|entry| entry.clone())
            .collect();
        lines.sort_by_key(|line| (line.created_at, line.id));
        Ok(lines)
    }

    async fn insert_line(&self, line: OrderLine) -> Result<(), ServiceError> {
        self.lines.insert(line.id, line);
        Ok(())
    }

    async fn set_line_selection(
        &self,
        line_id: Uuid,
        lot_ids: Vec<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut line = self
            .lines
            .get_mut(&line_id)
            .ok_or_else(|| ServiceError::not_found("order line", line_id))?;
        line.selected_lot_ids = lot_ids;
        line.updated_at = Utc::now();
        Ok(())
    }

    async fn set_line_quantity(
        &self,
        line_id: Uuid,
        quantity: Decimal,
    ) -> Result<(), ServiceError> {
        let mut line = self
            .lines
            .get_mut(&line_id)
            .ok_or_else(|| ServiceError::not_found("order line", line_id))?;
        line.quantity = quantity;
        line.updated_at = Utc::now();
        Ok(())
    }

    async fn lines_selecting_lot(&self, lot_id: Uuid) -> Result<Vec<OrderLine>, ServiceError> {
        let mut lines: Vec<OrderLine> = self
            .lines
            .iter()
            .filter(|entry| entry.selected_lot_ids.contains(&lot_id))
            .map(|entry| entry.clone())
            .collect();
        lines.sort_by_key(|line| (line.created_at, line.id));
        Ok(lines)
    }
}

/// In-memory stock ledger over concurrent maps.
///
/// Reservation writes are serialized per quant: availability is re-checked
/// under the quant's map entry, so two concurrent creations cannot
/// over-reserve the same slab.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    lots: DashMap<Uuid, Lot>,
    locations: DashMap<Uuid, Location>,
    quants: DashMap<Uuid, Quant>,
    operations: DashMap<Uuid, Operation>,
    reservations: DashMap<Uuid, Reservation>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching_quant_id(
        &self,
        lot_id: Option<Uuid>,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Option<Uuid> {
        self.quants
            .iter()
            .find(|entry| {
                entry.lot_id == lot_id
                    && entry.product_id == product_id
                    && entry.location_id == location_id
            })
            .map(|entry| entry.id)
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn get_lot(&self, lot_id: Uuid) -> Result<Option<Lot>, ServiceError> {
        Ok(self.lots.get(&lot_id).map(|entry| entry.clone()))
    }

    async fn insert_lot(&self, lot: Lot) -> Result<(), ServiceError> {
        self.lots.insert(lot.id, lot);
        Ok(())
    }

    async fn get_location(&self, location_id: Uuid) -> Result<Option<Location>, ServiceError> {
        Ok(self.locations.get(&location_id).map(|entry| entry.clone()))
    }

    async fn insert_location(&self, location: Location) -> Result<(), ServiceError> {
        self.locations.insert(location.id, location);
        Ok(())
    }

    async fn location_in_subtree(
        &self,
        location_id: Uuid,
        root_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let mut current = location_id;
        let mut visited = HashSet::new();
        loop {
            if current == root_id {
                return Ok(true);
            }
            if !visited.insert(current) {
                // Parent chains are expected to be acyclic; stop if one is not.
                warn!(location_id = %location_id, "Location parent chain contains a cycle");
                return Ok(false);
            }
            match self.locations.get(&current).and_then(|loc| loc.parent_id) {
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
    }

    async fn get_quant(&self, quant_id: Uuid) -> Result<Option<Quant>, ServiceError> {
        Ok(self.quants.get(&quant_id).map(|entry| entry.clone()))
    }

    async fn insert_quant(&self, quant: Quant) -> Result<(), ServiceError> {
        self.quants.insert(quant.id, quant);
        Ok(())
    }

    async fn quants_for_lot(&self, lot_id: Uuid) -> Result<Vec<Quant>, ServiceError> {
        let mut quants: Vec<Quant> = self
            .quants
            .iter()
            .filter(|entry| entry.lot_id == Some(lot_id))
            .map(|entry| entry.clone())
            .collect();
        quants.sort_by_key(|quant| (quant.received_at, quant.id));
        Ok(quants)
    }

    async fn quants_for_product(&self, product_id: Uuid) -> Result<Vec<Quant>, ServiceError> {
        let mut quants: Vec<Quant> = self
            .quants
            .iter()
            .filter(|entry| entry.product_id == product_id)
            .map(|entry| entry.clone())
            .collect();
        quants.sort_by_key(|quant| (quant.received_at, quant.id));
        Ok(quants)
    }

    async fn get_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Option<Operation>, ServiceError> {
        Ok(self.operations.get(&operation_id).map(|entry| entry.clone()))
    }

    async fn insert_operation(&self, operation: Operation) -> Result<(), ServiceError> {
        self.operations.insert(operation.id, operation);
        Ok(())
    }

    async fn set_operation_state(
        &self,
        operation_id: Uuid,
        state: OperationState,
    ) -> Result<(), ServiceError> {
        let mut operation = self
            .operations
            .get_mut(&operation_id)
            .ok_or_else(|| ServiceError::not_found("operation", operation_id))?;
        operation.state = state;
        operation.updated_at = Utc::now();
        Ok(())
    }

    async fn operations_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Operation>, ServiceError> {
        let mut operations: Vec<Operation> = self
            .operations
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .map(|entry| entry.clone())
            .collect();
        operations.sort_by_key(|op| (op.created_at, op.id));
        Ok(operations)
    }

    async fn reservations_for_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Vec<Reservation>, ServiceError> {
        let mut reservations: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|entry| entry.operation_id == operation_id)
            .map(|entry| entry.clone())
            .collect();
        reservations.sort_by_key(|res| (res.created_at, res.id));
        Ok(reservations)
    }

    async fn reservations_for_lot(
        &self,
        lot_id: Uuid,
    ) -> Result<Vec<Reservation>, ServiceError> {
        let mut reservations: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|entry| entry.lot_id == Some(lot_id))
            .map(|entry| entry.clone())
            .collect();
        reservations.sort_by_key(|res| (res.created_at, res.id));
        Ok(reservations)
    }

    async fn reservations_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Reservation>, ServiceError> {
        let operation_ids: HashSet<Uuid> = self
            .operations
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .map(|entry| entry.id)
            .collect();
        let mut reservations: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|entry| operation_ids.contains(&entry.operation_id))
            .map(|entry| entry.clone())
            .collect();
        reservations.sort_by_key(|res| (res.created_at, res.id));
        Ok(reservations)
    }

    async fn create_reservation(
        &self,
        new: NewReservation,
    ) -> Result<Reservation, ServiceError> {
        if new.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Reservation quantity must be positive".to_string(),
            ));
        }

        let quant_id = self
            .matching_quant_id(new.lot_id, new.product_id, new.source_location_id)
            .ok_or_else(|| {
                ServiceError::InsufficientStock(format!(
                    "No stock of product {} (lot {:?}) at location {}",
                    new.product_id, new.lot_id, new.source_location_id
                ))
            })?;

        // Availability is re-checked while holding the quant entry; quantities
        // seen before this point may be stale.
        {
            let mut quant = self.quants.get_mut(&quant_id).ok_or_else(|| {
                ServiceError::ConcurrentModification(quant_id)
            })?;
            if new.quantity > quant.available_quantity() {
                return Err(ServiceError::InsufficientStock(format!(
                    "Requested {} but only {} available on quant {}",
                    new.quantity,
                    quant.available_quantity(),
                    quant_id
                )));
            }
            quant.reserved_quantity += new.quantity;
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            operation_id: new.operation_id,
            product_id: new.product_id,
            lot_id: new.lot_id,
            source_location_id: new.source_location_id,
            dest_location_id: new.dest_location_id,
            quantity: new.quantity,
            created_at: Utc::now(),
        };
        self.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn delete_reservation(&self, reservation_id: Uuid) -> Result<(), ServiceError> {
        let (_, reservation) = self
            .reservations
            .remove(&reservation_id)
            .ok_or_else(|| ServiceError::not_found("reservation", reservation_id))?;

        if let Some(quant_id) = self.matching_quant_id(
            reservation.lot_id,
            reservation.product_id,
            reservation.source_location_id,
        ) {
            if let Some(mut quant) = self.quants.get_mut(&quant_id) {
                quant.reserved_quantity =
                    (quant.reserved_quantity - reservation.quantity).max(Decimal::ZERO);
            }
        }
        Ok(())
    }
}
