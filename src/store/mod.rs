/*!
 * # Store Seams
 *
 * Persistence is supplied by the host through these traits; the engine
 * never owns a database. `memory` ships reference implementations backed
 * by concurrent maps, used by the tests and by embedded deployments.
 */

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{
    Location, Lot, Operation, OperationState, Order, OrderLine, OrderState, Quant, Reservation,
};
use crate::errors::ServiceError;

pub mod memory;

/// Input for creating a reservation on an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    pub operation_id: Uuid,
    pub product_id: Uuid,
    pub lot_id: Option<Uuid>,
    pub source_location_id: Uuid,
    pub dest_location_id: Uuid,
    pub quantity: Decimal,
}

/// Order-side persistence: orders, lines, selections.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, ServiceError>;
    async fn insert_order(&self, order: Order) -> Result<(), ServiceError>;

    /// Transitions the order state. Moving to `Confirmed` stamps
    /// `confirmed_at`.
    async fn set_order_state(
        &self,
        order_id: Uuid,
        state: OrderState,
    ) -> Result<(), ServiceError>;

    async fn get_line(&self, line_id: Uuid) -> Result<Option<OrderLine>, ServiceError>;
    async fn lines_for_order(&self, order_id: Uuid) -> Result<Vec<OrderLine>, ServiceError>;
    async fn insert_line(&self, line: OrderLine) -> Result<(), ServiceError>;
    async fn set_line_selection(
        &self,
        line_id: Uuid,
        lot_ids: Vec<Uuid>,
    ) -> Result<(), ServiceError>;
    async fn set_line_quantity(
        &self,
        line_id: Uuid,
        quantity: Decimal,
    ) -> Result<(), ServiceError>;

    /// Reverse lookup: every line whose selection references the lot.
    async fn lines_selecting_lot(&self, lot_id: Uuid) -> Result<Vec<OrderLine>, ServiceError>;
}

/// Warehouse-side persistence: lots, locations, quants, operations,
/// reservations.
///
/// Reservation discipline: `create_reservation` re-validates quant
/// availability at write time and adjusts the quant's `reserved_quantity`;
/// `delete_reservation` releases it. A creation that would push reserved
/// above on-hand fails with `InsufficientStock`.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn get_lot(&self, lot_id: Uuid) -> Result<Option<Lot>, ServiceError>;
    async fn insert_lot(&self, lot: Lot) -> Result<(), ServiceError>;

    async fn get_location(&self, location_id: Uuid) -> Result<Option<Location>, ServiceError>;
    async fn insert_location(&self, location: Location) -> Result<(), ServiceError>;

    /// True when `location_id` is `root_id` or sits anywhere below it.
    async fn location_in_subtree(
        &self,
        location_id: Uuid,
        root_id: Uuid,
    ) -> Result<bool, ServiceError>;

    async fn get_quant(&self, quant_id: Uuid) -> Result<Option<Quant>, ServiceError>;
    async fn insert_quant(&self, quant: Quant) -> Result<(), ServiceError>;
    async fn quants_for_lot(&self, lot_id: Uuid) -> Result<Vec<Quant>, ServiceError>;
    async fn quants_for_product(&self, product_id: Uuid) -> Result<Vec<Quant>, ServiceError>;

    async fn get_operation(&self, operation_id: Uuid) -> Result<Option<Operation>, ServiceError>;
    async fn insert_operation(&self, operation: Operation) -> Result<(), ServiceError>;
    async fn set_operation_state(
        &self,
        operation_id: Uuid,
        state: OperationState,
    ) -> Result<(), ServiceError>;
    async fn operations_for_order(&self, order_id: Uuid)
        -> Result<Vec<Operation>, ServiceError>;

    async fn reservations_for_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Vec<Reservation>, ServiceError>;
    async fn reservations_for_lot(&self, lot_id: Uuid)
        -> Result<Vec<Reservation>, ServiceError>;
    async fn reservations_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Reservation>, ServiceError>;
    async fn create_reservation(
        &self,
        new: NewReservation,
    ) -> Result<Reservation, ServiceError>;
    async fn delete_reservation(&self, reservation_id: Uuid) -> Result<(), ServiceError>;
}
