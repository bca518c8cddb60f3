//! Conflict Validator Service
//!
//! Pre-confirmation check that a candidate lot set is not already committed
//! to a different confirmed order. A lot counts as committed when it sits on
//! a reservation of an active operation of such an order, or when it appears
//! in the visual selection of one of that order's lines. Draft and cancelled
//! orders never commit stock.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::{Order, OrderState};
use crate::errors::ServiceError;
use crate::store::{OrderStore, StockLedger};

/// Which side of the ledger claimed the lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommitmentSource {
    /// A reservation row on an active operation.
    Reservation,
    /// A line-level selection that has not reached the warehouse yet.
    Selection,
}

/// A candidate lot refused because another confirmed order holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotConflict {
    pub lot_id: Uuid,
    pub lot_name: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub source: CommitmentSource,
}

/// Service deciding whether lots are free to commit.
#[derive(Clone)]
pub struct ConflictValidator {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn StockLedger>,
}

impl ConflictValidator {
    pub fn new(orders: Arc<dyn OrderStore>, ledger: Arc<dyn StockLedger>) -> Self {
        Self { orders, ledger }
    }

    /// Returns the subset of `candidate_lots` committed to a confirmed order
    /// other than `excluding_order`, with enough detail for a user-facing
    /// refusal message.
    #[instrument(skip(self, candidate_lots), fields(candidates = candidate_lots.len()))]
    pub async fn find_conflicting_lots(
        &self,
        candidate_lots: &[Uuid],
        product_id: Uuid,
        excluding_order: Option<Uuid>,
    ) -> Result<Vec<LotConflict>, ServiceError> {
        let checks = candidate_lots.iter().map(|&lot_id| async move {
            let hit = self.committed_to(lot_id, excluding_order).await?;
            Ok::<_, ServiceError>((lot_id, hit))
        });

        let mut conflicts = Vec::new();
        for result in join_all(checks).await {
            let (lot_id, hit) = result?;
            if let Some((order, source)) = hit {
                let lot_name = self
                    .ledger
                    .get_lot(lot_id)
                    .await?
                    .map(|lot| lot.name)
                    .unwrap_or_else(|| lot_id.to_string());
                warn!(
                    lot_id = %lot_id,
                    lot_name = %lot_name,
                    product_id = %product_id,
                    committed_to = %order.order_number,
                    source = %source,
                    "Lot is already committed to another confirmed order"
                );
                conflicts.push(LotConflict {
                    lot_id,
                    lot_name,
                    order_id: order.id,
                    order_number: order.order_number,
                    source,
                });
            }
        }
        Ok(conflicts)
    }

    /// Finds the confirmed order (if any) holding `lot_id`, reservation side
    /// first. `excluding_order` lets an order re-check its own lots without
    /// tripping over itself.
    pub(crate) async fn committed_to(
        &self,
        lot_id: Uuid,
        excluding_order: Option<Uuid>,
    ) -> Result<Option<(Order, CommitmentSource)>, ServiceError> {
        for reservation in self.ledger.reservations_for_lot(lot_id).await? {
            let Some(operation) = self.ledger.get_operation(reservation.operation_id).await?
            else {
                continue;
            };
            if !operation.state.is_active() || Some(operation.order_id) == excluding_order {
                continue;
            }
            let Some(order) = self.orders.get_order(operation.order_id).await? else {
                continue;
            };
            if order.state == OrderState::Confirmed {
                return Ok(Some((order, CommitmentSource::Reservation)));
            }
        }

        for line in self.orders.lines_selecting_lot(lot_id).await? {
            if Some(line.order_id) == excluding_order {
                continue;
            }
            let Some(order) = self.orders.get_order(line.order_id).await? else {
                continue;
            };
            if order.state == OrderState::Confirmed {
                return Ok(Some((order, CommitmentSource::Selection)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::entities::{
        Location, LocationUsage, Lot, Operation, OperationState, Order, OrderLine, Quant,
    };
    use crate::store::memory::{InMemoryOrderStore, InMemoryStockLedger};
    use crate::store::NewReservation;

    struct Fixture {
        orders: Arc<InMemoryOrderStore>,
        ledger: Arc<InMemoryStockLedger>,
        validator: ConflictValidator,
        product_id: Uuid,
        stock_id: Uuid,
        customers_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let orders = Arc::new(InMemoryOrderStore::new());
        let ledger = Arc::new(InMemoryStockLedger::new());
        let validator = ConflictValidator::new(orders.clone(), ledger.clone());
        let product_id = Uuid::new_v4();

        let stock = Location::new("Stock", LocationUsage::Internal);
        let customers = Location::new("Customers", LocationUsage::Customer);
        let (stock_id, customers_id) = (stock.id, customers.id);
        ledger.insert_location(stock).await.unwrap();
        ledger.insert_location(customers).await.unwrap();

        Fixture {
            orders,
            ledger,
            validator,
            product_id,
            stock_id,
            customers_id,
        }
    }

    async fn seed_lot(fx: &Fixture, name: &str) -> Uuid {
        let lot = Lot::new(name, fx.product_id);
        let lot_id = lot.id;
        fx.ledger.insert_lot(lot).await.unwrap();
        fx.ledger
            .insert_quant(Quant::new(Some(lot_id), fx.product_id, fx.stock_id, dec!(5)))
            .await
            .unwrap();
        lot_id
    }

    async fn seed_order(fx: &Fixture, number: &str, state: OrderState) -> Order {
        let mut order = Order::new(number, Uuid::new_v4(), fx.stock_id, fx.customers_id);
        order.state = state;
        fx.orders.insert_order(order.clone()).await.unwrap();
        order
    }

    #[tokio::test]
    async fn reservation_on_confirmed_order_commits_the_lot() {
        let fx = fixture().await;
        let lot_id = seed_lot(&fx, "L-0001").await;
        let other = seed_order(&fx, "S00001", OrderState::Confirmed).await;

        let operation = Operation::outgoing(
            other.id,
            None,
            fx.product_id,
            fx.stock_id,
            fx.customers_id,
            dec!(5),
        );
        fx.ledger.insert_operation(operation.clone()).await.unwrap();
        fx.ledger
            .create_reservation(NewReservation {
                operation_id: operation.id,
                product_id: fx.product_id,
                lot_id: Some(lot_id),
                source_location_id: fx.stock_id,
                dest_location_id: fx.customers_id,
                quantity: dec!(5),
            })
            .await
            .unwrap();

        let conflicts = fx
            .validator
            .find_conflicting_lots(&[lot_id], fx.product_id, None)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].lot_name, "L-0001");
        assert_eq!(conflicts[0].order_number, "S00001");
        assert_eq!(conflicts[0].source, CommitmentSource::Reservation);

        // The committing order itself is allowed to re-check its lots.
        let own_view = fx
            .validator
            .find_conflicting_lots(&[lot_id], fx.product_id, Some(other.id))
            .await
            .unwrap();
        assert!(own_view.is_empty());
    }

    #[tokio::test]
    async fn selection_on_confirmed_order_commits_the_lot() {
        let fx = fixture().await;
        let lot_id = seed_lot(&fx, "L-0002").await;
        let other = seed_order(&fx, "S00002", OrderState::Confirmed).await;

        let mut line = OrderLine::new(other.id, fx.product_id, dec!(5));
        line.selected_lot_ids = vec![lot_id];
        fx.orders.insert_line(line).await.unwrap();

        let conflicts = fx
            .validator
            .find_conflicting_lots(&[lot_id], fx.product_id, None)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].source, CommitmentSource::Selection);
    }

    #[tokio::test]
    async fn draft_and_cancelled_orders_do_not_commit() {
        let fx = fixture().await;
        let lot_id = seed_lot(&fx, "L-0003").await;

        let draft = seed_order(&fx, "S00003", OrderState::Draft).await;
        let mut draft_line = OrderLine::new(draft.id, fx.product_id, dec!(5));
        draft_line.selected_lot_ids = vec![lot_id];
        fx.orders.insert_line(draft_line).await.unwrap();

        let cancelled = seed_order(&fx, "S00004", OrderState::Cancelled).await;
        let mut cancelled_line = OrderLine::new(cancelled.id, fx.product_id, dec!(5));
        cancelled_line.selected_lot_ids = vec![lot_id];
        fx.orders.insert_line(cancelled_line).await.unwrap();

        let conflicts = fx
            .validator
            .find_conflicting_lots(&[lot_id], fx.product_id, None)
            .await
            .unwrap();
        assert!(conflicts.is_empty());
    }

    #[tokio::test]
    async fn inactive_operations_do_not_commit() {
        let fx = fixture().await;
        let lot_id = seed_lot(&fx, "L-0005").await;
        let other = seed_order(&fx, "S00005", OrderState::Confirmed).await;

        let mut operation = Operation::outgoing(
            other.id,
            None,
            fx.product_id,
            fx.stock_id,
            fx.customers_id,
            dec!(5),
        );
        operation.state = OperationState::Cancelled;
        fx.ledger.insert_operation(operation.clone()).await.unwrap();
        fx.ledger
            .create_reservation(NewReservation {
                operation_id: operation.id,
                product_id: fx.product_id,
                lot_id: Some(lot_id),
                source_location_id: fx.stock_id,
                dest_location_id: fx.customers_id,
                quantity: dec!(5),
            })
            .await
            .unwrap();

        let conflicts = fx
            .validator
            .find_conflicting_lots(&[lot_id], fx.product_id, None)
            .await
            .unwrap();
        assert!(conflicts.is_empty());
    }
}
