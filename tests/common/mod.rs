#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use slabstock::config::EngineConfig;
use slabstock::entities::{Location, LocationUsage, Lot, Order, OrderLine, Quant, Reservation};
use slabstock::events::{Event, EventSender};
use slabstock::services::confirmation::{AutoAssignCleaner, FifoConfirmation, StripAllCleaner};
use slabstock::store::memory::{InMemoryOrderStore, InMemoryStockLedger};
use slabstock::store::{OrderStore, StockLedger};
use slabstock::Engine;

/// Harness wiring an engine over in-memory stores with a seeded location
/// tree: a WH warehouse with Zone1 and Zone2, a standalone internal Annex,
/// and a Customers location.
pub struct TestEngine {
    pub engine: Engine,
    pub orders: Arc<dyn OrderStore>,
    pub ledger: Arc<dyn StockLedger>,
    pub warehouse_id: Uuid,
    pub zone1_id: Uuid,
    pub zone2_id: Uuid,
    pub annex_id: Uuid,
    pub customers_id: Uuid,
}

impl TestEngine {
    pub async fn new() -> Self {
        Self::build(EngineConfig::default(), false, None).await
    }

    /// Harness with the external strip-all cleaner installed.
    pub async fn with_cleaner() -> Self {
        Self::build(EngineConfig::default(), true, None).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        Self::build(config, false, None).await
    }

    /// Harness plus a receiver for the engine's event stream.
    pub async fn with_events() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(64);
        let harness =
            Self::build(EngineConfig::default(), false, Some(EventSender::new(tx))).await;
        (harness, rx)
    }

    async fn build(
        config: EngineConfig,
        with_cleaner: bool,
        events: Option<EventSender>,
    ) -> Self {
        let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let ledger: Arc<dyn StockLedger> = Arc::new(InMemoryStockLedger::new());
        let flow = Arc::new(FifoConfirmation::new(ledger.clone()));
        let cleaner: Option<Arc<dyn AutoAssignCleaner>> = if with_cleaner {
            Some(Arc::new(StripAllCleaner::new(ledger.clone())))
        } else {
            None
        };
        let engine = Engine::new(orders.clone(), ledger.clone(), flow, cleaner, config, events);

        let warehouse = Location::new("WH", LocationUsage::Internal);
        let zone1 = Location::child_of("WH/Zone1", LocationUsage::Internal, warehouse.id);
        let zone2 = Location::child_of("WH/Zone2", LocationUsage::Internal, warehouse.id);
        let annex = Location::new("Annex", LocationUsage::Internal);
        let customers = Location::new("Customers", LocationUsage::Customer);
        let (warehouse_id, zone1_id, zone2_id, annex_id, customers_id) =
            (warehouse.id, zone1.id, zone2.id, annex.id, customers.id);
        for location in [warehouse, zone1, zone2, annex, customers] {
            ledger.insert_location(location).await.expect("seed location");
        }

        Self {
            engine,
            orders,
            ledger,
            warehouse_id,
            zone1_id,
            zone2_id,
            annex_id,
            customers_id,
        }
    }

    /// Seeds a lot with one quant at `location_id`.
    pub async fn seed_lot(
        &self,
        name: &str,
        product_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
    ) -> Uuid {
        self.seed_lot_aged(name, product_id, location_id, quantity, 0)
            .await
    }

    /// Seeds a lot whose quant arrived `days_ago`, to steer FIFO ordering.
    pub async fn seed_lot_aged(
        &self,
        name: &str,
        product_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
        days_ago: i64,
    ) -> Uuid {
        let lot = Lot::new(name, product_id);
        let lot_id = lot.id;
        self.ledger.insert_lot(lot).await.expect("seed lot");
        let mut quant = Quant::new(Some(lot_id), product_id, location_id, quantity);
        quant.received_at = Utc::now() - Duration::days(days_ago);
        self.ledger.insert_quant(quant).await.expect("seed quant");
        lot_id
    }

    /// Seeds an attribute-rich lot with one quant.
    pub async fn seed_described_lot(
        &self,
        lot: Lot,
        location_id: Uuid,
        quantity: Decimal,
    ) -> Uuid {
        let lot_id = lot.id;
        let product_id = lot.product_id;
        self.ledger.insert_lot(lot).await.expect("seed lot");
        self.ledger
            .insert_quant(Quant::new(Some(lot_id), product_id, location_id, quantity))
            .await
            .expect("seed quant");
        lot_id
    }

    /// Seeds a lot with no stock anywhere.
    pub async fn seed_stockless_lot(&self, name: &str, product_id: Uuid) -> Uuid {
        let lot = Lot::new(name, product_id);
        let lot_id = lot.id;
        self.ledger.insert_lot(lot).await.expect("seed lot");
        lot_id
    }

    /// Seeds a draft order shipping WH to Customers.
    pub async fn seed_order(&self, number: &str) -> Order {
        let order = Order::new(number, Uuid::new_v4(), self.warehouse_id, self.customers_id);
        self.orders.insert_order(order.clone()).await.expect("seed order");
        order
    }

    /// Seeds a line, optionally with a lot selection.
    pub async fn seed_line(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        quantity: Decimal,
        selection: &[Uuid],
    ) -> Uuid {
        let mut line = OrderLine::new(order_id, product_id, quantity);
        line.selected_lot_ids = selection.to_vec();
        let line_id = line.id;
        self.orders.insert_line(line).await.expect("seed line");
        line_id
    }

    /// Lots reserved across all operations of an order.
    pub async fn reserved_lot_set(&self, order_id: Uuid) -> HashSet<Uuid> {
        self.ledger
            .reservations_for_order(order_id)
            .await
            .expect("list reservations")
            .into_iter()
            .filter_map(|reservation| reservation.lot_id)
            .collect()
    }

    /// The single reservation for `lot_id` on the order.
    pub async fn reservation_for_lot(&self, order_id: Uuid, lot_id: Uuid) -> Reservation {
        let mut matches: Vec<Reservation> = self
            .ledger
            .reservations_for_order(order_id)
            .await
            .expect("list reservations")
            .into_iter()
            .filter(|reservation| reservation.lot_id == Some(lot_id))
            .collect();
        assert_eq!(matches.len(), 1, "expected exactly one reservation for lot");
        matches.remove(0)
    }

    /// Total reserved quantity held against a lot, across its quants.
    pub async fn reserved_quantity_of(&self, lot_id: Uuid) -> Decimal {
        self.ledger
            .quants_for_lot(lot_id)
            .await
            .expect("list quants")
            .iter()
            .map(|quant| quant.reserved_quantity)
            .sum()
    }
}

/// Drains every event currently buffered on the receiver.
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
