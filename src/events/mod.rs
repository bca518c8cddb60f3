use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cloneable handle for publishing engine events to the processing loop.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, downgrading a send failure to a warning. Reconciliation
    /// never fails because the events channel is closed or full.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Failed to publish event: {}", e);
        }
    }
}

// The events this engine can emit while reconciling and syncing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Confirmation events
    OrderConfirmed {
        order_id: Uuid,
        reservations_created: u64,
        lots_skipped: u64,
    },
    OrderDuplicated {
        source_order_id: Uuid,
        new_order_id: Uuid,
    },

    // Reservation events
    ReservationCreated {
        operation_id: Uuid,
        lot_id: Option<Uuid>,
        quantity: Decimal,
    },
    ReservationsCleared {
        operation_id: Uuid,
        removed: u64,
    },
    LotUnassignable {
        order_id: Uuid,
        line_id: Uuid,
        lot_id: Uuid,
    },
    ReservationWriteFailed {
        operation_id: Uuid,
        lot_id: Uuid,
        reason: String,
    },

    // Sync events
    LineSelectionSynced {
        line_id: Uuid,
        operation_id: Uuid,
        lot_count: u64,
    },
    LineQuantityRecomputed {
        line_id: Uuid,
        quantity: Decimal,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Trait for handling events. Handlers implementing this trait process events
// asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

// Drains the event channel and dispatches each event to its handler.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderConfirmed {
                order_id,
                reservations_created,
                lots_skipped,
            } => {
                if let Err(e) =
                    handle_order_confirmed(order_id, reservations_created, lots_skipped).await
                {
                    warn!(
                        "Failed to handle order confirmed event: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::LotUnassignable {
                order_id,
                line_id,
                lot_id,
            } => {
                if let Err(e) = handle_lot_unassignable(order_id, line_id, lot_id).await {
                    warn!(
                        "Failed to handle lot unassignable event: lot_id={}, error={}",
                        lot_id, e
                    );
                }
            }
            Event::ReservationWriteFailed {
                operation_id,
                lot_id,
                reason,
            } => {
                warn!(
                    "Reservation write failed: operation_id={}, lot_id={}, reason={}",
                    operation_id, lot_id, reason
                );
            }
            Event::ReservationCreated {
                operation_id,
                lot_id,
                quantity,
            } => {
                info!(
                    "Reservation created: operation_id={}, lot_id={:?}, quantity={}",
                    operation_id, lot_id, quantity
                );
            }
            Event::ReservationsCleared {
                operation_id,
                removed,
            } => {
                info!(
                    "Reservations cleared: operation_id={}, removed={}",
                    operation_id, removed
                );
            }
            Event::LineSelectionSynced {
                line_id,
                operation_id,
                lot_count,
            } => {
                info!(
                    "Line selection synced: line_id={}, operation_id={}, lot_count={}",
                    line_id, operation_id, lot_count
                );
            }
            _ => {
                info!("No specific handler for event: {:?}", event);
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_order_confirmed(
    order_id: Uuid,
    reservations_created: u64,
    lots_skipped: u64,
) -> Result<(), String> {
    info!(
        "Order {} confirmed: {} reservations created, {} lots skipped",
        order_id, reservations_created, lots_skipped
    );

    if lots_skipped > 0 {
        warn!(
            "Order {} confirmed with {} unreservable lots - warehouse follow-up needed",
            order_id, lots_skipped
        );
        // A notification hook would go here (purchasing / warehouse team)
    }

    Ok(())
}

async fn handle_lot_unassignable(
    order_id: Uuid,
    line_id: Uuid,
    lot_id: Uuid,
) -> Result<(), String> {
    warn!(
        "LOT UNASSIGNABLE: lot {} on line {} of order {} has no internal stock",
        lot_id, line_id, order_id
    );

    Ok(())
}
