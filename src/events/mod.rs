use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Cloneable handle for publishing engine events onto the processing loop.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted by the engine after a change commits. Consumers (reporting,
/// notifications) subscribe downstream; the engine never blocks on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockRecordCreated {
        stock_record_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
    },
    StockMovementRegistered {
        movement_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        movement_type: String,
        origin: String,
        quantity: Decimal,
        new_quantity: Decimal,
    },
    ProductPricesUpdated {
        product_id: Uuid,
        cost_price: Option<Decimal>,
        sale_price: Option<Decimal>,
    },
    SerialReserved {
        serial_id: Uuid,
        sale_id: Uuid,
    },
    SerialSold {
        serial_id: Uuid,
    },
    SerialReleased {
        serial_id: Uuid,
    },
    TransferCreated {
        transfer_id: Uuid,
        code: String,
    },
    TransferSent {
        transfer_id: Uuid,
        line_count: usize,
    },
    TransferReceived {
        transfer_id: Uuid,
        completed: bool,
    },
    TransferCancelled {
        transfer_id: Uuid,
        was_in_transit: bool,
    },
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Drains the event channel for the lifetime of the process. Spawned once at
/// startup; each event is logged with structured fields.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processing loop started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::StockMovementRegistered {
                movement_id,
                warehouse_id,
                product_id,
                movement_type,
                quantity,
                new_quantity,
                ..
            } => {
                info!(
                    movement_id = %movement_id,
                    warehouse_id = %warehouse_id,
                    product_id = %product_id,
                    movement_type = %movement_type,
                    quantity = %quantity,
                    new_quantity = %new_quantity,
                    "Stock movement registered"
                );
            }
            Event::TransferSent {
                transfer_id,
                line_count,
            } => {
                info!(transfer_id = %transfer_id, lines = %line_count, "Transfer sent");
            }
            Event::TransferReceived {
                transfer_id,
                completed,
            } => {
                info!(transfer_id = %transfer_id, completed = %completed, "Transfer received");
            }
            other => {
                debug!(event = ?other, "Event processed");
            }
        }
    }
    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::SerialSold {
                serial_id: Uuid::new_v4(),
            })
            .await
            .expect("send should succeed");

        assert!(matches!(
            rx.recv().await,
            Some(Event::SerialSold { .. })
        ));
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender
            .send(Event::Generic {
                message: "orphan".into(),
                timestamp: Utc::now(),
            })
            .await;
        assert!(result.is_err());
    }
}
