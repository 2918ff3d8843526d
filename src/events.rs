//! Outbound event pipeline. Core operations emit after their transaction
//! commits; this consumer is the seam where a real-time notification layer
//! would attach. It never participates in a financial invariant.

use tokio::sync::mpsc;
use tracing::info;

use crate::types::EngineEvent;

pub struct Notifier {
    events_rx: mpsc::Receiver<EngineEvent>,
}

impl Notifier {
    pub fn new(events_rx: mpsc::Receiver<EngineEvent>) -> Self {
        Self { events_rx }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            match &event {
                EngineEvent::PurchaseCompleted { account_id, team_id, quantity, amount } => {
                    info!(
                        event = "PURCHASE_COMPLETED",
                        account_id = %account_id,
                        team_id = %team_id,
                        quantity,
                        amount,
                        "PURCHASE | {account_id} bought {quantity} x {team_id} for {amount}",
                    );
                }
                EngineEvent::SettlementApplied { fixture_id, result, transfer_amount } => {
                    info!(
                        event = "SETTLEMENT_APPLIED",
                        fixture_id = %fixture_id,
                        result = %result,
                        transfer_amount,
                        "SETTLEMENT | {fixture_id} {result} transfer {transfer_amount}",
                    );
                }
            }
        }
    }
}
