// ABOUTME: Change capture - turns domain mutation events into ledger entries
// ABOUTME: Listener task appends every tracked entity event to the change ledger

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use sync_ledger::{ChangeEvent, ChangeLedger, ChangeOperation, NewChange};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::context::SyncContext;

/// Entity types whose mutations are recorded by default.
pub const TRACKED_ENTITIES: &[&str] = &["Product", "Customer", "Order"];

const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A local domain mutation.
#[derive(Debug, Clone)]
pub struct EntityEvent {
    pub entity_name: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub ctx: SyncContext,
}

/// In-process fan-out of domain events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EntityEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event and returns how many subscribers received it.
    pub fn publish(&self, event: EntityEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::warn!(
                    entity = %event.entity_name,
                    entity_id = %event.entity_id,
                    operation = %event.operation,
                    "No change listener subscribed; event will not reach the ledger"
                );
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.tx.subscribe()
    }
}

/// Write surface of the change ledger for domain code.
#[derive(Clone)]
pub struct ChangeRecorder {
    ledger: Arc<dyn ChangeLedger>,
    tracked: HashSet<String>,
}

impl ChangeRecorder {
    pub fn new(ledger: Arc<dyn ChangeLedger>) -> Self {
        Self::with_tracked(ledger, TRACKED_ENTITIES.iter().copied())
    }

    pub fn with_tracked<'a>(
        ledger: Arc<dyn ChangeLedger>,
        entities: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            ledger,
            tracked: entities.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn is_tracked(&self, entity_name: &str) -> bool {
        self.tracked.contains(entity_name)
    }

    /// Appends a change to the ledger.
    pub fn record_change(
        &self,
        entity_name: &str,
        entity_id: &str,
        operation: ChangeOperation,
        metadata: &str,
    ) -> Result<ChangeEvent> {
        let event = self.ledger.append(
            &NewChange::new(entity_name, entity_id, operation).with_metadata(metadata),
        )?;
        tracing::info!(
            entity = entity_name,
            entity_id,
            operation = %event.operation,
            change_id = event.id,
            "Change recorded"
        );
        Ok(event)
    }

    /// Subscribes to `bus` and records every tracked event until `shutdown`
    /// fires or the bus is dropped. Events already published when shutdown
    /// arrives are still recorded. The task yields the number of changes
    /// written.
    pub fn spawn(self, bus: &EventBus, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<u64> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            let mut recorded = 0u64;
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.recv() => {
                        recorded += self.drain(&mut rx);
                        tracing::debug!(recorded, "Change listener stopping");
                        break;
                    }
                    received = rx.recv() => match received {
                        Ok(event) => recorded += self.handle(&event),
                        Err(broadcast::error::RecvError::Lagged(missed)) => report_lagged(missed),
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            recorded
        })
    }

    /// Records whatever is still buffered without waiting for more.
    fn drain(&self, rx: &mut broadcast::Receiver<EntityEvent>) -> u64 {
        let mut recorded = 0;
        loop {
            match rx.try_recv() {
                Ok(event) => recorded += self.handle(&event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => report_lagged(missed),
                Err(_) => return recorded,
            }
        }
    }

    fn handle(&self, event: &EntityEvent) -> u64 {
        if !self.is_tracked(&event.entity_name) {
            return 0;
        }
        let operation = event.operation.clone();
        match self.record_change(&event.entity_name, &event.entity_id, operation, "") {
            Ok(_) => 1,
            Err(err) => {
                tracing::error!(
                    entity = %event.entity_name,
                    entity_id = %event.entity_id,
                    operation = %event.operation,
                    request_id = %event.ctx.request_id,
                    "Failed to record change: {:?}",
                    err
                );
                0
            }
        }
    }
}

fn report_lagged(missed: u64) {
    tracing::error!(
        missed,
        "Change listener fell behind; {} events were not recorded and will not be synced",
        missed
    );
}
