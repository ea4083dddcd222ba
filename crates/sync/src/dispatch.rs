use std::sync::Arc;

use async_trait::async_trait;
use chain::TransactionEvent;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::error::SyncError;

/// Domain handler for stream events.
///
/// `can_handle` must be a pure predicate over the event; every processor
/// that accepts an event runs, concurrently with the others.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, event: &TransactionEvent) -> bool;

    async fn process(&self, event: &TransactionEvent) -> Result<(), SyncError>;
}

/// Ordered set of processors an event is routed through.
#[derive(Default)]
pub struct EventDispatchRegistry {
    processors: Vec<Arc<dyn MessageProcessor>>,
}

impl EventDispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn MessageProcessor>) {
        debug!(processor = processor.name(), "registered message processor");
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run every matching processor and wait for all of them. A failing
    /// processor is logged and does not affect the others. Returns the
    /// number of processors that matched.
    pub async fn dispatch(&self, event: &TransactionEvent) -> usize {
        let matched: Vec<_> = self
            .processors
            .iter()
            .filter(|p| p.can_handle(event))
            .collect();
        if matched.is_empty() {
            debug!(network = %event.network, height = event.height, kind = ?event.kind, "no processor for event");
            return 0;
        }

        let results = join_all(matched.iter().map(|p| p.process(event))).await;
        for (p, res) in matched.iter().zip(results) {
            if let Err(e) = res {
                warn!(
                    network = %event.network,
                    height = event.height,
                    processor = p.name(),
                    err = %e,
                    "message processor failed"
                );
            }
        }
        matched.len()
    }
}
