//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with various backends.

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Logging-based event publisher.
///
/// Writes each domain event as a JSON field on a tracing record, which
/// doubles as the audit trail of encode operations.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventPublisher {
    /// Create a publisher that logs at debug level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let event_type = event.event_type();
        let operation_id = event
            .operation_id()
            .map(|id| id.to_string())
            .unwrap_or_default();
        let json = serde_json::to_string(&event)?;

        if self.info_level {
            info!(event_type, operation_id = %operation_id, event = %json, "Domain event");
        } else {
            debug!(event_type, operation_id = %operation_id, event = %json, "Domain event");
        }

        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// In-memory event collector for testing.
///
/// Collects events in memory for later inspection during tests.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    /// Create a new in-memory event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    /// Get the count of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Get the events of one encode operation, in publish order.
    pub fn events_for(&self, operation_id: Uuid) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.operation_id() == Some(operation_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::ContentId;
    use crate::domain::ports::StrategyKind;

    fn started(op: Uuid) -> DomainEvent {
        DomainEvent::encode_started(op, "/ipfs/root", StrategyKind::ReedSolomon, 3)
    }

    #[tokio::test]
    async fn test_logging_publisher() {
        let publisher = LoggingEventPublisher::new();

        // Should not panic
        publisher.publish(started(Uuid::new_v4())).await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_collector() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        let op = Uuid::new_v4();
        let root = ContentId::for_bytes(b"root");
        let encoded = ContentId::for_bytes(b"encoded");
        collector.publish(started(op)).await.unwrap();
        collector.publish(started(Uuid::new_v4())).await.unwrap();
        collector
            .publish(DomainEvent::retention_swapped(&root, &encoded, true))
            .await
            .unwrap();

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.events_of_type("EncodeStarted").len(), 2);
        assert_eq!(collector.events_for(op).len(), 1);

        collector.clear();
        assert!(collector.is_empty());
    }
}
