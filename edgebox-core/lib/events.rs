//! Container lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::container::Container;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Events buffered per subscriber before the slowest one starts lagging.
pub const DEFAULT_EVENTS_CAPACITY: usize = 256;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What happened to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEventKind {
    /// The container was created.
    Created,

    /// The container was started.
    Started,

    /// The container was stopped.
    Stopped,

    /// The container was removed.
    Removed,
}

/// A container lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEvent {
    /// What happened.
    pub kind: ContainerEventKind,

    /// The container after the change.
    pub container: Container,

    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// A broadcast bus of container events.
#[derive(Debug)]
pub struct EventsManager {
    sender: broadcast::Sender<ContainerEvent>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerEvent {
    /// Creates an event stamped with the current time.
    pub fn new(kind: ContainerEventKind, container: Container) -> Self {
        Self {
            kind,
            container,
            timestamp: Utc::now(),
        }
    }
}

impl EventsManager {
    /// Creates a bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ContainerEvent) {
        tracing::trace!("container {} {:?}", event.container.id, event.kind);
        let _ = self.sender.send(event);
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        self.sender.subscribe()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for EventsManager {
    fn default() -> Self {
        Self::new(DEFAULT_EVENTS_CAPACITY)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() -> anyhow::Result<()> {
        let events = EventsManager::default();
        events.publish(ContainerEvent::new(
            ContainerEventKind::Created,
            Container::new("lost", "lost"),
        ));

        let mut receiver = events.subscribe();
        events.publish(ContainerEvent::new(
            ContainerEventKind::Created,
            Container::new("c1", "web"),
        ));
        events.publish(ContainerEvent::new(
            ContainerEventKind::Started,
            Container::new("c1", "web"),
        ));

        let first = receiver.recv().await?;
        assert_eq!(first.kind, ContainerEventKind::Created);
        assert_eq!(first.container.id, "c1");
        assert_eq!(receiver.recv().await?.kind, ContainerEventKind::Started);
        Ok(())
    }
}
