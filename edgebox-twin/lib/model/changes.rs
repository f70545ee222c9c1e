use serde_json::Value;
use tokio::sync::broadcast;

use super::NamespacedId;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default capacity of a change bus.
pub const DEFAULT_CHANGES_CAPACITY: usize = 256;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What happened to the target of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The target did not exist before.
    Created,

    /// The target existed and was replaced.
    Modified,

    /// The target was removed.
    Deleted,
}

/// One change to a thing or to the registry.
///
/// `path` uses the twin path grammar, so `/` is the whole thing and `/features/<id>/properties/<p>`
/// a single property.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// The changed thing.
    pub thing_id: NamespacedId,

    /// Kind of the change.
    pub kind: ChangeKind,

    /// Path of the changed value.
    pub path: String,

    /// Value before the change.
    pub old: Option<Value>,

    /// Value after the change.
    pub new: Option<Value>,
}

/// Broadcasts [`ChangeRecord`]s. Clones share the channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeRecord>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ChangeKind {
    /// The kind for a write that replaced `old`.
    pub fn of_write(old: &Option<Value>) -> Self {
        if old.is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Created
        }
    }
}

impl ChangeBus {
    /// Creates a bus buffering up to `capacity` records per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes a record. Without subscribers the record is dropped.
    pub fn publish(&self, record: ChangeRecord) {
        let _ = self.sender.send(record);
    }

    /// Subscribes to records published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeRecord> {
        self.sender.subscribe()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGES_CAPACITY)
    }
}
