use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use serde_json::Value;

use crate::{
    protocol::{PathKind, ThingError},
    TwinResult,
};

use super::{ChangeBus, ChangeKind, ChangeRecord, NamespacedId, Thing};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The things known to the twin client, by id.
///
/// Adding, replacing and removing things is reported on the registry's [`ChangeBus`] with path
/// `/`. Things added here report their own changes on the same bus.
#[derive(Debug, Default)]
pub struct ThingRegistry {
    things: RwLock<BTreeMap<NamespacedId, Arc<Thing>>>,
    changes: ChangeBus,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ThingRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry's change bus.
    pub fn change_bus(&self) -> &ChangeBus {
        &self.changes
    }

    /// Adds a thing, replacing one with the same id.
    pub fn add(&self, thing: Thing) -> Arc<Thing> {
        let thing = Arc::new(thing.with_change_bus(self.changes.clone()));
        let old = self
            .things
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thing.id().clone(), thing.clone());

        let old = old.map(|t| t.to_value());
        self.changes.publish(ChangeRecord {
            thing_id: thing.id().clone(),
            kind: ChangeKind::of_write(&old),
            path: "/".to_string(),
            old,
            new: Some(thing.to_value()),
        });

        thing
    }

    /// Looks up a thing.
    pub fn get(&self, id: &NamespacedId) -> Option<Arc<Thing>> {
        self.things
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// All things, ordered by id.
    pub fn all(&self) -> Vec<Arc<Thing>> {
        self.things
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Removes a thing.
    pub fn remove(&self, id: &NamespacedId) -> Option<Arc<Thing>> {
        let removed = self
            .things
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;

        self.changes.publish(ChangeRecord {
            thing_id: id.clone(),
            kind: ChangeKind::Deleted,
            path: "/".to_string(),
            old: Some(removed.to_value()),
            new: None,
        });

        Some(removed)
    }

    /// Applies a change event reported by the twin.
    ///
    /// Whole-thing events add, replace or remove the thing. Other events require the thing to be
    /// known.
    pub async fn apply_event(
        &self,
        id: &NamespacedId,
        kind: ChangeKind,
        path: &str,
        value: Option<Value>,
    ) -> TwinResult<()> {
        if PathKind::parse(path) == Some(PathKind::Thing) {
            match (kind, value) {
                (ChangeKind::Deleted, _) => {
                    self.remove(id);
                }
                (_, Some(value)) => match self.get(id) {
                    Some(thing) => thing.apply_event(kind, path, Some(value)).await?,
                    None => {
                        self.add(Thing::from_value(id.clone(), value)?);
                    }
                },
                (_, None) => {
                    return Err(ThingError::parameter_invalid("thing event without value").into())
                }
            }
            return Ok(());
        }

        let thing = self
            .get(id)
            .ok_or_else(|| ThingError::subject_not_found(format!("thing {id} not found")))?;
        thing.apply_event(kind, path, value).await
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::TwinError;

    use super::*;

    #[tokio::test]
    async fn test_registry_reports_things_and_their_changes() -> anyhow::Result<()> {
        let registry = ThingRegistry::new();
        let mut changes = registry.change_bus().subscribe();
        let id: NamespacedId = "ns:gw:d".parse()?;

        let thing = registry.add(Thing::new(id.clone()));
        let added = changes.try_recv()?;
        assert_eq!((added.kind, added.path.as_str()), (ChangeKind::Created, "/"));

        thing.set_attribute("site", json!("north")).await?;
        let modified = changes.try_recv()?;
        assert_eq!(modified.path, "/attributes/site");
        assert_eq!(modified.kind, ChangeKind::Created);

        assert!(registry.remove(&id).is_some());
        assert_eq!(changes.try_recv()?.kind, ChangeKind::Deleted);
        assert!(registry.get(&id).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_whole_thing_events() -> anyhow::Result<()> {
        let registry = ThingRegistry::new();
        let id: NamespacedId = "ns:other".parse()?;

        registry
            .apply_event(
                &id,
                ChangeKind::Created,
                "/",
                Some(json!({ "thingId": "ns:other", "attributes": { "a": 1 } })),
            )
            .await?;
        assert_eq!(
            registry.get(&id).and_then(|t| t.attribute("a")),
            Some(json!(1))
        );

        registry
            .apply_event(&id, ChangeKind::Modified, "/attributes/a", Some(json!(2)))
            .await?;
        assert_eq!(
            registry.get(&id).and_then(|t| t.attribute("a")),
            Some(json!(2))
        );

        registry
            .apply_event(&id, ChangeKind::Deleted, "/", None)
            .await?;
        assert!(registry.all().is_empty());

        let err = registry
            .apply_event(&id, ChangeKind::Modified, "/attributes/a", Some(json!(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, TwinError::ThingError(e) if e.status == 404));
        Ok(())
    }
}
