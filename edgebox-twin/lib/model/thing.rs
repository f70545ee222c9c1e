use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{
    protocol::{
        attribute_path, attributes_path, definition_path, feature_definition_path, feature_path,
        feature_properties_path, feature_property_path, Action, Channel, Criterion, Envelope,
        Headers, PathKind, ThingError, Topic,
    },
    TwinResult,
};

use super::{pointer, ChangeBus, ChangeKind, ChangeRecord, DefinitionId, Feature, NamespacedId};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Answers operations invoked on a thing or a feature.
///
/// Called with the operation name and the raw request value. `Ok(None)` means success without a
/// payload. Returning a [`ThingError`] answers with that error; any other error is reported as an
/// execution failure.
pub type OperationsHandler =
    Arc<dyn Fn(String, Option<Value>) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;

/// Sends the envelopes of local changes to the twin.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one envelope.
    async fn publish(&self, envelope: Envelope) -> TwinResult<()>;
}

/// The data of a thing, in its JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingSnapshot {
    /// The thing id.
    pub thing_id: Option<NamespacedId>,

    /// The policy id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<NamespacedId>,

    /// The definition id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<DefinitionId>,

    /// The attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,

    /// The features by id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, Feature>,
}

/// A thing of the local twin replica.
///
/// Reads take a shared lock. Writes are serialized and, when a [`Publisher`] is attached, only
/// applied after their envelope was published.
pub struct Thing {
    id: NamespacedId,
    state: RwLock<ThingSnapshot>,
    write_gate: Mutex<()>,
    publisher: RwLock<Option<Arc<dyn Publisher>>>,
    operations: RwLock<Option<OperationsHandler>>,
    feature_operations: RwLock<HashMap<String, OperationsHandler>>,
    changes: ChangeBus,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ThingSnapshot {
    fn normalize(&mut self) {
        for (id, feature) in self.features.iter_mut() {
            feature.id = id.clone();
        }
    }
}

impl Thing {
    /// Creates an empty thing.
    pub fn new(id: NamespacedId) -> Self {
        Self {
            state: RwLock::new(ThingSnapshot {
                thing_id: Some(id.clone()),
                ..Default::default()
            }),
            id,
            write_gate: Mutex::new(()),
            publisher: RwLock::new(None),
            operations: RwLock::new(None),
            feature_operations: RwLock::new(HashMap::new()),
            changes: ChangeBus::default(),
        }
    }

    /// Creates a thing from its JSON form. `id` wins over a `thingId` in the value.
    pub fn from_value(id: NamespacedId, value: Value) -> TwinResult<Self> {
        let mut snapshot: ThingSnapshot = serde_json::from_value(value)?;
        snapshot.thing_id = Some(id.clone());
        snapshot.normalize();

        let thing = Self::new(id);
        *thing.write() = snapshot;
        Ok(thing)
    }

    /// Sets the policy id without publishing.
    pub fn with_policy_id(self, policy_id: NamespacedId) -> Self {
        self.write().policy_id = Some(policy_id);
        self
    }

    /// Sets the definition id without publishing.
    pub fn with_definition_id(self, definition: DefinitionId) -> Self {
        self.write().definition = Some(definition);
        self
    }

    /// Sets an attribute without publishing.
    pub fn with_attribute(self, name: &str, value: Value) -> Self {
        pointer::set(&mut self.write().attributes, name, value);
        self
    }

    /// Adds a feature without publishing.
    pub fn with_feature(self, feature: Feature) -> Self {
        self.write().features.insert(feature.id.clone(), feature);
        self
    }

    /// Routes change records to `changes` instead of the thing's own bus.
    pub fn with_change_bus(mut self, changes: ChangeBus) -> Self {
        self.changes = changes;
        self
    }

    /// The thing id.
    pub fn id(&self) -> &NamespacedId {
        &self.id
    }

    /// The policy id.
    pub fn policy_id(&self) -> Option<NamespacedId> {
        self.read().policy_id.clone()
    }

    /// The definition id.
    pub fn definition_id(&self) -> Option<DefinitionId> {
        self.read().definition.clone()
    }

    /// All attributes.
    pub fn attributes(&self) -> Map<String, Value> {
        self.read().attributes.clone()
    }

    /// One attribute. Nested attributes are addressed with `/`.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        pointer::get(&self.read().attributes, name).cloned()
    }

    /// All features.
    pub fn features(&self) -> Vec<Feature> {
        self.read().features.values().cloned().collect()
    }

    /// One feature.
    pub fn feature(&self, id: &str) -> Option<Feature> {
        self.read().features.get(id).cloned()
    }

    /// A copy of the thing's data.
    pub fn snapshot(&self) -> ThingSnapshot {
        self.read().clone()
    }

    /// The JSON form of the thing.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&*self.read()).unwrap_or(Value::Null)
    }

    /// The bus this thing reports changes on.
    pub fn change_bus(&self) -> &ChangeBus {
        &self.changes
    }

    /// Attaches the publisher that makes this thing locally owned.
    pub fn set_publisher(&self, publisher: Arc<dyn Publisher>) {
        *self
            .publisher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(publisher);
    }

    /// Whether local changes are published.
    pub fn is_local(&self) -> bool {
        self.publisher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Sets the thing-level operations handler.
    pub fn set_operations_handler(&self, handler: OperationsHandler) {
        *self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// The thing-level operations handler.
    pub fn operations_handler(&self) -> Option<OperationsHandler> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets the operations handler of a feature.
    pub fn set_feature_operations_handler(&self, feature: &str, handler: OperationsHandler) {
        self.feature_operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(feature.to_string(), handler);
    }

    /// The operations handler of a feature.
    pub fn feature_operations_handler(&self, feature: &str) -> Option<OperationsHandler> {
        self.feature_operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(feature)
            .cloned()
    }

    /// Sets the definition id.
    pub async fn set_definition_id(&self, definition: DefinitionId) -> TwinResult<()> {
        let value = serde_json::to_value(&definition)?;
        self.commit(definition_path(), Some(value)).await
    }

    /// Replaces all attributes.
    pub async fn set_attributes(&self, attributes: Map<String, Value>) -> TwinResult<()> {
        self.commit(attributes_path(), Some(Value::Object(attributes)))
            .await
    }

    /// Sets one attribute.
    pub async fn set_attribute(&self, name: &str, value: Value) -> TwinResult<()> {
        self.commit(attribute_path(name), Some(value)).await
    }

    /// Removes one attribute.
    pub async fn remove_attribute(&self, name: &str) -> TwinResult<()> {
        self.commit(attribute_path(name), None).await
    }

    /// Adds or replaces a feature.
    pub async fn set_feature(&self, feature: Feature) -> TwinResult<()> {
        self.commit(feature_path(&feature.id), Some(feature.to_value()))
            .await
    }

    /// Removes a feature.
    pub async fn remove_feature(&self, id: &str) -> TwinResult<()> {
        self.commit(feature_path(id), None).await
    }

    /// Replaces the definition of a feature.
    pub async fn set_feature_definition(
        &self,
        id: &str,
        definition: Vec<DefinitionId>,
    ) -> TwinResult<()> {
        let value = serde_json::to_value(&definition)?;
        self.commit(feature_definition_path(id), Some(value)).await
    }

    /// Replaces all properties of a feature.
    pub async fn set_feature_properties(
        &self,
        id: &str,
        properties: Map<String, Value>,
    ) -> TwinResult<()> {
        self.commit(feature_properties_path(id), Some(Value::Object(properties)))
            .await
    }

    /// Sets one property of a feature.
    pub async fn set_feature_property(
        &self,
        id: &str,
        property: &str,
        value: Value,
    ) -> TwinResult<()> {
        self.commit(feature_property_path(id, property), Some(value))
            .await
    }

    /// Removes one property of a feature.
    pub async fn remove_feature_property(&self, id: &str, property: &str) -> TwinResult<()> {
        self.commit(feature_property_path(id, property), None).await
    }

    /// Applies a change reported by the twin. Nothing is published.
    ///
    /// A `Deleted` change ignores `value`.
    pub async fn apply_event(
        &self,
        kind: ChangeKind,
        path: &str,
        value: Option<Value>,
    ) -> TwinResult<()> {
        let target = PathKind::parse(path)
            .ok_or_else(|| ThingError::parameter_invalid(format!("invalid path {path}")))?;
        let value = match kind {
            ChangeKind::Deleted => None,
            _ => value,
        };

        let _gate = self.write_gate.lock().await;
        let mut next = self.snapshot();
        let old = write_path(&mut next, &target, value.clone())?;
        *self.write() = next;

        self.changes.publish(ChangeRecord {
            thing_id: self.id.clone(),
            kind,
            path: path.to_string(),
            old,
            new: value,
        });

        Ok(())
    }

    async fn commit(&self, path: String, value: Option<Value>) -> TwinResult<()> {
        let target = PathKind::parse(&path)
            .ok_or_else(|| ThingError::parameter_invalid(format!("invalid path {path}")))?;

        let _gate = self.write_gate.lock().await;
        let mut next = self.snapshot();
        let old = write_path(&mut next, &target, value.clone())?;

        let publisher = self
            .publisher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(publisher) = publisher {
            publisher
                .publish(self.command_envelope(&path, value.clone()))
                .await?;
        }

        *self.write() = next;

        let kind = match value {
            None => ChangeKind::Deleted,
            Some(_) => ChangeKind::of_write(&old),
        };
        if kind != ChangeKind::Deleted || old.is_some() {
            self.changes.publish(ChangeRecord {
                thing_id: self.id.clone(),
                kind,
                path,
                old,
                new: value,
            });
        }

        Ok(())
    }

    fn command_envelope(&self, path: &str, value: Option<Value>) -> Envelope {
        let action = match value {
            Some(_) => Action::Modify,
            None => Action::Delete,
        };
        let topic = Topic::new(&self.id, Channel::Twin, Criterion::Commands, Some(action));
        let headers = Headers::new()
            .with_correlation_id(uuid::Uuid::new_v4().to_string())
            .with_response_required(false);

        let envelope = Envelope::new(topic.to_string(), headers, path);
        match value {
            Some(value) => envelope.with_value(value),
            None => envelope,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ThingSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ThingSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thing")
            .field("id", &self.id)
            .field("state", &*self.read())
            .field("local", &self.is_local())
            .finish()
    }
}

impl Serialize for Thing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Thing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut snapshot = ThingSnapshot::deserialize(deserializer)?;
        let id = snapshot
            .thing_id
            .clone()
            .ok_or_else(|| serde::de::Error::missing_field("thingId"))?;
        snapshot.normalize();

        let thing = Thing::new(id);
        *thing.write() = snapshot;
        Ok(thing)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Writes `value` at `target`, or removes the target when `value` is `None`. Returns the old
/// value. The state is left untouched on error.
fn write_path(
    state: &mut ThingSnapshot,
    target: &PathKind,
    value: Option<Value>,
) -> TwinResult<Option<Value>> {
    let old = match target {
        PathKind::Thing => {
            let old = serde_json::to_value(&*state)?;
            let mut next: ThingSnapshot = match value {
                Some(value) => serde_json::from_value(value)?,
                None => ThingSnapshot::default(),
            };
            next.thing_id = state.thing_id.clone();
            next.normalize();
            *state = next;
            Some(old)
        }
        PathKind::Definition => {
            let definition = value
                .map(serde_json::from_value::<DefinitionId>)
                .transpose()?;
            let old = std::mem::replace(&mut state.definition, definition);
            old.map(|d| Value::String(d.to_string()))
        }
        PathKind::Attributes => {
            let attributes = match value {
                Some(value) => serde_json::from_value(value)?,
                None => Map::new(),
            };
            let old = std::mem::replace(&mut state.attributes, attributes);
            (!old.is_empty()).then_some(Value::Object(old))
        }
        PathKind::Attribute(name) => match value {
            Some(value) => pointer::set(&mut state.attributes, name, value),
            None => pointer::remove(&mut state.attributes, name),
        },
        PathKind::Features => {
            let mut features: BTreeMap<String, Feature> = match value {
                Some(value) => serde_json::from_value(value)?,
                None => BTreeMap::new(),
            };
            for (id, feature) in features.iter_mut() {
                feature.id = id.clone();
            }
            let old = std::mem::replace(&mut state.features, features);
            (!old.is_empty()).then(|| serde_json::to_value(&old)).transpose()?
        }
        PathKind::Feature(id) => {
            let feature = value.map(|v| Feature::from_value(id.clone(), v)).transpose()?;
            let old = match feature {
                Some(feature) => state.features.insert(id.clone(), feature),
                None => state.features.remove(id),
            };
            old.map(|f| f.to_value())
        }
        PathKind::FeatureDefinition(id) => {
            let definition: Vec<DefinitionId> = match value {
                Some(value) => serde_json::from_value(value)?,
                None => Vec::new(),
            };
            let feature = existing_feature(state, id)?;
            let old = std::mem::replace(&mut feature.definition, definition);
            (!old.is_empty()).then(|| serde_json::to_value(&old)).transpose()?
        }
        PathKind::FeatureProperties(id) => {
            let properties = match value {
                Some(value) => serde_json::from_value(value)?,
                None => Map::new(),
            };
            let feature = existing_feature(state, id)?;
            let old = std::mem::replace(&mut feature.properties, properties);
            (!old.is_empty()).then_some(Value::Object(old))
        }
        PathKind::FeatureProperty(id, property) => {
            let feature = existing_feature(state, id)?;
            match value {
                Some(value) => pointer::set(&mut feature.properties, property, value),
                None => pointer::remove(&mut feature.properties, property),
            }
        }
        PathKind::Message { .. } => {
            return Err(ThingError::parameter_invalid("messages do not change state").into())
        }
    };

    Ok(old)
}

fn existing_feature<'a>(state: &'a mut ThingSnapshot, id: &str) -> TwinResult<&'a mut Feature> {
    state
        .features
        .get_mut(id)
        .ok_or_else(|| ThingError::subject_not_found(format!("feature {id} not found")).into())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use crate::TwinError;

    use super::*;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: StdMutex<Vec<Envelope>>,
        fail: bool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, envelope: Envelope) -> TwinResult<()> {
            if self.fail {
                return Err(TwinError::MqttError("connection lost".to_string()));
            }
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        }
    }

    fn sample_thing() -> anyhow::Result<Thing> {
        Ok(Thing::new("ns:gw:d".parse()?)
            .with_policy_id("ns:p".parse()?)
            .with_definition_id("org.example:Gateway:1.0.0".parse()?)
            .with_attribute("location/site", json!("north"))
            .with_feature(
                Feature::new("Container:c1")
                    .with_definition("org.example:Container:1.0.0".parse()?)
                    .with_property("state", json!("running")),
            ))
    }

    #[test]
    fn test_thing_json_round_trip() -> anyhow::Result<()> {
        let thing = sample_thing()?;

        let json = serde_json::to_string(&thing)?;
        let parsed: Thing = serde_json::from_str(&json)?;

        assert_eq!(parsed.snapshot(), thing.snapshot());
        assert_eq!(parsed.id().to_string(), "ns:gw:d");
        assert_eq!(
            parsed.feature("Container:c1").map(|f| f.id),
            Some("Container:c1".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_local_change_publishes_then_applies() -> anyhow::Result<()> {
        let thing = sample_thing()?;
        let publisher = Arc::new(RecordingPublisher::default());
        thing.set_publisher(publisher.clone());
        let mut changes = thing.change_bus().subscribe();

        thing
            .set_feature_property("Container:c1", "state", json!("stopped"))
            .await?;

        let sent = publisher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "ns/gw:d/things/twin/commands/modify");
        assert_eq!(sent[0].path, "/features/Container:c1/properties/state");
        assert_eq!(sent[0].value, Some(json!("stopped")));
        assert!(!sent[0].headers.response_required());

        let record = changes.try_recv()?;
        assert_eq!(record.kind, ChangeKind::Modified);
        assert_eq!(record.old, Some(json!("running")));
        assert_eq!(
            thing
                .feature("Container:c1")
                .and_then(|f| f.property("state").cloned()),
            Some(json!("stopped"))
        );

        thing.remove_attribute("location/site").await?;
        let sent = publisher.sent.lock().unwrap().clone();
        assert_eq!(sent[1].topic, "ns/gw:d/things/twin/commands/delete");
        assert_eq!(sent[1].value, None);
        assert_eq!(thing.attribute("location/site"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_state_unchanged() -> anyhow::Result<()> {
        let thing = sample_thing()?;
        thing.set_publisher(Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        }));
        let before = thing.snapshot();

        assert!(thing.set_attribute("owner", json!("ops")).await.is_err());
        assert!(thing.remove_feature("Container:c1").await.is_err());
        assert_eq!(thing.snapshot(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_event_without_publishing() -> anyhow::Result<()> {
        let thing = sample_thing()?;
        let publisher = Arc::new(RecordingPublisher::default());
        thing.set_publisher(publisher.clone());
        let mut changes = thing.change_bus().subscribe();

        thing
            .apply_event(
                ChangeKind::Created,
                "/features/Metrics",
                Some(json!({ "properties": { "cpu": 3 } })),
            )
            .await?;
        thing
            .apply_event(ChangeKind::Deleted, "/features/Container:c1", None)
            .await?;

        assert!(publisher.sent.lock().unwrap().is_empty());
        assert_eq!(changes.try_recv()?.kind, ChangeKind::Created);
        let deleted = changes.try_recv()?;
        assert_eq!(deleted.kind, ChangeKind::Deleted);
        assert!(deleted.old.is_some());
        assert_eq!(
            thing.features().into_iter().map(|f| f.id).collect::<Vec<_>>(),
            vec!["Metrics".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_property_of_missing_feature_is_not_found() -> anyhow::Result<()> {
        let thing = sample_thing()?;
        let err = thing
            .set_feature_property("Missing", "x", json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TwinError::ThingError(e) if e.status == 404));
        Ok(())
    }
}
