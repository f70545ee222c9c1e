use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DefinitionId;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A feature of a thing.
///
/// The id is the key in the thing's feature map and is not part of the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// The feature id.
    #[serde(skip)]
    pub id: String,

    /// Definitions the feature implements, most specific first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definition: Vec<DefinitionId>,

    /// The properties.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Feature {
    /// Creates an empty feature.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Adds a definition.
    pub fn with_definition(mut self, definition: DefinitionId) -> Self {
        self.definition.push(definition);
        self
    }

    /// Sets a property.
    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Reads a property. Nested properties are addressed with `/`.
    pub fn property(&self, name: &str) -> Option<&Value> {
        super::pointer::get(&self.properties, name)
    }

    /// The JSON form of the feature.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parses a feature from its JSON form.
    pub fn from_value(id: impl Into<String>, value: Value) -> serde_json::Result<Self> {
        let mut feature: Feature = serde_json::from_value(value)?;
        feature.id = id.into();
        Ok(feature)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_feature_json_form() -> anyhow::Result<()> {
        let feature = Feature::new("Container:c1")
            .with_definition("org.example:Container:1.0.0".parse()?)
            .with_property("status", json!({ "state": "running" }));

        let value = feature.to_value();
        assert_eq!(
            value,
            json!({
                "definition": ["org.example:Container:1.0.0"],
                "properties": { "status": { "state": "running" } }
            })
        );

        let parsed = Feature::from_value("Container:c1", value)?;
        assert_eq!(parsed, feature);
        assert_eq!(parsed.property("status/state"), Some(&json!("running")));
        Ok(())
    }
}
