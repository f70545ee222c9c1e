//! Paths addressing parts of a thing.

use std::sync::LazyLock;

use regex::Regex;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

static PATH_TABLE: LazyLock<Vec<(Regex, PathPattern)>> = LazyLock::new(|| {
    [
        (r"^/?$", PathPattern::Thing),
        (r"^/definition/?$", PathPattern::Definition),
        (r"^/attributes/?$", PathPattern::Attributes),
        (r"^/attributes/(.+?)/?$", PathPattern::Attribute),
        (r"^/features/?$", PathPattern::Features),
        (r"^/features/([^/]+)/?$", PathPattern::Feature),
        (r"^/features/([^/]+)/definition/?$", PathPattern::FeatureDefinition),
        (r"^/features/([^/]+)/properties/?$", PathPattern::FeatureProperties),
        (r"^/features/([^/]+)/properties/(.+?)/?$", PathPattern::FeatureProperty),
        (r"^/(inbox|outbox)/messages/(.+)$", PathPattern::Message),
        (r"^/features/([^/]+)/(inbox|outbox)/messages/(.+)$", PathPattern::FeatureMessage),
    ]
    .into_iter()
    .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|regex| (regex, kind)))
    .collect()
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The part of a thing a path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// The whole thing.
    Thing,

    /// The thing's definition.
    Definition,

    /// All attributes.
    Attributes,

    /// One attribute; nested attributes use `/`-separated ids.
    Attribute(String),

    /// All features.
    Features,

    /// One feature.
    Feature(String),

    /// A feature's definition.
    FeatureDefinition(String),

    /// All properties of a feature.
    FeatureProperties(String),

    /// One property of a feature; nested properties use `/`-separated ids.
    FeatureProperty(String, String),

    /// A message to or from the thing or one of its features.
    Message {
        /// The feature, for feature-level messages.
        feature: Option<String>,

        /// Whether the message is inbound.
        inbox: bool,

        /// The message subject, which names the operation.
        subject: String,
    },
}

#[derive(Debug, Clone, Copy)]
enum PathPattern {
    Thing,
    Definition,
    Attributes,
    Attribute,
    Features,
    Feature,
    FeatureDefinition,
    FeatureProperties,
    FeatureProperty,
    Message,
    FeatureMessage,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PathKind {
    /// Classifies a path. Unknown paths yield `None`.
    pub fn parse(path: &str) -> Option<Self> {
        PATH_TABLE.iter().find_map(|(regex, pattern)| {
            let captures = regex.captures(path)?;
            let group = |i: usize| captures.get(i).map(|m| m.as_str().to_string());

            Some(match pattern {
                PathPattern::Thing => PathKind::Thing,
                PathPattern::Definition => PathKind::Definition,
                PathPattern::Attributes => PathKind::Attributes,
                PathPattern::Attribute => PathKind::Attribute(group(1)?),
                PathPattern::Features => PathKind::Features,
                PathPattern::Feature => PathKind::Feature(group(1)?),
                PathPattern::FeatureDefinition => PathKind::FeatureDefinition(group(1)?),
                PathPattern::FeatureProperties => PathKind::FeatureProperties(group(1)?),
                PathPattern::FeatureProperty => PathKind::FeatureProperty(group(1)?, group(2)?),
                PathPattern::Message => PathKind::Message {
                    feature: None,
                    inbox: group(1)? == "inbox",
                    subject: group(2)?,
                },
                PathPattern::FeatureMessage => PathKind::Message {
                    feature: Some(group(1)?),
                    inbox: group(2)? == "inbox",
                    subject: group(3)?,
                },
            })
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// `/`
pub fn thing_path() -> String {
    "/".to_string()
}

/// `/definition`
pub fn definition_path() -> String {
    "/definition".to_string()
}

/// `/attributes`
pub fn attributes_path() -> String {
    "/attributes".to_string()
}

/// `/attributes/<id>`
pub fn attribute_path(id: &str) -> String {
    format!("/attributes/{}", id)
}

/// `/features`
pub fn features_path() -> String {
    "/features".to_string()
}

/// `/features/<id>`
pub fn feature_path(id: &str) -> String {
    format!("/features/{}", id)
}

/// `/features/<id>/definition`
pub fn feature_definition_path(id: &str) -> String {
    format!("/features/{}/definition", id)
}

/// `/features/<id>/properties`
pub fn feature_properties_path(id: &str) -> String {
    format!("/features/{}/properties", id)
}

/// `/features/<id>/properties/<property>`
pub fn feature_property_path(id: &str, property: &str) -> String {
    format!("/features/{}/properties/{}", id, property)
}

/// `/inbox/messages/<subject>`
pub fn inbox_message_path(subject: &str) -> String {
    format!("/inbox/messages/{}", subject)
}

/// `/features/<id>/inbox/messages/<subject>`
pub fn feature_inbox_message_path(id: &str, subject: &str) -> String {
    format!("/features/{}/inbox/messages/{}", id, subject)
}

/// Turns an inbox message path into the matching outbox path.
pub fn outbox_path_of(path: &str) -> String {
    path.replacen("/inbox/", "/outbox/", 1)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_paths() {
        assert_eq!(PathKind::parse("/"), Some(PathKind::Thing));
        assert_eq!(PathKind::parse(""), Some(PathKind::Thing));
        assert_eq!(PathKind::parse(&definition_path()), Some(PathKind::Definition));
        assert_eq!(PathKind::parse(&attributes_path()), Some(PathKind::Attributes));
        assert_eq!(
            PathKind::parse("/attributes/location/lat"),
            Some(PathKind::Attribute("location/lat".to_string()))
        );
        assert_eq!(PathKind::parse(&features_path()), Some(PathKind::Features));
        assert_eq!(
            PathKind::parse(&feature_path("f1")),
            Some(PathKind::Feature("f1".to_string()))
        );
        assert_eq!(
            PathKind::parse(&feature_definition_path("f1")),
            Some(PathKind::FeatureDefinition("f1".to_string()))
        );
        assert_eq!(
            PathKind::parse(&feature_properties_path("f1")),
            Some(PathKind::FeatureProperties("f1".to_string()))
        );
        assert_eq!(
            PathKind::parse(&feature_property_path("f1", "status/state")),
            Some(PathKind::FeatureProperty(
                "f1".to_string(),
                "status/state".to_string()
            ))
        );
        assert_eq!(PathKind::parse("/policy"), None);
    }

    #[test]
    fn test_parse_message_paths() {
        assert_eq!(
            PathKind::parse(&inbox_message_path("do")),
            Some(PathKind::Message {
                feature: None,
                inbox: true,
                subject: "do".to_string()
            })
        );
        assert_eq!(
            PathKind::parse(&outbox_path_of(&feature_inbox_message_path("f1", "stop"))),
            Some(PathKind::Message {
                feature: Some("f1".to_string()),
                inbox: false,
                subject: "stop".to_string()
            })
        );
    }
}
