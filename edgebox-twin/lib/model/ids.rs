use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{TwinError, TwinResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A `namespace:name` id. The name may itself contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedId {
    /// The namespace.
    pub namespace: String,

    /// The name.
    pub name: String,
}

/// A `namespace:name:version` definition id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinitionId {
    /// The namespace.
    pub namespace: String,

    /// The name.
    pub name: String,

    /// The version.
    pub version: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NamespacedId {
    /// Creates an id.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl DefinitionId {
    /// Creates a definition id.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for NamespacedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for NamespacedId {
    type Err = TwinError;

    fn from_str(s: &str) -> TwinResult<Self> {
        match s.split_once(':') {
            Some((namespace, name)) if !name.is_empty() => Ok(Self::new(namespace, name)),
            _ => Err(TwinError::InvalidId(s.to_string())),
        }
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.name, self.version)
    }
}

impl FromStr for DefinitionId {
    type Err = TwinError;

    fn from_str(s: &str) -> TwinResult<Self> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(name), Some(version))
                if !name.is_empty() && !version.is_empty() =>
            {
                Ok(Self::new(namespace, name, version))
            }
            _ => Err(TwinError::InvalidId(s.to_string())),
        }
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(NamespacedId);
string_serde!(DefinitionId);

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
