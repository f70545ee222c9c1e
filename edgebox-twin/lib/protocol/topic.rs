use std::{fmt, str::FromStr};

use crate::{model::NamespacedId, TwinError, TwinResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The group segment of every thing topic.
pub const GROUP_THINGS: &str = "things";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A thing topic: `<namespace>/<name>/things/<channel>/<criterion>[/<action>]`.
///
/// The action is absent only for the `errors` criterion. For `messages` it is the message
/// subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// The thing's namespace.
    pub namespace: String,

    /// The thing's name.
    pub name: String,

    /// The channel.
    pub channel: Channel,

    /// The criterion.
    pub criterion: Criterion,

    /// The action.
    pub action: Option<Action>,
}

/// Whether an operation targets the persisted twin or the live device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The persisted twin.
    Twin,

    /// The live device.
    Live,
}

/// The kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// A request to change or read state.
    Commands,

    /// A notification that state changed.
    Events,

    /// A free-form message.
    Messages,

    /// An error.
    Errors,

    /// A search.
    Search,
}

/// The action of a command or event, or the subject of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create command.
    Create,

    /// Created event.
    Created,

    /// Modify command.
    Modify,

    /// Modified event.
    Modified,

    /// Delete command.
    Delete,

    /// Deleted event.
    Deleted,

    /// Retrieve command.
    Retrieve,

    /// A message subject.
    Subject(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Topic {
    /// Creates a topic for the given thing.
    pub fn new(
        thing: &NamespacedId,
        channel: Channel,
        criterion: Criterion,
        action: Option<Action>,
    ) -> Self {
        Self {
            namespace: thing.namespace.clone(),
            name: thing.name.clone(),
            channel,
            criterion,
            action,
        }
    }

    /// The id of the thing the topic refers to.
    pub fn thing_id(&self) -> NamespacedId {
        NamespacedId::new(self.namespace.clone(), self.name.clone())
    }
}

impl Channel {
    /// The channel's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Twin => "twin",
            Channel::Live => "live",
        }
    }
}

impl Criterion {
    /// The criterion's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Commands => "commands",
            Criterion::Events => "events",
            Criterion::Messages => "messages",
            Criterion::Errors => "errors",
            Criterion::Search => "search",
        }
    }
}

impl Action {
    /// The action's wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Action::Create => "create",
            Action::Created => "created",
            Action::Modify => "modify",
            Action::Modified => "modified",
            Action::Delete => "delete",
            Action::Deleted => "deleted",
            Action::Retrieve => "retrieve",
            Action::Subject(subject) => subject,
        }
    }

    fn parse(criterion: Criterion, s: &str) -> TwinResult<Self> {
        if criterion == Criterion::Messages {
            return Ok(Action::Subject(s.to_string()));
        }

        match s {
            "create" => Ok(Action::Create),
            "created" => Ok(Action::Created),
            "modify" => Ok(Action::Modify),
            "modified" => Ok(Action::Modified),
            "delete" => Ok(Action::Delete),
            "deleted" => Ok(Action::Deleted),
            "retrieve" => Ok(Action::Retrieve),
            other => Err(TwinError::InvalidTopic(format!("unknown action {}", other))),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.namespace,
            self.name,
            GROUP_THINGS,
            self.channel.as_str(),
            self.criterion.as_str()
        )?;
        if let Some(action) = &self.action {
            write!(f, "/{}", action.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for Topic {
    type Err = TwinError;

    fn from_str(s: &str) -> TwinResult<Self> {
        let segments: Vec<&str> = s.split('/').collect();
        let invalid = |reason: &str| TwinError::InvalidTopic(format!("{}: {}", s, reason));

        if segments.len() != 5 && segments.len() != 6 {
            return Err(invalid("expected 5 or 6 segments"));
        }
        if segments[0].is_empty() || segments[1].is_empty() {
            return Err(invalid("namespace and name must not be empty"));
        }
        if segments[2] != GROUP_THINGS {
            return Err(invalid("unsupported group"));
        }

        let channel = segments[3].parse()?;
        let criterion = segments[4].parse()?;
        let action = match segments.get(5) {
            Some(action) if !action.is_empty() => Some(Action::parse(criterion, action)?),
            _ if criterion == Criterion::Errors => None,
            _ => return Err(invalid("missing action")),
        };

        Ok(Self {
            namespace: segments[0].to_string(),
            name: segments[1].to_string(),
            channel,
            criterion,
            action,
        })
    }
}

impl FromStr for Channel {
    type Err = TwinError;

    fn from_str(s: &str) -> TwinResult<Self> {
        match s {
            "twin" => Ok(Channel::Twin),
            "live" => Ok(Channel::Live),
            other => Err(TwinError::InvalidTopic(format!("unknown channel {}", other))),
        }
    }
}

impl FromStr for Criterion {
    type Err = TwinError;

    fn from_str(s: &str) -> TwinResult<Self> {
        match s {
            "commands" => Ok(Criterion::Commands),
            "events" => Ok(Criterion::Events),
            "messages" => Ok(Criterion::Messages),
            "errors" => Ok(Criterion::Errors),
            "search" => Ok(Criterion::Search),
            other => Err(TwinError::InvalidTopic(format!("unknown criterion {}", other))),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_round_trip() -> anyhow::Result<()> {
        let topic: Topic = "ns/name/things/twin/commands/modify".parse()?;
        assert_eq!(topic.channel, Channel::Twin);
        assert_eq!(topic.criterion, Criterion::Commands);
        assert_eq!(topic.action, Some(Action::Modify));
        assert_eq!(topic.thing_id().to_string(), "ns:name");
        assert_eq!(topic.to_string(), "ns/name/things/twin/commands/modify");
        Ok(())
    }

    #[test]
    fn test_message_subject_and_errors_topic() -> anyhow::Result<()> {
        let topic: Topic = "ns/name/things/live/messages/do".parse()?;
        assert_eq!(topic.action, Some(Action::Subject("do".to_string())));

        let topic: Topic = "ns/name/things/twin/errors".parse()?;
        assert_eq!(topic.action, None);
        assert_eq!(topic.to_string(), "ns/name/things/twin/errors");
        Ok(())
    }

    #[test]
    fn test_invalid_topics() {
        for topic in [
            "ns/name/things/twin",
            "ns/name/policies/twin/commands/modify",
            "ns/name/things/other/commands/modify",
            "ns/name/things/twin/commands",
            "ns/name/things/twin/commands/explode",
            "/name/things/twin/commands/modify",
        ] {
            assert!(topic.parse::<Topic>().is_err(), "{} should be rejected", topic);
        }
    }
}
