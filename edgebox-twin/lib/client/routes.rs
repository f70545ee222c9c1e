use crate::model::ChangeKind;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Topic of the gateway handshake request.
pub const TOPIC_BOOTSTRAP_REQUEST: &str = "edge/thing/request";

/// Topic of the gateway handshake response.
pub const TOPIC_BOOTSTRAP_RESPONSE: &str = "edge/thing/response";

/// Subject of twin error responses.
pub const SUBJECT_ERRORS_RESPONSE: &str = "errors-response";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What an incoming message is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The gateway handshake response.
    Bootstrap,

    /// A twin change event.
    Event(ChangeKind),

    /// An error reported by the twin.
    ErrorsResponse,

    /// A command addressed to a thing of this device.
    Command,
}

/// An ordered table of topic filters. The first matching filter wins.
#[derive(Debug, Default, Clone)]
pub struct Routes {
    entries: Vec<(String, Route)>,
}

/// The parts of a `command//<hono-id>/req/<request-id>/<subject>` topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTopic {
    /// The device id the command is addressed to.
    pub hono_id: String,

    /// The request id; empty for one-way commands.
    pub request_id: String,

    /// The subject.
    pub subject: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Routes {
    /// Creates a table holding only the handshake route.
    pub fn new() -> Self {
        let mut routes = Self::default();
        routes.add(TOPIC_BOOTSTRAP_RESPONSE, Route::Bootstrap);
        routes
    }

    /// Appends a route.
    pub fn add(&mut self, filter: impl Into<String>, route: Route) {
        self.entries.push((filter.into(), route));
    }

    /// Drops the routes whose filter starts with `prefix`.
    pub fn remove_prefixed(&mut self, prefix: &str) {
        self.entries.retain(|(filter, _)| !filter.starts_with(prefix));
    }

    /// Installs the event and command routes of a root thing.
    pub fn add_thing(&mut self, thing_id: &str) {
        let base = request_topic_base(thing_id);
        for (subject, route) in [
            ("created", Route::Event(ChangeKind::Created)),
            ("modified", Route::Event(ChangeKind::Modified)),
            ("deleted", Route::Event(ChangeKind::Deleted)),
            (SUBJECT_ERRORS_RESPONSE, Route::ErrorsResponse),
        ] {
            self.add(format!("{base}//{subject}"), route);
        }
        self.add(command_subscription(thing_id), Route::Command);
    }

    /// Finds the route of a topic.
    pub fn resolve(&self, topic: &str) -> Option<&Route> {
        self.entries
            .iter()
            .find(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, route)| route)
    }

    /// The installed filters, in order.
    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(filter, _)| filter.as_str())
    }
}

impl CommandTopic {
    /// Splits a command topic. Returns `None` for other topics.
    pub fn parse(topic: &str) -> Option<Self> {
        let rest = topic.strip_prefix("command//")?;
        let (hono_id, rest) = rest.split_once("/req/")?;
        let (request_id, subject) = rest.split_once('/')?;
        if hono_id.is_empty() {
            return None;
        }

        Some(Self {
            hono_id: hono_id.to_string(),
            request_id: request_id.to_string(),
            subject: subject.to_string(),
        })
    }

    /// The topic a response with `status` goes to.
    pub fn response_topic(&self, status: u16) -> String {
        format!(
            "command//{}/res/{}/{}",
            self.hono_id, self.request_id, status
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// `command//<thing-id>/req/#`
pub fn command_subscription(thing_id: &str) -> String {
    format!("{}/#", request_topic_base(thing_id))
}

/// Matches an MQTT topic against a filter with `+` and `#` wildcards.
///
/// Empty levels are significant, so `a//b` does not match `a/+`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn request_topic_base(thing_id: &str) -> String {
    format!("command//{thing_id}/req")
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("command//ns:gw:d/req/#", "command//ns:gw:d/req/r1/do"));
        assert!(topic_matches("a/+/c", "a/b/c"));
        assert!(topic_matches("a/+/c", "a//c"));
        assert!(!topic_matches("a/+", "a/b/c"));
        assert!(!topic_matches("a/b", "a/b/c"));
        assert!(topic_matches("a/#", "a"));
    }

    #[test]
    fn test_event_routes_take_precedence_over_commands() {
        let mut routes = Routes::new();
        routes.add_thing("ns:gw:d");

        assert_eq!(
            routes.resolve("command//ns:gw:d/req//modified"),
            Some(&Route::Event(ChangeKind::Modified))
        );
        assert_eq!(
            routes.resolve("command//ns:gw:d/req//errors-response"),
            Some(&Route::ErrorsResponse)
        );
        assert_eq!(
            routes.resolve("command//ns:gw:d/req/r1/modified"),
            Some(&Route::Command)
        );
        assert_eq!(routes.resolve("edge/thing/response"), Some(&Route::Bootstrap));
        assert_eq!(routes.resolve("command//other/req/r1/do"), None);

        routes.remove_prefixed("command//ns:gw:d/");
        assert_eq!(routes.filters().count(), 1);
    }

    #[test]
    fn test_command_topic() {
        let topic = CommandTopic::parse("command//ns:name/req/r-1/do").unwrap();
        assert_eq!(topic.hono_id, "ns:name");
        assert_eq!(topic.request_id, "r-1");
        assert_eq!(topic.subject, "do");
        assert_eq!(topic.response_topic(404), "command//ns:name/res/r-1/404");

        let one_way = CommandTopic::parse("command//ns:name/req//do").unwrap();
        assert!(one_way.request_id.is_empty());
        assert!(CommandTopic::parse("edge/thing/response").is_none());
    }
}
