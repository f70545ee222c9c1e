use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::{TwinError, TwinResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Broker URL schemes that require TLS.
pub const SECURE_SCHEMES: [&str; 6] = ["wss", "ssl", "tls", "mqtts", "mqtt+ssl", "tcps"];

/// The default broker URL.
pub const DEFAULT_BROKER_URL: &str = "tcp://localhost:1883";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Settings of the twin client's MQTT session.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ClientConfiguration {
    /// Broker URL, e.g. `tcp://localhost:1883`.
    #[builder(default = DEFAULT_BROKER_URL.to_string(), setter(into))]
    pub broker_url: String,

    /// MQTT client id.
    #[builder(default = "edgebox-things".to_string(), setter(into))]
    pub client_id: String,

    /// Name appended to the gateway id to form the root thing id.
    #[builder(default = "edge:containers".to_string(), setter(into))]
    pub device_name: String,

    /// User name.
    #[builder(default, setter(into, strip_option))]
    pub username: Option<String>,

    /// Password.
    #[builder(default, setter(into, strip_option))]
    pub password: Option<String>,

    /// CA certificate file, required for secure schemes.
    #[builder(default, setter(into, strip_option))]
    pub root_ca: Option<PathBuf>,

    /// Client certificate file.
    #[builder(default, setter(into, strip_option))]
    pub client_cert: Option<PathBuf>,

    /// Client key file.
    #[builder(default, setter(into, strip_option))]
    pub client_key: Option<PathBuf>,

    /// Keep-alive interval.
    #[builder(default = Duration::from_secs(20))]
    pub keep_alive: Duration,

    /// Wait for a clean disconnect.
    #[builder(default = Duration::from_millis(250))]
    pub disconnect_timeout: Duration,

    /// Wait for the init hook after a handshake.
    #[builder(default = Duration::from_secs(30))]
    pub connect_timeout: Duration,

    /// Wait for a publish to be accepted.
    #[builder(default = Duration::from_secs(15))]
    pub acknowledge_timeout: Duration,

    /// Wait for a subscribe to be accepted.
    #[builder(default = Duration::from_secs(15))]
    pub subscribe_timeout: Duration,

    /// Wait for an unsubscribe to be accepted.
    #[builder(default = Duration::from_secs(5))]
    pub unsubscribe_timeout: Duration,
}

/// The parts of a broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// The scheme, lower-cased.
    pub scheme: String,

    /// Host name or address.
    pub host: String,

    /// Port, defaulted by scheme.
    pub port: u16,

    /// Path, for websocket brokers.
    pub path: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ClientConfiguration {
    /// Parses the broker URL.
    pub fn broker_address(&self) -> TwinResult<BrokerAddress> {
        BrokerAddress::parse(&self.broker_url)
    }

    /// Whether the broker URL requires TLS.
    pub fn is_secure(&self) -> TwinResult<bool> {
        Ok(self.broker_address()?.is_secure())
    }

    /// Checks the broker URL and, for secure schemes, the TLS files.
    pub fn validate(&self) -> TwinResult<()> {
        if self.device_name.is_empty() {
            return Err(TwinError::InvalidConfig("device name is empty".to_string()));
        }

        if !self.is_secure()? {
            return Ok(());
        }

        match &self.root_ca {
            Some(path) => require_file("root CA", path)?,
            None => return Err(TwinError::MissingTlsFile("root CA", String::new())),
        }

        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                require_file("client certificate", cert)?;
                require_file("client key", key)?;
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(TwinError::MissingTlsFile("client key", String::new()));
            }
            (None, Some(_)) => {
                return Err(TwinError::MissingTlsFile("client certificate", String::new()));
            }
        }

        Ok(())
    }
}

impl BrokerAddress {
    /// Parses `scheme://host[:port][/path]`. A URL without scheme is treated as `tcp`.
    pub fn parse(url: &str) -> TwinResult<Self> {
        let (scheme, rest) = url.split_once("://").unwrap_or(("tcp", url));
        let scheme = scheme.to_ascii_lowercase();

        let (authority, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, ""),
        };
        let authority = authority.rsplit('@').next().unwrap_or(authority);

        let invalid = || TwinError::InvalidConfig(format!("invalid broker url {url}"));
        let (host, port) = match authority.strip_prefix('[') {
            Some(bracketed) => {
                let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
                (host, tail.strip_prefix(':'))
            }
            None => match authority.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            },
        };
        let port = port
            .map(str::parse::<u16>)
            .transpose()
            .map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }

        let port = match port {
            Some(port) => port,
            None => default_port(&scheme)
                .ok_or_else(|| TwinError::InvalidConfig(format!("unsupported scheme {scheme}")))?,
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Whether the scheme requires TLS.
    pub fn is_secure(&self) -> bool {
        SECURE_SCHEMES.contains(&self.scheme.as_str())
    }

    /// Whether the broker is reached over websockets.
    pub fn is_websocket(&self) -> bool {
        matches!(self.scheme.as_str(), "ws" | "wss")
    }

    /// The websocket URL of the broker.
    pub fn websocket_url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ClientConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "tcp" | "mqtt" => Some(1883),
        "ssl" | "tls" | "mqtts" | "mqtt+ssl" | "tcps" => Some(8883),
        "ws" => Some(80),
        "wss" => Some(443),
        _ => None,
    }
}

fn require_file(kind: &'static str, path: &Path) -> TwinResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(TwinError::MissingTlsFile(kind, path.display().to_string()))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_address_parsing() -> anyhow::Result<()> {
        let address = BrokerAddress::parse("tcp://localhost:1883")?;
        assert_eq!((address.host.as_str(), address.port), ("localhost", 1883));
        assert!(!address.is_secure());

        let address = BrokerAddress::parse("MQTTS://hub.example.com")?;
        assert_eq!(address.port, 8883);
        assert!(address.is_secure());

        let address = BrokerAddress::parse("wss://hub.example.com/mqtt")?;
        assert!(address.is_websocket());
        assert_eq!(address.websocket_url(), "wss://hub.example.com:443/mqtt");

        assert!(BrokerAddress::parse("gopher://host").is_err());
        assert!(BrokerAddress::parse("tcp://host:port").is_err());
        Ok(())
    }

    #[test]
    fn test_secure_scheme_requires_tls_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ca = dir.path().join("ca.crt");
        std::fs::write(&ca, "ca")?;

        let plain = ClientConfiguration::default();
        assert!(plain.validate().is_ok());

        let missing = ClientConfiguration::builder()
            .broker_url("ssl://hub:8883")
            .build();
        assert!(matches!(
            missing.validate(),
            Err(TwinError::MissingTlsFile("root CA", _))
        ));

        let absent = ClientConfiguration::builder()
            .broker_url("ssl://hub:8883")
            .root_ca(dir.path().join("absent.crt"))
            .build();
        assert!(absent.validate().is_err());

        let half = ClientConfiguration::builder()
            .broker_url("tcps://hub")
            .root_ca(ca.clone())
            .client_cert(ca.clone())
            .build();
        assert!(matches!(
            half.validate(),
            Err(TwinError::MissingTlsFile("client key", _))
        ));

        let ok = ClientConfiguration::builder()
            .broker_url("mqtt+ssl://hub")
            .root_ca(ca)
            .build();
        assert!(ok.validate().is_ok());
        Ok(())
    }
}
