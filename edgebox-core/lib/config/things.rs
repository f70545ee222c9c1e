use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default broker URL.
pub const DEFAULT_BROKER_URL: &str = "tcp://localhost:1883";

/// Default MQTT client id.
pub const DEFAULT_CLIENT_ID: &str = "edgebox-things";

/// Default name of the root thing under the gateway device.
pub const DEFAULT_DEVICE_NAME: &str = "edge:containers";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Twin connection settings. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThingsConfig {
    /// Whether the twin connection is established.
    pub enable: bool,

    /// Broker URL; `wss`, `ssl`, `tls`, `mqtts`, `mqtt+ssl` and `tcps` select TLS.
    pub conn_broker_url: String,

    /// MQTT client id.
    pub conn_client_id: String,

    /// Name of the root thing.
    pub conn_device_name: String,

    /// Broker user name.
    pub conn_username: Option<String>,

    /// Broker password.
    pub conn_password: Option<String>,

    /// CA certificate (PEM) for TLS.
    pub conn_root_ca: Option<PathBuf>,

    /// Client certificate (PEM) for TLS.
    pub conn_client_cert: Option<PathBuf>,

    /// Client key (PEM) for TLS.
    pub conn_client_key: Option<PathBuf>,

    /// Keep-alive interval.
    pub conn_keep_alive: u64,

    /// Bound on the disconnect handshake.
    pub conn_disconnect_timeout: u64,

    /// Bound on connecting, and on the init hook after bootstrap.
    pub conn_connect_timeout: u64,

    /// Bound on publish acknowledgement.
    pub conn_acknowledge_timeout: u64,

    /// Bound on subscribe acknowledgement.
    pub conn_subscribe_timeout: u64,

    /// Bound on unsubscribe acknowledgement.
    pub conn_unsubscribe_timeout: u64,

    /// Deprecated alias of `connKeepAlive`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub things_conn_keep_alive: Option<u64>,

    /// Deprecated alias of `connDisconnectTimeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub things_conn_disconnect_timeout: Option<u64>,

    /// Deprecated alias of `connConnectTimeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub things_conn_connect_timeout: Option<u64>,

    /// Deprecated alias of `connAcknowledgeTimeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub things_conn_acknowledge_timeout: Option<u64>,

    /// Deprecated alias of `connSubscribeTimeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub things_conn_subscribe_timeout: Option<u64>,

    /// Deprecated alias of `connUnsubscribeTimeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub things_conn_unsubscribe_timeout: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ThingsConfig {
    /// Moves values of deprecated `thingsConn*` keys onto their `conn*` counterparts.
    pub fn forward_deprecated(&mut self) {
        let pairs = [
            ("thingsConnKeepAlive", self.things_conn_keep_alive.take(), &mut self.conn_keep_alive),
            (
                "thingsConnDisconnectTimeout",
                self.things_conn_disconnect_timeout.take(),
                &mut self.conn_disconnect_timeout,
            ),
            (
                "thingsConnConnectTimeout",
                self.things_conn_connect_timeout.take(),
                &mut self.conn_connect_timeout,
            ),
            (
                "thingsConnAcknowledgeTimeout",
                self.things_conn_acknowledge_timeout.take(),
                &mut self.conn_acknowledge_timeout,
            ),
            (
                "thingsConnSubscribeTimeout",
                self.things_conn_subscribe_timeout.take(),
                &mut self.conn_subscribe_timeout,
            ),
            (
                "thingsConnUnsubscribeTimeout",
                self.things_conn_unsubscribe_timeout.take(),
                &mut self.conn_unsubscribe_timeout,
            ),
        ];

        for (key, deprecated, current) in pairs {
            if let Some(value) = deprecated {
                tracing::warn!("config key things.{} is deprecated, use the conn* key instead", key);
                *current = value;
            }
        }
    }

    /// Keep-alive interval.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.conn_keep_alive)
    }

    /// Disconnect bound.
    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_disconnect_timeout)
    }

    /// Connect bound.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_connect_timeout)
    }

    /// Publish acknowledgement bound.
    pub fn acknowledge_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_acknowledge_timeout)
    }

    /// Subscribe acknowledgement bound.
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_subscribe_timeout)
    }

    /// Unsubscribe acknowledgement bound.
    pub fn unsubscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_unsubscribe_timeout)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ThingsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            conn_broker_url: DEFAULT_BROKER_URL.to_string(),
            conn_client_id: DEFAULT_CLIENT_ID.to_string(),
            conn_device_name: DEFAULT_DEVICE_NAME.to_string(),
            conn_username: None,
            conn_password: None,
            conn_root_ca: None,
            conn_client_cert: None,
            conn_client_key: None,
            conn_keep_alive: 20_000,
            conn_disconnect_timeout: 250,
            conn_connect_timeout: 30_000,
            conn_acknowledge_timeout: 15_000,
            conn_subscribe_timeout: 15_000,
            conn_unsubscribe_timeout: 5_000,
            things_conn_keep_alive: None,
            things_conn_disconnect_timeout: None,
            things_conn_connect_timeout: None,
            things_conn_acknowledge_timeout: None,
            things_conn_subscribe_timeout: None,
            things_conn_unsubscribe_timeout: None,
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
    fn test_deprecated_keys_forward_to_current() -> anyhow::Result<()> {
        let mut config: ThingsConfig = serde_json::from_str(
            r#"{ "enable": true, "connKeepAlive": 1000, "thingsConnSubscribeTimeout": 42 }"#,
        )?;
        config.forward_deprecated();

        assert!(config.enable);
        assert_eq!(config.keep_alive(), Duration::from_millis(1000));
        assert_eq!(config.subscribe_timeout(), Duration::from_millis(42));
        assert_eq!(config.things_conn_subscribe_timeout, None);
        assert_eq!(config.conn_broker_url, DEFAULT_BROKER_URL);
        Ok(())
    }
}
