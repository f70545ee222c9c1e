use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, MqttOptions, Outgoing, Packet, SubscribeReasonCode, TlsConfiguration,
    Transport,
};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{TwinError, TwinResult};

use super::ClientConfiguration;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Pause between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

const REQUEST_CAPACITY: usize = 64;

const EVENT_CAPACITY: usize = 256;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,

    /// Acknowledged delivery.
    AtLeastOnce,
}

/// Something that happened on the MQTT session.
#[derive(Debug, Clone, PartialEq)]
pub enum MqttEvent {
    /// The session was (re)established.
    Connected,

    /// A message arrived.
    Message {
        /// The topic.
        topic: String,

        /// The payload.
        payload: Vec<u8>,
    },

    /// The session was lost.
    Disconnected,
}

/// An MQTT session as seen by the twin client.
#[async_trait]
pub trait MqttConnection: Send + Sync {
    /// Subscribes to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> TwinResult<()>;

    /// Unsubscribes from a topic filter.
    async fn unsubscribe(&self, filter: &str) -> TwinResult<()>;

    /// Publishes a message.
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> TwinResult<()>;

    /// Closes the session.
    async fn disconnect(&self) -> TwinResult<()>;
}

/// [`MqttConnection`] backed by `rumqttc`.
///
/// A background task drives the event loop, reconnecting after errors, and forwards
/// [`MqttEvent`]s. Subscribes, unsubscribes and QoS 1 publishes wait for the broker's
/// acknowledgement, each bounded by its configured timeout.
pub struct RumqttConnection {
    client: AsyncClient,
    acks: Arc<PendingAcks>,
    order: Mutex<()>,
    acknowledge_timeout: Duration,
    subscribe_timeout: Duration,
    unsubscribe_timeout: Duration,
    disconnect_timeout: Duration,
    cancel: CancellationToken,
}

/// The packet kinds the broker acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AckKind {
    Publish,
    Subscribe,
    Unsubscribe,
}

type AckSender = oneshot::Sender<TwinResult<()>>;

/// Matches outgoing requests to the broker's acknowledgements.
///
/// Requests of one kind leave the event loop in the order they were queued, so a waiter is queued
/// before its request and bound to a packet id when the packet goes out.
#[derive(Default)]
struct PendingAcks {
    state: StdMutex<AckState>,
}

#[derive(Default)]
struct AckState {
    next_token: u64,
    queued: HashMap<AckKind, VecDeque<(u64, AckSender)>>,
    inflight: HashMap<(AckKind, u16), AckSender>,
}

/// A queued waiter, removed again if its request is abandoned before it is sent.
struct AckWaiter<'a> {
    acks: &'a PendingAcks,
    kind: AckKind,
    token: u64,
    sent: bool,
    ack: Option<oneshot::Receiver<TwinResult<()>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RumqttConnection {
    /// Starts a session. Returns the connection and the stream of its events.
    pub fn connect(
        config: &ClientConfiguration,
    ) -> TwinResult<(Arc<Self>, mpsc::Receiver<MqttEvent>)> {
        config.validate()?;
        let options = mqtt_options(config)?;
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();
        let acks = Arc::new(PendingAcks::default());

        let task_cancel = cancel.clone();
        let task_acks = acks.clone();
        tokio::spawn(async move {
            let mut connected = false;
            loop {
                let polled = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    polled = event_loop.poll() => polled,
                };

                if let Ok(event) = &polled {
                    task_acks.track(event);
                }

                let event = match polled {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("mqtt session established");
                        connected = true;
                        MqttEvent::Connected
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => MqttEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    },
                    Ok(_) => continue,
                    Err(e) => {
                        if connected {
                            tracing::warn!("mqtt session lost: {e}");
                            connected = false;
                            if tx.send(MqttEvent::Disconnected).await.is_err() {
                                break;
                            }
                        } else {
                            tracing::debug!("mqtt connect attempt failed: {e}");
                        }

                        tokio::select! {
                            _ = task_cancel.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                        }
                    }
                };

                if tx.send(event).await.is_err() {
                    break;
                }
            }
            tracing::debug!("mqtt event loop stopped");
        });

        Ok((
            Arc::new(Self {
                client,
                acks,
                order: Mutex::new(()),
                acknowledge_timeout: config.acknowledge_timeout,
                subscribe_timeout: config.subscribe_timeout,
                unsubscribe_timeout: config.unsubscribe_timeout,
                disconnect_timeout: config.disconnect_timeout,
                cancel,
            }),
            rx,
        ))
    }

    /// Sends a request and waits for its acknowledgement, both within `timeout`.
    async fn acknowledged<F>(&self, kind: AckKind, timeout: Duration, request: F) -> TwinResult<()>
    where
        F: Future<Output = Result<(), rumqttc::ClientError>> + Send,
    {
        let exchange = async {
            let mut waiter = {
                let _order = self.order.lock().await;
                let mut waiter = self.acks.queue(kind);
                request
                    .await
                    .map_err(|e| TwinError::MqttError(e.to_string()))?;
                waiter.sent = true;
                waiter
            };
            waiter.wait().await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TwinError::Timeout(kind.operation(), timeout)),
        }
    }
}

impl AckKind {
    fn operation(&self) -> &'static str {
        match self {
            AckKind::Publish => "publish",
            AckKind::Subscribe => "subscribe",
            AckKind::Unsubscribe => "unsubscribe",
        }
    }
}

impl PendingAcks {
    fn queue(&self, kind: AckKind) -> AckWaiter<'_> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        state.next_token += 1;
        let token = state.next_token;
        state.queued.entry(kind).or_default().push_back((token, tx));

        AckWaiter {
            acks: self,
            kind,
            token,
            sent: false,
            ack: Some(rx),
        }
    }

    fn abandon(&self, kind: AckKind, token: u64) {
        if let Some(queue) = self.lock().queued.get_mut(&kind) {
            queue.retain(|(queued, _)| *queued != token);
        }
    }

    /// Binds the oldest waiter of `kind` to `pkid`. A packet id that is already in flight is a
    /// retransmission after a reconnect.
    fn sent(&self, kind: AckKind, pkid: u16) {
        let mut state = self.lock();
        if let Some(waiter) = state.inflight.get(&(kind, pkid)) {
            if !waiter.is_closed() {
                return;
            }
        }

        if let Some((_, waiter)) = state.queued.get_mut(&kind).and_then(VecDeque::pop_front) {
            state.inflight.insert((kind, pkid), waiter);
        }
    }

    fn acked(&self, kind: AckKind, pkid: u16, result: TwinResult<()>) {
        let waiter = self.lock().inflight.remove(&(kind, pkid));
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(result);
            }
            None => tracing::debug!("unexpected {} ack for packet {}", kind.operation(), pkid),
        }
    }

    fn track(&self, event: &Event) {
        match event {
            Event::Outgoing(Outgoing::Publish(pkid)) if *pkid != 0 => {
                self.sent(AckKind::Publish, *pkid)
            }
            Event::Outgoing(Outgoing::Subscribe(pkid)) => self.sent(AckKind::Subscribe, *pkid),
            Event::Outgoing(Outgoing::Unsubscribe(pkid)) => {
                self.sent(AckKind::Unsubscribe, *pkid)
            }
            Event::Incoming(Packet::PubAck(ack)) => self.acked(AckKind::Publish, ack.pkid, Ok(())),
            Event::Incoming(Packet::SubAck(ack)) => {
                let result = if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Err(TwinError::MqttError(format!(
                        "broker refused subscription {}",
                        ack.pkid
                    )))
                } else {
                    Ok(())
                };
                self.acked(AckKind::Subscribe, ack.pkid, result)
            }
            Event::Incoming(Packet::UnsubAck(ack)) => {
                self.acked(AckKind::Unsubscribe, ack.pkid, Ok(()))
            }
            _ => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AckState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AckWaiter<'_> {
    async fn wait(&mut self) -> TwinResult<()> {
        let Some(ack) = self.ack.take() else {
            return Err(TwinError::MqttError("acknowledgement already awaited".to_string()));
        };
        ack.await.map_err(|_| {
            TwinError::MqttError(format!("{} was not acknowledged", self.kind.operation()))
        })?
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl MqttConnection for RumqttConnection {
    async fn subscribe(&self, filter: &str, qos: QoS) -> TwinResult<()> {
        self.acknowledged(
            AckKind::Subscribe,
            self.subscribe_timeout,
            self.client.subscribe(filter, qos.into()),
        )
        .await
    }

    async fn unsubscribe(&self, filter: &str) -> TwinResult<()> {
        self.acknowledged(
            AckKind::Unsubscribe,
            self.unsubscribe_timeout,
            self.client.unsubscribe(filter),
        )
        .await
    }

    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> TwinResult<()> {
        let request = self.client.publish(topic, qos.into(), false, payload);
        match qos {
            QoS::AtMostOnce => bounded("publish", self.acknowledge_timeout, request).await,
            QoS::AtLeastOnce => {
                self.acknowledged(AckKind::Publish, self.acknowledge_timeout, request)
                    .await
            }
        }
    }

    async fn disconnect(&self) -> TwinResult<()> {
        let result = bounded(
            "disconnect",
            self.disconnect_timeout,
            self.client.disconnect(),
        )
        .await;
        self.cancel.cancel();
        result
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        }
    }
}

impl Drop for RumqttConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for AckWaiter<'_> {
    fn drop(&mut self) {
        if !self.sent {
            self.acks.abandon(self.kind, self.token);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn bounded<F>(operation: &'static str, timeout: Duration, request: F) -> TwinResult<()>
where
    F: std::future::Future<Output = Result<(), rumqttc::ClientError>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result.map_err(|e| TwinError::MqttError(e.to_string())),
        Err(_) => Err(TwinError::Timeout(operation, timeout)),
    }
}

fn mqtt_options(config: &ClientConfiguration) -> TwinResult<MqttOptions> {
    let address = config.broker_address()?;

    let mut options = if address.is_websocket() {
        MqttOptions::new(&config.client_id, address.websocket_url(), address.port)
    } else {
        MqttOptions::new(&config.client_id, &address.host, address.port)
    };
    options
        .set_keep_alive(config.keep_alive.max(Duration::from_secs(1)))
        .set_clean_session(true);

    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }

    let transport = match (address.is_secure(), address.is_websocket()) {
        (false, false) => Transport::Tcp,
        (false, true) => Transport::Ws,
        (true, websocket) => {
            let tls = tls_configuration(config)?;
            if websocket {
                Transport::Wss(tls)
            } else {
                Transport::Tls(tls)
            }
        }
    };
    options.set_transport(transport);

    Ok(options)
}

fn tls_configuration(config: &ClientConfiguration) -> TwinResult<TlsConfiguration> {
    let ca = match &config.root_ca {
        Some(path) => std::fs::read(path)?,
        None => return Err(TwinError::MissingTlsFile("root CA", String::new())),
    };

    let client_auth = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => Some((std::fs::read(cert)?, std::fs::read(key)?)),
        _ => None,
    };

    Ok(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rumqttc::{PubAck, SubAck, UnsubAck};

    use super::*;

    fn sent(waiter: &mut AckWaiter<'_>) {
        waiter.sent = true;
    }

    #[tokio::test]
    async fn test_acks_complete_matching_waiters() -> anyhow::Result<()> {
        let acks = PendingAcks::default();
        let mut first = acks.queue(AckKind::Publish);
        let mut second = acks.queue(AckKind::Publish);
        sent(&mut first);
        sent(&mut second);

        acks.track(&Event::Outgoing(Outgoing::Publish(7)));
        acks.track(&Event::Outgoing(Outgoing::Publish(8)));
        acks.track(&Event::Incoming(Packet::PubAck(PubAck::new(8))));
        second.wait().await?;

        acks.track(&Event::Incoming(Packet::PubAck(PubAck::new(7))));
        first.wait().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_suback_failure_is_an_error() -> anyhow::Result<()> {
        let acks = PendingAcks::default();
        let mut waiter = acks.queue(AckKind::Subscribe);
        sent(&mut waiter);

        acks.track(&Event::Outgoing(Outgoing::Subscribe(3)));
        acks.track(&Event::Incoming(Packet::SubAck(SubAck::new(
            3,
            vec![SubscribeReasonCode::Failure],
        ))));

        assert!(matches!(waiter.wait().await, Err(TwinError::MqttError(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_kinds_are_matched_separately() -> anyhow::Result<()> {
        let acks = PendingAcks::default();
        let mut subscribe = acks.queue(AckKind::Subscribe);
        let mut unsubscribe = acks.queue(AckKind::Unsubscribe);
        sent(&mut subscribe);
        sent(&mut unsubscribe);

        acks.track(&Event::Outgoing(Outgoing::Unsubscribe(1)));
        acks.track(&Event::Outgoing(Outgoing::Subscribe(1)));
        acks.track(&Event::Incoming(Packet::UnsubAck(UnsubAck::new(1))));
        unsubscribe.wait().await?;

        acks.track(&Event::Incoming(Packet::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Success(rumqttc::QoS::AtLeastOnce)],
        ))));
        subscribe.wait().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_ack_times_out() {
        let acks = PendingAcks::default();
        let mut waiter = acks.queue(AckKind::Unsubscribe);
        sent(&mut waiter);
        acks.track(&Event::Outgoing(Outgoing::Unsubscribe(4)));

        let waited = tokio::time::timeout(Duration::from_millis(20), waiter.wait()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_is_not_bound() -> anyhow::Result<()> {
        let acks = PendingAcks::default();
        drop(acks.queue(AckKind::Publish));
        let mut waiter = acks.queue(AckKind::Publish);
        sent(&mut waiter);

        acks.track(&Event::Outgoing(Outgoing::Publish(0)));
        acks.track(&Event::Outgoing(Outgoing::Publish(2)));
        acks.track(&Event::Incoming(Packet::PubAck(PubAck::new(2))));
        waiter.wait().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_retransmission_keeps_binding() -> anyhow::Result<()> {
        let acks = PendingAcks::default();
        let mut first = acks.queue(AckKind::Publish);
        let mut second = acks.queue(AckKind::Publish);
        sent(&mut first);
        sent(&mut second);

        acks.track(&Event::Outgoing(Outgoing::Publish(5)));
        acks.track(&Event::Outgoing(Outgoing::Publish(5)));
        acks.track(&Event::Outgoing(Outgoing::Publish(6)));
        acks.track(&Event::Incoming(Packet::PubAck(PubAck::new(6))));
        second.wait().await?;
        acks.track(&Event::Incoming(Packet::PubAck(PubAck::new(5))));
        first.wait().await?;
        Ok(())
    }
}
