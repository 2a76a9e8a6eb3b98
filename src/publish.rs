use crate::config::{BrokerConfig, ProbeConfig};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use std::fs;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to read CA certificates {path}: {source}")]
    Tls {
        path: String,
        source: std::io::Error,
    },
    #[error("unsupported QoS level {0}")]
    Qos(u8),
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("publishing did not complete within {}", humantime::format_duration(*.0))]
    Timeout(Duration),
}

pub fn report_messages(cfg: &ProbeConfig, payload: String) -> Vec<Message> {
    vec![Message {
        topic: cfg.topic.clone(),
        payload: payload.into_bytes(),
        qos: cfg.qos,
        retain: cfg.retain,
    }]
}

pub fn qos_level(qos: u8) -> Result<QoS, PublishError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(PublishError::Qos(other)),
    }
}

pub fn mqtt_options(cfg: &BrokerConfig) -> Result<MqttOptions, PublishError> {
    let mut opts = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keepalive_secs));

    match cfg.credentials() {
        Some(creds) => {
            opts.set_credentials(creds.username, creds.password);
        }
        None => info!(
            "password authentication disabled, auth_username and auth_password must both be set"
        ),
    }

    if let Some(path) = &cfg.ca_certs {
        let ca = fs::read(path).map_err(|source| PublishError::Tls {
            path: path.display().to_string(),
            source,
        })?;
        opts.set_transport(Transport::tls(ca, None, None));
    }

    Ok(opts)
}

/// Connects, sends every message and disconnects once QoS 0 messages are
/// written and QoS 1/2 messages are acknowledged.
pub async fn publish_multiple(
    cfg: &BrokerConfig,
    messages: Vec<Message>,
) -> Result<(), PublishError> {
    if messages.is_empty() {
        return Ok(());
    }
    let levels = messages
        .iter()
        .map(|m| qos_level(m.qos))
        .collect::<Result<Vec<_>, _>>()?;
    let opts = mqtt_options(cfg)?;

    // The request channel must hold every message before the event loop runs.
    let (client, mut eventloop) = AsyncClient::new(opts, messages.len().max(10));
    let mut delivery = Delivery::new(&levels);
    for (message, qos) in messages.into_iter().zip(levels) {
        debug!(
            topic = %message.topic,
            bytes = message.payload.len(),
            qos = ?qos,
            "queueing message"
        );
        client
            .publish(message.topic, qos, message.retain, message.payload)
            .await?;
    }

    match time::timeout(
        cfg.publish_timeout,
        drive(&client, &mut eventloop, &mut delivery),
    )
    .await
    {
        Ok(result) => result,
        Err(_elapsed) => Err(PublishError::Timeout(cfg.publish_timeout)),
    }
}

async fn drive(
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    delivery: &mut Delivery,
) -> Result<(), PublishError> {
    let mut disconnecting = false;
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                debug!(code = ?ack.code, "connected to broker");
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => delivery.on_sent(pkid),
            Event::Incoming(Packet::PubAck(ack)) => delivery.on_acked(ack.pkid),
            Event::Incoming(Packet::PubComp(comp)) => delivery.on_acked(comp.pkid),
            Event::Outgoing(Outgoing::Disconnect) => return Ok(()),
            _ => {}
        }
        if delivery.is_complete() && !disconnecting {
            client.disconnect().await?;
            disconnecting = true;
        }
    }
}

/// Outstanding work for one publish batch. QoS 0 publishes carry packet id 0
/// and are done once written; the others wait for PUBACK or PUBCOMP.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Delivery {
    unsent: usize,
    unacked: usize,
}

impl Delivery {
    fn new(levels: &[QoS]) -> Self {
        let unsent = levels.iter().filter(|q| **q == QoS::AtMostOnce).count();
        Self {
            unsent,
            unacked: levels.len() - unsent,
        }
    }

    fn on_sent(&mut self, pkid: u16) {
        if pkid == 0 {
            self.unsent = self.unsent.saturating_sub(1);
        }
    }

    fn on_acked(&mut self, pkid: u16) {
        debug!(pkid, "delivery acknowledged");
        self.unacked = self.unacked.saturating_sub(1);
    }

    fn is_complete(&self) -> bool {
        self.unsent == 0 && self.unacked == 0
    }
}
