//! MQTT state source.
//!
//! Subscribes to one state topic per mapped entity
//! (`<topic_prefix>/<entity_id>`) and forwards decoded on/off notifications
//! into the engine. The subscription set is exactly the mapping table's
//! entity set; anything else that shows up on the wire is logged and dropped.

use std::time::Duration;

use anyhow::Context;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::MqttConfig;
use crate::engine::EngineHandle;

pub struct MqttSource {
    mqtt_options: MqttOptions,
    topic_prefix: String,
}

impl MqttSource {
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            topic_prefix: config.topic_prefix.clone(),
        }
    }

    /// Connect, subscribe to every entity's state topic, and forward state
    /// changes into the engine. Returns once the engine has shut down.
    pub async fn run(self, entities: Vec<String>, engine: EngineHandle) -> anyhow::Result<()> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options, 10);

        info!("subscribing to {} entity state topics", entities.len());
        for entity in &entities {
            let topic = format!("{}/{}", self.topic_prefix, entity);
            client
                .subscribe(topic.as_str(), QoS::AtMostOnce)
                .await
                .with_context(|| format!("failed to subscribe to {topic}"))?;
        }

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let Some(entity) = entity_from_topic(&self.topic_prefix, &publish.topic)
                    else {
                        warn!("ignoring message on unexpected topic {}", publish.topic);
                        continue;
                    };

                    let on = parse_state_payload(&publish.payload);
                    debug!("{entity} reported {}", if on { "on" } else { "off" });

                    if engine.state_changed(entity, on).await.is_err() {
                        info!("engine gone, stopping MQTT source");
                        return Ok(());
                    }
                }
                Ok(_) => {
                    // Ignore other events (connack, suback, pings, ...).
                }
                Err(e) => {
                    warn!("MQTT event loop error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// Extract the entity id from a state topic, if it belongs to our prefix.
fn entity_from_topic<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    (!rest.is_empty()).then_some(rest)
}

/// Decode a state payload. Undefined and off are false, as in Home Assistant
/// state strings; `on`/`ON`, `true`, and `1` are on.
fn parse_state_payload(payload: &[u8]) -> bool {
    match std::str::from_utf8(payload) {
        Ok(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("on") || s.eq_ignore_ascii_case("true") || s == "1"
        }
        Err(_) => false,
    }
}
