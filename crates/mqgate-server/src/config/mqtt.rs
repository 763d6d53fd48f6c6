//! MQTT capability configuration.
//!
//! This is the broker's capability snapshot, advertised to clients in
//! CONNACK. The core serves QoS 0 only and has no topic tree, so every
//! capability defaults to off.

use serde::Deserialize;

/// MQTT capability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Maximum QoS level granted to clients (0, 1, or 2).
    #[serde(default)]
    pub max_qos: u8,

    /// Whether retained messages are available.
    #[serde(default)]
    pub retain_available: bool,

    /// Whether wildcard subscriptions are available.
    #[serde(default)]
    pub wildcard_subscriptions: bool,

    /// Whether subscription identifiers are available.
    #[serde(default)]
    pub subscription_identifiers: bool,

    /// Whether shared subscriptions are available.
    #[serde(default)]
    pub shared_subscriptions: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            max_qos: 0,
            retain_available: false,
            wildcard_subscriptions: false,
            subscription_identifiers: false,
            shared_subscriptions: false,
        }
    }
}

impl MqttConfig {
    /// Validate the MQTT configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_qos > 2 {
            return Err("max_qos must be 0, 1, or 2".into());
        }
        Ok(())
    }
}
