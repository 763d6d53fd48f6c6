//! Limits configuration.

use serde::Deserialize;

/// Default maximum packet size (1MB).
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 1024 * 1024;

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum MQTT packet body size in bytes. Larger packets close the
    /// connection.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,
}

fn default_max_packet_size() -> u32 {
    DEFAULT_MAX_PACKET_SIZE
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

impl LimitsConfig {
    /// Validate the limits configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_packet_size == 0 {
            return Err("max_packet_size must be nonzero".into());
        }
        Ok(())
    }
}
