//! # Replication Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so a file
//! only needs to name what it changes.
//!
//! ```toml
//! tick_rate = 60
//! command_buffer_capacity = 64
//! snapshot_history = 32
//! model_fingerprint = "0x1234567890abcdef"
//! ```
//!
//! The compression model and quantization scales are not configurable.
//! `model_fingerprint` only pins the build: startup fails if the compiled
//! model differs from the one the deployment expects.

use std::path::Path;

use serde::{Deserialize, Serialize};
use wraith_shared::{MAX_CLIENTS, MAX_PACKET_SIZE, TICK_RATE};

use crate::error::{NetError, NetResult};
use crate::protocol::CompressionModel;

/// Replication tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicationConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Command ring slots per controlled ghost. Power of two.
    pub command_buffer_capacity: usize,
    /// Received snapshots kept per ghost on the client. Also the oldest a
    /// server baseline may be, in ticks.
    pub snapshot_history: usize,
    /// Unacknowledged frames the server remembers per connection.
    pub sent_history: usize,
    /// Connection cap.
    pub max_connections: usize,
    /// Ticks without a packet before a connection is dropped.
    pub timeout_ticks: u32,
    /// How far behind the newest snapshot remote ghosts are rendered.
    pub interpolation_delay_ticks: u32,
    /// Packet budget in bytes.
    pub max_packet_size: usize,
    /// Bounded inbound event queue length.
    pub event_queue_capacity: usize,
    /// Expected compression model fingerprint as `0x`-prefixed hex, if
    /// pinned. A string because TOML integers stop at `i64::MAX`.
    pub model_fingerprint: Option<String>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            command_buffer_capacity: 64,
            snapshot_history: 32,
            sent_history: 32,
            max_connections: MAX_CLIENTS,
            timeout_ticks: TICK_RATE * 5,
            interpolation_delay_ticks: 2,
            max_packet_size: MAX_PACKET_SIZE,
            event_queue_capacity: 4096,
            model_fingerprint: None,
        }
    }
}

impl ReplicationConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> NetResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| NetError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> NetResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NetError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> NetResult<()> {
        let invalid = |msg: &str| Err(NetError::InvalidConfig(msg.to_owned()));

        if self.tick_rate == 0 {
            return invalid("tick_rate must be positive");
        }
        if self.command_buffer_capacity < 2 || !self.command_buffer_capacity.is_power_of_two() {
            return invalid("command_buffer_capacity must be a power of two >= 2");
        }
        if self.snapshot_history < 2 {
            return invalid("snapshot_history must be >= 2");
        }
        if self.sent_history < 2 {
            return invalid("sent_history must be >= 2");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be positive");
        }
        if self.timeout_ticks == 0 {
            return invalid("timeout_ticks must be positive");
        }
        // Header plus at least one small ghost entry.
        if self.max_packet_size < 16 {
            return invalid("max_packet_size must be >= 16");
        }
        if self.event_queue_capacity == 0 {
            return invalid("event_queue_capacity must be positive");
        }
        self.expected_fingerprint()?;
        Ok(())
    }

    /// Oldest usable server baseline, in ticks.
    #[must_use]
    pub fn max_baseline_age(&self) -> u32 {
        u32::try_from(self.snapshot_history).unwrap_or(u32::MAX)
    }

    /// Parsed `model_fingerprint`.
    pub fn expected_fingerprint(&self) -> NetResult<Option<u64>> {
        let Some(text) = self.model_fingerprint.as_deref() else {
            return Ok(None);
        };
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text)
            .replace('_', "");
        u64::from_str_radix(&digits, 16)
            .map(Some)
            .map_err(|e| NetError::InvalidConfig(format!("model_fingerprint {text:?}: {e}")))
    }

    /// The compiled compression model, checked against `model_fingerprint`.
    pub fn compression_model(&self) -> NetResult<CompressionModel> {
        let model = CompressionModel::default();
        match self.expected_fingerprint()? {
            Some(expected) if expected != model.fingerprint() => Err(NetError::ModelMismatch {
                expected,
                actual: model.fingerprint(),
            }),
            _ => Ok(model),
        }
    }
}
