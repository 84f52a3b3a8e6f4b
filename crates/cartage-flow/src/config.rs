//! Flow configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use cartage_core::{SlotId, SpotName};

/// Default reconciliation interval in seconds.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Policy for terminal dispatch sub-status 5.
///
/// The fleet service reports two terminal codes. Code 3 is an ordinary
/// completion; code 5 is terminal but its meaning (completed vs cancelled)
/// is not documented by the service. The observed deployment advanced the
/// ledger identically for both, so that is the default here, with a
/// rollback alternative for sites where 5 denotes a cancelled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalCodePolicy {
    /// Treat sub-status 5 like sub-status 3: the leg completed.
    CompleteAsSuccess,
    /// Treat sub-status 5 as a cancelled order: return the request to its
    /// pre-dispatch status pair and free any slot it holds.
    RollBack,
}

impl Default for TerminalCodePolicy {
    fn default() -> Self {
        Self::CompleteAsSuccess
    }
}

/// Wire settings for the fleet dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Base URL of the fleet dispatch service.
    pub base_url: String,
    /// Process model code sent with every order.
    #[serde(default = "default_process_code")]
    pub process_code: String,
    /// Originating-system tag sent with every order.
    #[serde(default = "default_from_system")]
    pub from_system: String,
}

fn default_process_code() -> String {
    "cart01".to_string()
}

fn default_from_system() -> String {
    "TSC".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7000/ics".to_string(),
            process_code: default_process_code(),
            from_system: default_from_system(),
        }
    }
}

/// Configuration for the preparation flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Seconds between reconciliation passes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Spot-name prefix of the lanes that feed the shared buffers.
    ///
    /// Requests whose fixed endpoint carries this prefix rest at `InUse`
    /// instead of `Prepare`, and are the population promoted when a
    /// buffer frees up.
    #[serde(default = "default_feeder_prefix")]
    pub feeder_prefix: String,

    /// Spot name of the first shared buffer.
    #[serde(default = "default_buffer_a")]
    pub buffer_a_spot: SpotName,

    /// Spot name of the second shared buffer.
    #[serde(default = "default_buffer_b")]
    pub buffer_b_spot: SpotName,

    /// How terminal sub-status 5 is applied to the ledger.
    #[serde(default)]
    pub terminal_code_policy: TerminalCodePolicy,

    /// Fleet dispatcher wire settings.
    #[serde(default)]
    pub fleet: FleetConfig,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_feeder_prefix() -> String {
    "MB-".to_string()
}

fn default_buffer_a() -> SpotName {
    SpotName::new("MB-FG-01")
}

fn default_buffer_b() -> SpotName {
    SpotName::new("MB-FG-02")
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            feeder_prefix: default_feeder_prefix(),
            buffer_a_spot: default_buffer_a(),
            buffer_b_spot: default_buffer_b(),
            terminal_code_policy: TerminalCodePolicy::default(),
            fleet: FleetConfig::default(),
        }
    }
}

impl FlowConfig {
    /// Returns the reconciliation interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the spot name configured for a slot.
    #[must_use]
    pub const fn slot_spot(&self, slot: SlotId) -> &SpotName {
        match slot {
            SlotId::BufferA => &self.buffer_a_spot,
            SlotId::BufferB => &self.buffer_b_spot,
        }
    }

    /// Returns both buffer spot names in slot order.
    #[must_use]
    pub fn buffer_spots(&self) -> [SpotName; 2] {
        [self.buffer_a_spot.clone(), self.buffer_b_spot.clone()]
    }

    /// Returns true if the spot is one of the two shared buffers.
    #[must_use]
    pub fn is_buffer_spot(&self, spot: &SpotName) -> bool {
        spot == &self.buffer_a_spot || spot == &self.buffer_b_spot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = FlowConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert!(config.is_buffer_spot(&SpotName::new("MB-FG-01")));
        assert!(!config.is_buffer_spot(&SpotName::new("MB-01")));
        assert_eq!(
            config.terminal_code_policy,
            TerminalCodePolicy::CompleteAsSuccess
        );
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: FlowConfig = serde_json::from_str(
            r#"{"poll_interval_secs": 2, "terminal_code_policy": "roll_back"}"#,
        )
        .expect("valid config");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.terminal_code_policy, TerminalCodePolicy::RollBack);
        assert_eq!(config.feeder_prefix, "MB-");
    }

    #[test]
    fn slot_spot_maps_both_buffers() {
        let config = FlowConfig::default();
        assert_eq!(config.slot_spot(SlotId::BufferA).as_str(), "MB-FG-01");
        assert_eq!(config.slot_spot(SlotId::BufferB).as_str(), "MB-FG-02");
    }
}
