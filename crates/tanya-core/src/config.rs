//! Centralized Configuration Management
//!
//! All tunables of the replication protocol live here, grouped by concern.
//! Every section has working defaults so a config file only needs to name
//! what it changes.

use core::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Replication Configuration
// ----------------------------------------------------------------------------

/// Replication behavior and session lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Replicate through a Host; when false every mutation stays local
    pub enabled: bool,
    /// Client keep-alive ping interval (in milliseconds)
    pub keepalive_interval_ms: u64,
    /// How often authoritative processes check for expired sessions (in seconds)
    pub expiry_check_interval_secs: u64,
    /// Age after which a session is reset (in seconds)
    pub session_duration_secs: u64,
    /// Name of the bootstrap session
    pub default_session_name: String,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keepalive_interval_ms: 5_000,
            expiry_check_interval_secs: 60,
            session_duration_secs: 24 * 60 * 60,
            default_session_name: "Main Session".to_string(),
        }
    }
}

impl ReplicationConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval_secs)
    }

    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_secs)
    }
}

// ----------------------------------------------------------------------------
// Discovery Configuration
// ----------------------------------------------------------------------------

/// Join-by-code discovery timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Per-candidate connect timeout (in milliseconds)
    pub candidate_timeout_ms: u64,
    /// Pause after a candidate fails outright (in milliseconds)
    pub retry_pause_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            candidate_timeout_ms: 3_000,
            retry_pause_ms: 500,
        }
    }
}

impl DiscoveryConfig {
    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }
}

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Client reconnect policy after the Host link drops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts before giving up; zero disables reconnecting
    pub max_attempts: u32,
    /// Delay before the first attempt (in milliseconds)
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 1_000,
        }
    }
}

impl ReconnectConfig {
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the runtime channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for transport events (Transport → Replication loop)
    pub event_buffer_size: usize,
    /// Buffer size for intents (UI → Replication loop)
    pub intent_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 128, // Network events can be bursty
            intent_buffer_size: 32, // UI intents are infrequent
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            event_buffer_size: 16,
            intent_buffer_size: 8,
        }
    }
}

// ----------------------------------------------------------------------------
// Link Configuration
// ----------------------------------------------------------------------------

/// Shareable join link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Origin and path that join links are built on
    pub base_url: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Main Configuration
// ----------------------------------------------------------------------------

/// Master configuration for the replication protocol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TanyaConfig {
    pub replication: ReplicationConfig,
    pub discovery: DiscoveryConfig,
    pub reconnect: ReconnectConfig,
    pub channels: ChannelConfig,
    pub link: LinkConfig,
}

impl TanyaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            link: LinkConfig {
                base_url: "http://qa.test/".to_string(),
            },
            ..Self::default()
        }
    }

    /// Builder method for customizing replication configuration
    pub fn with_replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = replication;
        self
    }

    /// Builder method for customizing discovery configuration
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Builder method for customizing reconnect configuration
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.channels.event_buffer_size == 0 {
            return Err("Event buffer size cannot be zero".into());
        }
        if self.channels.intent_buffer_size == 0 {
            return Err("Intent buffer size cannot be zero".into());
        }
        if self.replication.keepalive_interval_ms == 0 {
            return Err("Keep-alive interval cannot be zero".into());
        }
        if self.replication.expiry_check_interval_secs == 0 {
            return Err("Expiry check interval cannot be zero".into());
        }
        if self.replication.default_session_name.trim().is_empty() {
            return Err("Default session name cannot be empty".into());
        }
        if self.discovery.candidate_timeout_ms == 0 {
            return Err("Discovery candidate timeout cannot be zero".into());
        }
        if self.reconnect.is_enabled() && self.reconnect.base_delay_ms == 0 {
            return Err("Reconnect base delay cannot be zero".into());
        }
        if url::Url::parse(&self.link.base_url).is_err() {
            return Err(format!("Invalid link base URL: {}", self.link.base_url));
        }
        Ok(())
    }
}
