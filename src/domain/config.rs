// ============================================================================
// Dispatch Configuration
// Tunables for the index, locks, notification hub and ingestion pipeline
// ============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Durations travel as integer milliseconds in config files
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Location Index
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Idle window after which a silent driver disappears from search
    #[serde(with = "duration_ms")]
    pub location_ttl: Duration,

    /// Grid steps searched around the pickup cell (0 = pickup cell only)
    pub search_ring: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            location_ttl: Duration::from_secs(10 * 60),
            search_ring: 0,
        }
    }
}

// ============================================================================
// Assignment Lock
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Safety net against a holder crashing before release
    #[serde(with = "duration_ms")]
    pub ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Notification Hub
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-connection outbound queue capacity; the oldest message is dropped
    /// when a slow client lets it fill up
    pub outbound_capacity: usize,

    /// Keepalive ping period on the writer side
    #[serde(with = "duration_ms")]
    pub ping_interval: Duration,

    /// Reader tears the connection down after this long without any frame
    #[serde(with = "duration_ms")]
    pub pong_wait: Duration,

    /// Upper bound on a single frame write
    #[serde(with = "duration_ms")]
    pub write_wait: Duration,

    /// Inbound frames above this size close the connection
    pub max_inbound_frame_bytes: usize,

    /// Buffer of the registry task's command channel
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            outbound_capacity: 256,
            ping_interval: pong_wait * 9 / 10,
            pong_wait,
            write_wait: Duration::from_secs(10),
            max_inbound_frame_bytes: 512,
            command_buffer: 1024,
        }
    }
}

impl HubConfig {
    /// Checked before the registry task starts; a zero ping interval would
    /// panic inside the connection tasks
    pub fn validate(&self) -> Result<(), String> {
        if self.outbound_capacity == 0 {
            return Err("Outbound queue capacity must be positive".to_string());
        }

        if self.command_buffer == 0 {
            return Err("Hub command buffer must be positive".to_string());
        }

        if self.ping_interval.is_zero() || self.ping_interval >= self.pong_wait {
            return Err("Ping interval must be positive and shorter than pong wait".to_string());
        }

        if self.write_wait.is_zero() {
            return Err("Write wait must be positive".to_string());
        }

        if self.max_inbound_frame_bytes == 0 {
            return Err("Inbound frame limit must be positive".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Ingestion Pipeline
// ============================================================================

/// Bounded exponential backoff: `base_delay * 2^(attempt - 1)` between
/// attempts, at most `max_attempts` attempts in total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,

    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on one queue poll; also bounds cancellation latency
    #[serde(with = "duration_ms")]
    pub poll_timeout: Duration,

    /// Fixed pause after a broker/transport failure
    #[serde(with = "duration_ms")]
    pub reconnect_backoff: Duration,

    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// Complete Dispatch Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub index: IndexConfig,
    pub lock: LockConfig,
    pub hub: HubConfig,
    pub pipeline: PipelineConfig,
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: Set location entry TTL
    pub fn with_location_ttl(mut self, ttl: Duration) -> Self {
        self.index.location_ttl = ttl;
        self
    }

    /// Builder method: Set search ring around the pickup cell
    pub fn with_search_ring(mut self, ring: u32) -> Self {
        self.index.search_ring = ring;
        self
    }

    /// Builder method: Set assignment lock TTL
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock.ttl = ttl;
        self
    }

    /// Builder method: Set outbound queue capacity per connection
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.hub.outbound_capacity = capacity;
        self
    }

    /// Builder method: Set keepalive ping interval and liveness window
    pub fn with_heartbeat(mut self, ping_interval: Duration, pong_wait: Duration) -> Self {
        self.hub.ping_interval = ping_interval;
        self.hub.pong_wait = pong_wait;
        self
    }

    /// Builder method: Set pipeline retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.pipeline.retry = retry;
        self
    }

    /// Builder method: Set queue poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline.poll_timeout = timeout;
        self
    }

    /// Builder method: Set pause after broker failures
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.pipeline.reconnect_backoff = backoff;
        self
    }

    /// Parse a JSON document; missing sections take their defaults
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.index.location_ttl.is_zero() {
            return Err("Location TTL must be positive".to_string());
        }

        if self.lock.ttl.is_zero() {
            return Err("Lock TTL must be positive".to_string());
        }

        self.hub.validate()?;

        if self.pipeline.poll_timeout.is_zero() {
            return Err("Poll timeout must be positive".to_string());
        }

        if self.pipeline.retry.max_attempts == 0 {
            return Err("Retry policy needs at least one attempt".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl DispatchConfig {
    /// Short timers for local runs and tests
    /// - 50ms poll timeout, 100ms reconnect backoff
    /// - Retry base delay of 10ms
    /// - 1s ping / 2s liveness window
    pub fn fast_feedback() -> Self {
        Self::default()
            .with_poll_timeout(Duration::from_millis(50))
            .with_reconnect_backoff(Duration::from_millis(100))
            .with_retry(RetryPolicy::new(3, Duration::from_millis(10)))
            .with_heartbeat(Duration::from_secs(1), Duration::from_secs(2))
    }

    /// Wider search for sparse (suburban) supply
    pub fn sparse_supply() -> Self {
        Self::default().with_search_ring(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_recommended_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.index.location_ttl, Duration::from_secs(600));
        assert_eq!(config.lock.ttl, Duration::from_secs(60));
        assert_eq!(config.hub.ping_interval, Duration::from_secs(54));
        assert_eq!(config.hub.pong_wait, Duration::from_secs(60));
        assert_eq!(config.pipeline.retry.max_attempts, 3);
        assert_eq!(config.pipeline.reconnect_backoff, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_validation() {
        let config = DispatchConfig::default()
            .with_heartbeat(Duration::from_secs(60), Duration::from_secs(60));
        assert!(config.validate().is_err());

        let config = DispatchConfig::default().with_outbound_capacity(0);
        assert!(config.validate().is_err());

        let config = DispatchConfig::default().with_retry(RetryPolicy::new(0, Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hub_validation() {
        assert!(HubConfig::default().validate().is_ok());

        let zero_ping = HubConfig {
            ping_interval: Duration::ZERO,
            ..HubConfig::default()
        };
        assert!(zero_ping.validate().is_err());

        let no_frames = HubConfig {
            max_inbound_frame_bytes: 0,
            ..HubConfig::default()
        };
        assert!(no_frames.validate().is_err());
    }

    #[test]
    fn test_oversized_duration_saturates() {
        let json = serde_json::to_value(LockConfig { ttl: Duration::MAX }).unwrap();
        assert_eq!(json["ttl"], u64::MAX);

        let json = serde_json::to_value(LockConfig::default()).unwrap();
        assert_eq!(json["ttl"], 60_000);
    }

    #[test]
    fn test_from_json_partial_document() {
        let config =
            DispatchConfig::from_json(r#"{"lock": {"ttl": 30000}, "index": {"search_ring": 1}}"#)
                .unwrap();
        assert_eq!(config.lock.ttl, Duration::from_secs(30));
        assert_eq!(config.index.search_ring, 1);
        assert_eq!(config.index.location_ttl, Duration::from_secs(600));

        assert!(DispatchConfig::from_json(r#"{"hub": {"outbound_capacity": 0}}"#).is_err());
    }

    #[test]
    fn test_preset_configs() {
        assert!(DispatchConfig::fast_feedback().validate().is_ok());
        assert_eq!(DispatchConfig::sparse_supply().index.search_ring, 1);
    }
}
