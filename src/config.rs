//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SignalError};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Source adapter configuration
    #[serde(default)]
    pub sources: SourceConfig,

    /// Presence detector configuration
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Follow-up rule windows
    #[serde(default)]
    pub followup: FollowUpConfig,

    /// Scoring configuration
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Last-seen cache configuration
    #[serde(default)]
    pub last_seen_cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sources: SourceConfig::default(),
            presence: PresenceConfig::default(),
            followup: FollowUpConfig::default(),
            scoring: ScoringConfig::default(),
            last_seen_cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `.env` and `SIGNAL_ENGINE_*` environment
    /// variables layered over the defaults.
    ///
    /// Example: `SIGNAL_ENGINE_SOURCES__FETCH_TIMEOUT_MS=1500` overrides
    /// `sources.fetch_timeout_ms`.
    pub fn load() -> Result<Self> {
        // A missing .env file is fine; only a malformed one is an error.
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(SignalError::Configuration(format!(
                    "failed to read .env: {}",
                    e
                )))
            }
        }

        let cfg = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SIGNAL_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SignalError::Configuration(format!("failed to build config: {}", e)))?;

        let engine: EngineConfig = cfg
            .try_deserialize()
            .map_err(|e| SignalError::Configuration(format!("invalid configuration: {}", e)))?;

        engine.validate()?;
        Ok(engine)
    }

    /// Validate cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.sources.fetch_timeout_ms == 0 {
            return Err(SignalError::Configuration(
                "sources.fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.scoring.max_parallel == 0 {
            return Err(SignalError::Configuration(
                "scoring.max_parallel must be greater than zero".to_string(),
            ));
        }
        if self.presence.recheck_interval_secs > self.presence.refetch_interval_secs {
            return Err(SignalError::Configuration(format!(
                "presence.recheck_interval_secs ({}) must not exceed refetch_interval_secs ({})",
                self.presence.recheck_interval_secs, self.presence.refetch_interval_secs
            )));
        }
        Ok(())
    }
}

/// Source adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Shared deadline for each source fetch in a fan-out, in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Consecutive failures before a source's circuit opens
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: usize,

    /// Seconds an open circuit waits before allowing a probe fetch
    #[serde(default = "default_breaker_reset_secs")]
    pub breaker_reset_secs: u64,
}

fn default_fetch_timeout_ms() -> u64 {
    2_000
}

fn default_breaker_threshold() -> usize {
    5
}

fn default_breaker_reset_secs() -> u64 {
    30
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            breaker_failure_threshold: default_breaker_threshold(),
            breaker_reset_secs: default_breaker_reset_secs(),
        }
    }
}

impl SourceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn breaker_reset(&self) -> Duration {
        Duration::from_secs(self.breaker_reset_secs)
    }
}

/// Presence detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Window within which a lead counts as active, in seconds
    #[serde(default = "default_active_threshold_secs")]
    pub active_threshold_secs: u64,

    /// Staleness recheck interval in seconds; lets `is_active` flip to
    /// false as time passes with no new data
    #[serde(default = "default_recheck_interval_secs")]
    pub recheck_interval_secs: u64,

    /// Interval for refetching the underlying timestamps in seconds;
    /// catches updates that arrive outside the push channel
    #[serde(default = "default_refetch_interval_secs")]
    pub refetch_interval_secs: u64,
}

fn default_active_threshold_secs() -> u64 {
    120
}

fn default_recheck_interval_secs() -> u64 {
    10
}

fn default_refetch_interval_secs() -> u64 {
    30
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            active_threshold_secs: default_active_threshold_secs(),
            recheck_interval_secs: default_recheck_interval_secs(),
            refetch_interval_secs: default_refetch_interval_secs(),
        }
    }
}

impl PresenceConfig {
    pub fn active_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.active_threshold_secs as i64)
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }

    pub fn refetch_interval(&self) -> Duration {
        Duration::from_secs(self.refetch_interval_secs)
    }
}

/// Follow-up rule windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpConfig {
    /// Hours after a demo email is sent before an unviewed demo flags
    #[serde(default = "default_demo_unviewed_hours")]
    pub demo_unviewed_hours: i64,

    /// Hours after a first view before a reply-less demo flags
    #[serde(default = "default_viewed_no_reply_hours")]
    pub viewed_no_reply_hours: i64,

    /// Days of lead inactivity before the inactivity rule flags
    #[serde(default = "default_inactive_days")]
    pub inactive_days: i64,

    /// Hours of lookback for the recent-activity scan
    #[serde(default = "default_recent_activity_hours")]
    pub recent_activity_hours: i64,
}

fn default_demo_unviewed_hours() -> i64 {
    48
}

fn default_viewed_no_reply_hours() -> i64 {
    24
}

fn default_inactive_days() -> i64 {
    7
}

fn default_recent_activity_hours() -> i64 {
    48
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            demo_unviewed_hours: default_demo_unviewed_hours(),
            viewed_no_reply_hours: default_viewed_no_reply_hours(),
            inactive_days: default_inactive_days(),
            recent_activity_hours: default_recent_activity_hours(),
        }
    }
}

impl FollowUpConfig {
    pub fn demo_unviewed_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.demo_unviewed_hours)
    }

    pub fn viewed_no_reply_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.viewed_no_reply_hours)
    }

    pub fn inactive_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.inactive_days)
    }

    pub fn recent_activity_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recent_activity_hours)
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Maximum concurrent per-lead computations in a fleet recompute
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    8
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

/// Advisory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached entries
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,

    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_cache_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.presence.active_threshold_secs, 120);
        assert_eq!(config.presence.recheck_interval_secs, 10);
        assert_eq!(config.presence.refetch_interval_secs, 30);
        assert_eq!(config.followup.demo_unviewed_hours, 48);
        assert_eq!(config.followup.viewed_no_reply_hours, 24);
        assert_eq!(config.followup.inactive_days, 7);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = EngineConfig::default();
        config.sources.fetch_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_presence_intervals() {
        let mut config = EngineConfig::default();
        config.presence.recheck_interval_secs = 60;
        config.presence.refetch_interval_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_helpers() {
        let config = FollowUpConfig::default();
        assert_eq!(config.demo_unviewed_window(), chrono::Duration::hours(48));
        assert_eq!(config.inactive_window(), chrono::Duration::days(7));
    }
}
