//! Circuit breaker for event source protection

use super::models::SourceKind;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit state for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,   // Normal operation
    Open,     // Failing, skip fetches
    HalfOpen, // Probing whether the source recovered
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: BreakerState,
    failure_count: usize,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            opened_at: None,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-source circuit breaker.
///
/// A source that keeps failing is skipped by the fan-out until the reset
/// timeout elapses, then a single probe fetch decides whether it closes.
pub struct SourceBreaker {
    entries: Mutex<HashMap<SourceKind, BreakerEntry>>,
    config: BreakerConfig,
}

impl SourceBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Check if the circuit is open for a source. An open circuit past its
    /// reset timeout transitions to half-open and lets the next fetch probe.
    pub fn is_open(&self, source: SourceKind) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(source).or_insert_with(BreakerEntry::new);

        match entry.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                if let Some(opened_at) = entry.opened_at {
                    if opened_at.elapsed() >= self.config.reset_timeout {
                        entry.state = BreakerState::HalfOpen;
                        false
                    } else {
                        true
                    }
                } else {
                    true
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    /// Mark a successful fetch
    pub fn mark_success(&self, source: SourceKind) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(source).or_insert_with(BreakerEntry::new);

        entry.state = BreakerState::Closed;
        entry.failure_count = 0;
        entry.last_failure = None;
        entry.opened_at = None;
    }

    /// Mark a failed fetch. A failed half-open probe reopens immediately.
    pub fn mark_failure(&self, source: SourceKind) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(source).or_insert_with(BreakerEntry::new);

        entry.failure_count += 1;
        entry.last_failure = Some(Instant::now());

        if entry.state == BreakerState::HalfOpen
            || entry.failure_count >= self.config.failure_threshold
        {
            entry.state = BreakerState::Open;
            entry.opened_at = Some(Instant::now());
        }
    }

    /// Current state for a source
    pub fn state(&self, source: SourceKind) -> BreakerState {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&source)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Statistics for a source
    pub fn stats(&self, source: SourceKind) -> BreakerStats {
        let entries = self.entries.lock().unwrap();

        if let Some(entry) = entries.get(&source) {
            BreakerStats {
                state: entry.state,
                failure_count: entry.failure_count,
                last_failure: entry.last_failure,
            }
        } else {
            BreakerStats {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }
        }
    }

}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub failure_count: usize,
    pub last_failure: Option<Instant>,
}
