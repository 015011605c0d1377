//! Stream registry: immutable mapping from stream name to idle timeout.
//!
//! Loaded once at startup from the configured stream list, a default
//! timeout, and optional per-stream overrides. Read-only for the remainder
//! of the process run.

use std::collections::HashMap;
use std::time::Duration;

// ─── Constants ────────────────────────────────────────────────────

/// Process-wide default idle timeout when none is configured (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ─── Registry ─────────────────────────────────────────────────────

/// Immutable stream → idle-timeout mapping.
///
/// A per-stream override wins when present and parseable; a malformed or
/// zero override is non-fatal and falls back to the default with a warning.
#[derive(Debug, Clone)]
pub struct StreamRegistry {
    streams: Vec<String>,
    default_timeout: Duration,
    overrides: HashMap<String, Duration>,
}

impl StreamRegistry {
    /// Build the registry from the configured stream names, the default
    /// timeout in seconds, and raw per-stream override values.
    ///
    /// `raw_overrides` maps stream name → unparsed setting text (the runtime
    /// collects these from `HEARTWATCH_TIMEOUT_<STREAM>` variables). Entries
    /// for streams not in `stream_names` are ignored.
    pub fn load(
        stream_names: &[String],
        default_timeout_secs: u64,
        raw_overrides: &HashMap<String, String>,
    ) -> Self {
        let default_timeout = if default_timeout_secs >= 1 {
            Duration::from_secs(default_timeout_secs)
        } else {
            tracing::warn!(
                configured = default_timeout_secs,
                fallback = DEFAULT_TIMEOUT_SECS,
                "default timeout below 1s, using process default"
            );
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        };

        let mut overrides = HashMap::new();
        for name in stream_names {
            let Some(raw) = raw_overrides.get(name) else {
                continue;
            };
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs >= 1 => {
                    tracing::info!(stream = %name, timeout_secs = secs, "stream timeout override");
                    overrides.insert(name.clone(), Duration::from_secs(secs));
                }
                Ok(secs) => {
                    tracing::warn!(
                        stream = %name,
                        value = secs,
                        "timeout override below 1s, using default"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        stream = %name,
                        value = %raw,
                        "unparseable timeout override, using default"
                    );
                }
            }
        }

        Self::with_timeouts(stream_names, default_timeout, overrides)
    }

    /// Build a registry from already-resolved durations.
    pub fn with_timeouts(
        stream_names: &[String],
        default_timeout: Duration,
        overrides: HashMap<String, Duration>,
    ) -> Self {
        Self {
            streams: stream_names.to_vec(),
            default_timeout,
            overrides,
        }
    }

    /// Idle timeout for a stream: the override if one was accepted at load
    /// time, otherwise the default. Never fails, even for unknown streams.
    pub fn timeout_for(&self, stream_name: &str) -> Duration {
        self.overrides
            .get(stream_name)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Whether the stream was configured at load time.
    pub fn contains(&self, stream_name: &str) -> bool {
        self.streams.iter().any(|s| s == stream_name)
    }

    /// Configured stream names, in configuration order.
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    /// The default idle timeout.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

// ─── Tests ────────────────────────────────────────────────────────
