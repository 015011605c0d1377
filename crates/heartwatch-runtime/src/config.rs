//! Startup configuration: CLI flags merged with environment settings.
//!
//! Settings follow the naming convention `HEARTWATCH_STREAMS`,
//! `HEARTWATCH_TIMEOUT_DEFAULT`, and `HEARTWATCH_TIMEOUT_<STREAM>` for
//! per-stream overrides. The override values stay unparsed here; the
//! registry decides validity and falls back on malformed input.

use std::collections::HashMap;

use heartwatch_core::registry::{DEFAULT_TIMEOUT_SECS, StreamRegistry};

/// Env prefix for per-stream timeout overrides.
pub const TIMEOUT_OVERRIDE_PREFIX: &str = "HEARTWATCH_TIMEOUT_";

/// Resolved watchdog configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub streams: Vec<String>,
    pub default_timeout_secs: u64,
    pub overrides: HashMap<String, String>,
}

impl WatchConfig {
    /// Merge CLI values with environment lookups.
    ///
    /// `streams`/`default_timeout_secs` come from the CLI layer (clap
    /// already falls back to the env there); per-stream overrides are read
    /// from `<prefix><STREAM>` variables for each configured stream.
    pub fn resolve(
        streams: Option<&str>,
        default_timeout_secs: Option<u64>,
        env_lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let streams = parse_stream_list(streams.unwrap_or_default());
        if streams.is_empty() {
            anyhow::bail!("no streams configured (set --streams or HEARTWATCH_STREAMS)");
        }

        let default_timeout_secs = default_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut overrides = HashMap::new();
        for stream in &streams {
            let key = override_key(stream);
            if let Some(value) = env_lookup(&key) {
                overrides.insert(stream.clone(), value);
            }
        }

        Ok(Self {
            streams,
            default_timeout_secs,
            overrides,
        })
    }

    /// Build the immutable registry from this configuration.
    pub fn into_registry(self) -> StreamRegistry {
        StreamRegistry::load(&self.streams, self.default_timeout_secs, &self.overrides)
    }
}

/// `HEARTWATCH_TIMEOUT_<STREAM>` with the stream name uppercased.
fn override_key(stream: &str) -> String {
    format!("{TIMEOUT_OVERRIDE_PREFIX}{}", stream.to_uppercase())
}

/// Split a comma-separated stream list, trimming and dropping empties.
fn parse_stream_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_comma_separated_streams() {
        let config =
            WatchConfig::resolve(Some("WebShop, MasterProcess ,Batch"), Some(30), no_env)
                .expect("resolve");
        assert_eq!(config.streams, vec!["WebShop", "MasterProcess", "Batch"]);
    }

    #[test]
    fn empty_stream_list_is_an_error() {
        assert!(WatchConfig::resolve(Some(""), Some(30), no_env).is_err());
        assert!(WatchConfig::resolve(None, Some(30), no_env).is_err());
        assert!(WatchConfig::resolve(Some(" , ,"), Some(30), no_env).is_err());
    }

    #[test]
    fn missing_default_uses_process_default() {
        let config = WatchConfig::resolve(Some("WebShop"), None, no_env).expect("resolve");
        assert_eq!(config.default_timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn collects_overrides_by_convention() {
        let env = |key: &str| match key {
            "HEARTWATCH_TIMEOUT_WEBSHOP" => Some("90".to_owned()),
            _ => None,
        };
        let config =
            WatchConfig::resolve(Some("WebShop,MasterProcess"), Some(30), env).expect("resolve");
        assert_eq!(config.overrides.get("WebShop").map(String::as_str), Some("90"));
        assert!(!config.overrides.contains_key("MasterProcess"));

        let registry = config.into_registry();
        assert_eq!(registry.timeout_for("WebShop"), Duration::from_secs(90));
        assert_eq!(
            registry.timeout_for("MasterProcess"),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn malformed_override_survives_registry_load() {
        let env = |key: &str| match key {
            "HEARTWATCH_TIMEOUT_WEBSHOP" => Some("soon".to_owned()),
            _ => None,
        };
        let config = WatchConfig::resolve(Some("WebShop"), Some(30), env).expect("resolve");
        let registry = config.into_registry();
        assert_eq!(registry.timeout_for("WebShop"), Duration::from_secs(30));
    }
}
