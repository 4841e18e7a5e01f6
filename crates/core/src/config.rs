use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an event-id allow-list such as `"4688, 4624"`.
///
/// Returns `None` when the list is empty (no filtering). Entries that are not
/// integers are logged and dropped.
pub fn parse_event_ids(raw: &str) -> Option<BTreeSet<u32>> {
    let mut ids = BTreeSet::new();
    for entry in parse_list(raw) {
        match entry.parse::<u32>() {
            Ok(id) => {
                ids.insert(id);
            }
            Err(_) => tracing::warn!(entry = %entry, "ignoring non-numeric event id in allow-list"),
        }
    }
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// Lenient boolean parsing for env flags.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub collector: CollectorConfig,
    pub tailer: TailerConfig,
    pub rules: RulesConfig,
    pub store: StoreConfig,
    /// How long the orchestrator waits for each loop to finish on shutdown.
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `AEGIS_PROFILE`. When set (e.g. `LAB`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("AEGIS_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let sink_path = PathBuf::from(profiled_env_or(p, "AEGIS_SINK_PATH", DEFAULT_SINK_PATH));
        Self {
            profile: p.to_string(),
            collector: CollectorConfig::from_env_profiled(p, sink_path.clone()),
            tailer: TailerConfig::from_env_profiled(p, sink_path),
            rules: RulesConfig::from_env_profiled(p),
            store: StoreConfig::from_env_profiled(p),
            shutdown_timeout: Duration::from_secs(profiled_env_u64(
                p,
                "AEGIS_SHUTDOWN_TIMEOUT_SECS",
                5,
            )),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  collector:   enabled={}, channels={:?}, interval={:?}, event_ids={:?}",
            self.collector.enabled,
            self.collector.channels,
            self.collector.poll_interval,
            self.collector.include_event_ids
        );
        tracing::info!(
            "  tailer:      enabled={}, interval={:?}, delivery={}, max_read={}B",
            self.tailer.enabled,
            self.tailer.poll_interval,
            self.tailer.delivery,
            self.tailer.max_read_bytes
        );
        tracing::info!("  sink:        path={}", self.tailer.sink_path.display());
        tracing::info!(
            "  rules:       dirs={:?}, commandline_image_fallback={}",
            self.rules.dirs,
            self.rules.commandline_image_fallback
        );
        tracing::info!("  store:       path={}", self.store.path.display());
    }
}

const DEFAULT_SINK_PATH: &str = "logs/security_events.log";

/// Bytes the tailer takes from the sink per cycle.
pub const DEFAULT_MAX_READ_BYTES: u64 = 4 * 1024 * 1024;

/// Channels polled when `AEGIS_CHANNELS` is unset.
pub const DEFAULT_CHANNELS: &[&str] = &[
    "Security",
    "Application",
    "Microsoft-Windows-PowerShell/Operational",
];

// ── Collector ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub enabled: bool,
    pub channels: Vec<String>,
    /// Event-id allow-list; `None` writes every event to the sink.
    pub include_event_ids: Option<BTreeSet<u32>>,
    pub sink_path: PathBuf,
    pub poll_interval: Duration,
}

impl CollectorConfig {
    fn from_env_profiled(p: &str, sink_path: PathBuf) -> Self {
        let channels = profiled_env_opt(p, "AEGIS_CHANNELS")
            .map(|raw| parse_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect());
        Self {
            enabled: profiled_env_bool(p, "AEGIS_COLLECTOR_ENABLED", true),
            channels,
            include_event_ids: profiled_env_opt(p, "AEGIS_INCLUDE_EVENT_IDS")
                .and_then(|raw| parse_event_ids(&raw)),
            sink_path,
            poll_interval: Duration::from_secs(profiled_env_u64(
                p,
                "AEGIS_COLLECTOR_INTERVAL_SECS",
                5,
            )),
        }
    }
}

// ── Tailer ────────────────────────────────────────────────────

/// When the tailer commits its read offset relative to persisting matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// Offset advances only after the cycle's batch is committed; a failed
    /// commit re-reads the same lines on the next cycle.
    #[default]
    AtLeastOnce,
    /// Offset advances as soon as lines are read; a failed commit drops the
    /// cycle's matches.
    AtMostOnce,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::AtLeastOnce => write!(f, "at-least-once"),
            DeliveryMode::AtMostOnce => write!(f, "at-most-once"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "at-least-once" => Ok(DeliveryMode::AtLeastOnce),
            "at-most-once" => Ok(DeliveryMode::AtMostOnce),
            _ => Err(ConfigError::InvalidValue {
                key: "AEGIS_DELIVERY".to_string(),
                value: s.to_string(),
                expected: "at-least-once or at-most-once".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailerConfig {
    pub enabled: bool,
    pub sink_path: PathBuf,
    pub poll_interval: Duration,
    pub delivery: DeliveryMode,
    pub max_read_bytes: u64,
}

impl TailerConfig {
    fn from_env_profiled(p: &str, sink_path: PathBuf) -> Self {
        let delivery = match profiled_env_opt(p, "AEGIS_DELIVERY") {
            Some(raw) => raw.parse().unwrap_or_else(|e: ConfigError| {
                tracing::warn!(error = %e, "falling back to at-least-once delivery");
                DeliveryMode::default()
            }),
            None => DeliveryMode::default(),
        };
        Self {
            enabled: profiled_env_bool(p, "AEGIS_TAILER_ENABLED", true),
            sink_path,
            poll_interval: Duration::from_secs(profiled_env_u64(
                p,
                "AEGIS_TAILER_INTERVAL_SECS",
                1,
            )),
            delivery,
            max_read_bytes: profiled_env_u64(
                p,
                "AEGIS_TAILER_MAX_READ_BYTES",
                DEFAULT_MAX_READ_BYTES,
            ),
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub dirs: Vec<PathBuf>,
    /// Substitute the resolved `image` value when a rule asks for a
    /// `commandline` the event does not carry.
    pub commandline_image_fallback: bool,
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        let dirs = parse_list(&profiled_env_or(p, "AEGIS_RULE_DIRS", "rules/sigma"))
            .into_iter()
            .map(PathBuf::from)
            .collect();
        Self {
            dirs,
            commandline_image_fallback: profiled_env_bool(
                p,
                "AEGIS_COMMANDLINE_IMAGE_FALLBACK",
                true,
            ),
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            path: PathBuf::from(profiled_env_or(p, "AEGIS_DB_PATH", "aegis.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_trims_and_drops_empty() {
        assert_eq!(
            parse_list(" Security , ,Application,"),
            vec!["Security".to_string(), "Application".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn parse_event_ids_ignores_garbage() {
        let ids = parse_event_ids("4688, abc, 4624").unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![4624, 4688]);
    }

    #[test]
    fn empty_allow_list_means_no_filter() {
        assert!(parse_event_ids("").is_none());
        assert!(parse_event_ids(" , x").is_none());
    }

    #[test]
    fn delivery_mode_parses_both_spellings() {
        assert_eq!("at-most-once".parse::<DeliveryMode>().unwrap(), DeliveryMode::AtMostOnce);
        assert_eq!("AT_LEAST_ONCE".parse::<DeliveryMode>().unwrap(), DeliveryMode::AtLeastOnce);
        assert!("exactly-once".parse::<DeliveryMode>().is_err());
        assert_eq!(DeliveryMode::AtMostOnce.to_string(), "at-most-once");
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
