//! Configuration structures.
//!
//! Configuration is built from defaults, an optional JSON file, and
//! `CLOUDCOST_*` environment overrides, in that order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Global engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Plugin launch, negotiation and dispatch settings.
    #[serde(default)]
    pub plugins: PluginConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// IPC transport configuration.
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Provider-scoped defaults used when a resource omits a field.
    #[serde(default)]
    pub providers: ProviderDefaults,
}

impl Config {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CLOUDCOST_*` environment overrides on top of the current values.
    pub fn apply_env(mut self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        self.validate()?;
        Ok(self)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_env_u64(&lookup, "CLOUDCOST_BIND_TIMEOUT_MS")? {
            self.plugins.bind_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_u64(&lookup, "CLOUDCOST_METADATA_TIMEOUT_MS")? {
            self.plugins.metadata_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_u64(&lookup, "CLOUDCOST_DRY_RUN_TIMEOUT_MS")? {
            self.plugins.dry_run_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_u64(&lookup, "CLOUDCOST_RPC_TIMEOUT_MS")? {
            self.plugins.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_env_u64(&lookup, "CLOUDCOST_MAX_CONCURRENCY")? {
            self.plugins.max_concurrency = usize::try_from(n).map_err(|_| {
                Error::validation("CLOUDCOST_MAX_CONCURRENCY is out of range")
            })?;
        }
        if let Some(flag) = lookup("CLOUDCOST_SKIP_VERSION_CHECK") {
            self.plugins.skip_version_check = parse_flag(&flag);
        }
        if let Some(flag) = lookup("CLOUDCOST_STRICT_COMPATIBILITY") {
            self.plugins.strict_compatibility = parse_flag(&flag);
        }
        if let Some(level) = lookup("CLOUDCOST_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        Ok(())
    }

    /// Reject settings that would make the engine unusable.
    pub fn validate(&self) -> Result<()> {
        if self.plugins.max_concurrency == 0 {
            return Err(Error::validation("plugins.max_concurrency must be positive"));
        }
        let timeouts = [
            ("plugins.bind_timeout", self.plugins.bind_timeout),
            ("plugins.bind_poll_interval", self.plugins.bind_poll_interval),
            ("plugins.metadata_timeout", self.plugins.metadata_timeout),
            ("plugins.dry_run_timeout", self.plugins.dry_run_timeout),
            ("plugins.rpc_timeout", self.plugins.rpc_timeout),
        ];
        for (field, value) in timeouts {
            if value.is_zero() {
                return Err(Error::validation(format!("{} must be non-zero", field)));
            }
        }
        Ok(())
    }
}

fn parse_env_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::validation(format!("{} must be an integer, got {:?}", key, raw))),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Plugin lifecycle and dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// How long to wait for a freshly spawned plugin to accept connections.
    #[serde(with = "humantime_serde")]
    pub bind_timeout: Duration,

    /// Per-plugin bind timeouts for plugins with heavy startup (keyed by plugin name).
    #[serde(with = "duration_map")]
    pub bind_timeout_overrides: BTreeMap<String, Duration>,

    /// Interval between connection attempts while waiting for bind.
    #[serde(with = "humantime_serde")]
    pub bind_poll_interval: Duration,

    /// Timeout for the metadata (GetPluginInfo) call during negotiation.
    #[serde(with = "humantime_serde")]
    pub metadata_timeout: Duration,

    /// Timeout for capability-discovery (DryRun) calls.
    #[serde(with = "humantime_serde")]
    pub dry_run_timeout: Duration,

    /// Deadline for each cost RPC.
    #[serde(with = "humantime_serde")]
    pub rpc_timeout: Duration,

    /// Grace period for a plugin to exit after it is killed.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Upper bound on in-flight plugin calls across all plugins.
    pub max_concurrency: usize,

    /// Suppress compatibility warnings. The metadata call is still made.
    pub skip_version_check: bool,

    /// Refuse plugins whose protocol-spec major version differs.
    pub strict_compatibility: bool,
}

impl PluginConfig {
    /// Bind timeout for a given plugin, honouring overrides.
    pub fn bind_timeout_for(&self, plugin_name: &str) -> Duration {
        self.bind_timeout_overrides
            .get(plugin_name)
            .copied()
            .unwrap_or(self.bind_timeout)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        let mut bind_timeout_overrides = BTreeMap::new();
        // Loads an embedded pricing catalogue before binding.
        bind_timeout_overrides.insert("aws-public".to_string(), Duration::from_secs(30));
        Self {
            bind_timeout: Duration::from_secs(10),
            bind_timeout_overrides,
            bind_poll_interval: Duration::from_millis(100),
            metadata_timeout: Duration::from_secs(5),
            dry_run_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            max_concurrency: 8,
            skip_version_check: false,
            strict_compatibility: false,
        }
    }
}

mod duration_map {
    use humantime_serde::Serde;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let wrapped: BTreeMap<&str, Serde<Duration>> = map
            .iter()
            .map(|(k, v)| (k.as_str(), Serde::from(*v)))
            .collect();
        wrapped.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Duration>, D::Error> {
        let wrapped = BTreeMap::<String, Serde<Duration>>::deserialize(deserializer)?;
        Ok(wrapped
            .into_iter()
            .map(|(k, v)| (k, v.into_inner()))
            .collect())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// IPC transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Maximum concurrent TCP connections accepted by a plugin server.
    pub max_connections: usize,

    /// Read timeout in seconds per frame on the server side. Connections idle
    /// beyond this duration are dropped.
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame. Slow peers that cannot accept a
    /// frame within this window are dropped.
    pub write_timeout_secs: u64,

    /// Timeout in milliseconds for establishing the TCP connection to a plugin.
    pub connect_timeout_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 5 * 1024 * 1024,
            max_connections: 64,
            read_timeout_secs: 300,
            write_timeout_secs: 10,
            connect_timeout_ms: 1_000,
        }
    }
}

/// Provider-scoped defaults.
///
/// Each provider has its own section, so a value captured for one provider
/// cannot be consulted while resolving a resource of another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDefaults {
    #[serde(default)]
    pub aws: AwsDefaults,
}

/// Defaults applied to AWS resources only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsDefaults {
    /// Region used when an AWS resource carries neither a region nor an
    /// availability zone.
    #[serde(default)]
    pub region: Option<String>,
}

impl ProviderDefaults {
    /// Capture provider defaults from the process environment once.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Fill values left unset here from `fallback`; values already set win.
    pub fn fill_from(mut self, fallback: ProviderDefaults) -> Self {
        if self.aws.region.as_deref().map_or(true, |r| r.trim().is_empty()) {
            self.aws.region = fallback.aws.region;
        }
        self
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let region = lookup("AWS_REGION")
            .or_else(|| lookup("AWS_DEFAULT_REGION"))
            .filter(|r| !r.trim().is_empty());
        Self {
            aws: AwsDefaults { region },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_configured_region_wins_over_environment() {
        let env = ProviderDefaults::from_lookup(lookup_from(&[("AWS_REGION", "eu-west-1")]));

        let configured = ProviderDefaults {
            aws: AwsDefaults {
                region: Some("us-west-2".into()),
            },
        };
        assert_eq!(
            configured.fill_from(env.clone()).aws.region.as_deref(),
            Some("us-west-2")
        );

        let unset = ProviderDefaults::default().fill_from(env);
        assert_eq!(unset.aws.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.plugins.bind_timeout, Duration::from_secs(10));
        assert_eq!(config.plugins.metadata_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_heavy_plugin_gets_longer_bind_timeout() {
        let config = PluginConfig::default();
        assert_eq!(config.bind_timeout_for("aws-public"), Duration::from_secs(30));
        assert_eq!(config.bind_timeout_for("kubecost"), Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("CLOUDCOST_BIND_TIMEOUT_MS", "2500"),
                ("CLOUDCOST_MAX_CONCURRENCY", "2"),
                ("CLOUDCOST_SKIP_VERSION_CHECK", "true"),
            ]))
            .unwrap();
        assert_eq!(config.plugins.bind_timeout, Duration::from_millis(2500));
        assert_eq!(config.plugins.max_concurrency, 2);
        assert!(config.plugins.skip_version_check);
        assert!(!config.plugins.strict_compatibility);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup_from(&[("CLOUDCOST_RPC_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CLOUDCOST_RPC_TIMEOUT_MS"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.plugins.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"plugins": {"bind_timeout": "3s", "bind_timeout_overrides": {"slow": "1m"}}}"#,
        )
        .unwrap();
        assert_eq!(config.plugins.bind_timeout, Duration::from_secs(3));
        assert_eq!(config.plugins.bind_timeout_for("slow"), Duration::from_secs(60));
        assert_eq!(config.plugins.max_concurrency, 8);
        assert_eq!(config.ipc.max_frame_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_provider_defaults_prefer_aws_region() {
        let defaults = ProviderDefaults::from_lookup(lookup_from(&[
            ("AWS_REGION", "eu-west-1"),
            ("AWS_DEFAULT_REGION", "us-east-1"),
        ]));
        assert_eq!(defaults.aws.region.as_deref(), Some("eu-west-1"));

        let defaults =
            ProviderDefaults::from_lookup(lookup_from(&[("AWS_DEFAULT_REGION", "us-east-2")]));
        assert_eq!(defaults.aws.region.as_deref(), Some("us-east-2"));

        let defaults = ProviderDefaults::from_lookup(lookup_from(&[("AWS_REGION", " ")]));
        assert_eq!(defaults.aws.region, None);
    }
}
