//! Protocol-version negotiation with a freshly connected plugin.
//!
//! ```text
//! Uninitialized ──▶ Checking ──┬─▶ Compatible
//!                              ├─▶ MinorMismatch   (warn, proceed)
//!                              ├─▶ MajorMismatch   (warn loudly, proceed unless strict)
//!                              └─▶ LegacyUnknown   (no metadata, proceed)
//! ```
//!
//! Negotiation never fails a session except on cancellation or when
//! `strict_compatibility` refuses a major mismatch.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use super::protocol::{PluginMetadata, SPEC_VERSION};
use crate::types::{Error, PluginConfig, Result};

/// Terminal outcome of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatState {
    Compatible,
    MinorMismatch,
    MajorMismatch,
    LegacyUnknown,
}

impl fmt::Display for CompatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompatState::Compatible => "compatible",
            CompatState::MinorMismatch => "minor mismatch",
            CompatState::MajorMismatch => "major mismatch",
            CompatState::LegacyUnknown => "legacy (unknown version)",
        };
        f.write_str(s)
    }
}

/// Negotiation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Uninitialized,
    Checking,
    Settled(CompatState),
}

/// What was learned about a plugin's protocol version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compatibility {
    pub state: CompatState,
    pub core_spec_version: String,
    /// Spec version the plugin declared, if any.
    pub plugin_spec_version: Option<String>,
    #[serde(skip)]
    pub metadata: Option<PluginMetadata>,
    /// User-facing warning, unless suppressed by `skip_version_check`.
    pub warning: Option<String>,
}

/// Compare two spec versions by semver major/minor.
///
/// Returns `None` when either side does not parse. A leading `v` is accepted.
pub fn classify(core: &str, plugin: &str) -> Option<CompatState> {
    let core = parse_version(core)?;
    let plugin = parse_version(plugin)?;
    let state = if core.major != plugin.major {
        CompatState::MajorMismatch
    } else if core.minor != plugin.minor {
        CompatState::MinorMismatch
    } else {
        CompatState::Compatible
    };
    Some(state)
}

fn parse_version(raw: &str) -> Option<semver::Version> {
    let raw = raw.trim();
    semver::Version::parse(raw.strip_prefix('v').unwrap_or(raw)).ok()
}

/// Drives one plugin through the negotiation state machine.
#[derive(Debug)]
pub struct Negotiator<'a> {
    plugin: &'a str,
    config: &'a PluginConfig,
    core_spec_version: &'a str,
    state: NegotiationState,
}

impl<'a> Negotiator<'a> {
    pub fn new(plugin: &'a str, config: &'a PluginConfig) -> Self {
        Self {
            plugin,
            config,
            core_spec_version: SPEC_VERSION,
            state: NegotiationState::Uninitialized,
        }
    }

    /// Negotiate against a different core version.
    pub fn with_core_version(mut self, version: &'a str) -> Self {
        self.core_spec_version = version;
        self
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Fetch metadata with `fetch` (bounded by `metadata_timeout`) and settle.
    ///
    /// The metadata call is made even when `skip_version_check` is set; the
    /// flag only silences the outcome.
    pub async fn negotiate<F, Fut>(
        &mut self,
        fetch: F,
        cancel: &CancellationToken,
    ) -> Result<Compatibility>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PluginMetadata>>,
    {
        self.state = NegotiationState::Checking;
        let timeout = self.config.metadata_timeout;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::cancelled(format!("negotiation with {}", self.plugin)));
            }
            outcome = tokio::time::timeout(timeout, fetch()) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(format!("GetPluginInfo after {:?}", timeout))),
            },
        };

        let compat = match fetched {
            Ok(metadata) => self.settle_with(metadata)?,
            // A remote CANCELLED is the plugin's answer, not ours.
            Err(Error::Cancelled(msg)) if cancel.is_cancelled() => {
                return Err(Error::Cancelled(msg));
            }
            Err(e) if e.is_unimplemented() => {
                tracing::debug!(
                    "Plugin {} does not implement GetPluginInfo; treating as legacy",
                    self.plugin
                );
                self.legacy(None, None)
            }
            Err(e) => {
                let warning = format!(
                    "plugin {}: metadata call failed ({}); proceeding without version information",
                    self.plugin, e
                );
                if !self.config.skip_version_check {
                    tracing::warn!("{}", warning);
                }
                self.legacy(None, Some(warning))
            }
        };
        self.state = NegotiationState::Settled(compat.state);
        Ok(compat)
    }

    fn settle_with(&self, metadata: PluginMetadata) -> Result<Compatibility> {
        let declared = metadata.spec_version.trim().to_string();
        if declared.is_empty() {
            tracing::debug!("Plugin {} reports no spec version", self.plugin);
            return Ok(self.legacy(Some(metadata), None));
        }
        let Some(state) = classify(self.core_spec_version, &declared) else {
            let warning = format!(
                "plugin {} declares unparseable spec version {:?}; proceeding as legacy",
                self.plugin, declared
            );
            if !self.config.skip_version_check {
                tracing::warn!("{}", warning);
            }
            return Ok(Compatibility {
                state: CompatState::LegacyUnknown,
                core_spec_version: self.core_spec_version.to_string(),
                plugin_spec_version: Some(declared),
                metadata: Some(metadata),
                warning: self.visible(warning),
            });
        };

        let warning = match state {
            CompatState::Compatible => {
                tracing::debug!(
                    "Plugin {} spec {} is compatible with core {}",
                    self.plugin,
                    declared,
                    self.core_spec_version
                );
                None
            }
            CompatState::MinorMismatch => {
                let warning = format!(
                    "plugin {} was built against spec {}, core uses {}; unknown fields will be ignored",
                    self.plugin, declared, self.core_spec_version
                );
                if !self.config.skip_version_check {
                    tracing::warn!("{}", warning);
                }
                self.visible(warning)
            }
            CompatState::MajorMismatch => {
                let warning = format!(
                    "MAJOR protocol mismatch: plugin {} speaks spec {}, core speaks {}; results may be wrong, update the plugin",
                    self.plugin, declared, self.core_spec_version
                );
                if self.config.strict_compatibility && !self.config.skip_version_check {
                    tracing::error!("{}", warning);
                    return Err(Error::incompatible(warning));
                }
                if !self.config.skip_version_check {
                    tracing::warn!("{}", warning);
                }
                self.visible(warning)
            }
            CompatState::LegacyUnknown => None,
        };

        Ok(Compatibility {
            state,
            core_spec_version: self.core_spec_version.to_string(),
            plugin_spec_version: Some(declared),
            metadata: Some(metadata),
            warning,
        })
    }

    fn legacy(&self, metadata: Option<PluginMetadata>, warning: Option<String>) -> Compatibility {
        Compatibility {
            state: CompatState::LegacyUnknown,
            core_spec_version: self.core_spec_version.to_string(),
            plugin_spec_version: None,
            metadata,
            warning: warning.and_then(|w| self.visible(w)),
        }
    }

    fn visible(&self, warning: String) -> Option<String> {
        if self.config.skip_version_check {
            None
        } else {
            Some(warning)
        }
    }
}
