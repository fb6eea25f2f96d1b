//! Launches a set of plugin executables into a registry.

use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::client::PluginClient;
use super::compat::Compatibility;
use super::registry::PluginRegistry;
use super::supervisor::{PluginProcess, Supervisor};
use crate::types::{Config, Error, PluginName};

/// A plugin that could not be brought up.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchFailure {
    pub plugin: String,
    pub path: PathBuf,
    #[serde(serialize_with = "crate::engine::results::serialize_error")]
    pub error: Arc<Error>,
}

/// A live, negotiated plugin session.
#[derive(Debug)]
pub struct PluginSession {
    pub process: PluginProcess,
    pub client: Arc<PluginClient>,
}

/// Outcome of [`PluginHost::launch_all`].
#[derive(Debug)]
pub struct LaunchReport {
    pub host: PluginHost,
    pub registry: PluginRegistry,
    pub failures: Vec<LaunchFailure>,
    /// Compatibility warnings gathered during negotiation.
    pub warnings: Vec<String>,
}

/// Owns the supervisor and every live session.
#[derive(Debug)]
pub struct PluginHost {
    supervisor: Supervisor,
    sessions: Vec<PluginSession>,
}

impl PluginHost {
    /// Launch and negotiate every plugin concurrently.
    ///
    /// A plugin that fails to start, bind, or negotiate is recorded as a
    /// [`LaunchFailure`]; the others still come up.
    pub async fn launch_all(
        paths: &[PathBuf],
        config: &Config,
        cancel: &CancellationToken,
    ) -> LaunchReport {
        let supervisor = Supervisor::new(config.plugins.clone());
        let outcomes = join_all(
            paths
                .iter()
                .map(|path| launch_one(&supervisor, path, config, cancel)),
        )
        .await;

        let mut sessions = Vec::new();
        let mut registry = PluginRegistry::new();
        let mut failures = Vec::new();
        let mut warnings = Vec::new();
        for (path, outcome) in paths.iter().zip(outcomes) {
            match outcome {
                Ok(session) => {
                    if let Some(warning) = &session.client.compatibility().warning {
                        warnings.push(warning.clone());
                    }
                    registry.register(session.client.clone());
                    sessions.push(session);
                }
                Err(error) => {
                    let plugin = PluginName::from_executable(path)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|_| path.display().to_string());
                    tracing::warn!("Plugin {} unavailable: {}", plugin, error);
                    failures.push(LaunchFailure {
                        plugin,
                        path: path.clone(),
                        error: Arc::new(error),
                    });
                }
            }
        }
        failures.sort_by(|a, b| a.plugin.cmp(&b.plugin));

        LaunchReport {
            host: PluginHost {
                supervisor,
                sessions,
            },
            registry,
            failures,
            warnings,
        }
    }

    pub fn sessions(&self) -> &[PluginSession] {
        &self.sessions
    }

    /// Negotiation outcome per plugin name.
    pub fn compatibility(&self) -> Vec<(&str, &Compatibility)> {
        self.sessions
            .iter()
            .map(|s| (s.process.name.as_str(), s.client.compatibility()))
            .collect()
    }

    /// Cancel in-flight calls and terminate every plugin process.
    pub async fn shutdown_all(&self) {
        for session in &self.sessions {
            session.client.cancel();
        }
        self.supervisor.shutdown_all().await;
    }
}

async fn launch_one(
    supervisor: &Supervisor,
    path: &Path,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<PluginSession, Error> {
    let (process, stream) = supervisor.launch(path, cancel).await?;
    match PluginClient::from_stream(process.name.clone(), stream, config, cancel).await {
        Ok(client) => Ok(PluginSession {
            process,
            client: Arc::new(client),
        }),
        Err(e) => {
            supervisor.shutdown(&process.session).await;
            Err(e)
        }
    }
}
