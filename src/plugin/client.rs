//! [`CostSource`] implementation backed by a plugin's RPC endpoint.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::compat::{Compatibility, Negotiator};
use super::protocol::{
    methods, ActualCostRequest, ActualCostResponse, DryRunRequest, DryRunResponse, PluginMetadata,
    ProjectedCostRequest, ProjectedCostResponse, RecommendationsRequest, RecommendationsResponse,
};
use super::source::CostSource;
use crate::ipc::RpcClient;
use crate::types::{Config, PluginConfig, PluginName, Result};

/// Typed client for one negotiated plugin session.
#[derive(Debug)]
pub struct PluginClient {
    name: PluginName,
    rpc: RpcClient,
    compat: Compatibility,
    config: PluginConfig,
    cancel: CancellationToken,
}

impl PluginClient {
    /// Connect to a plugin listening on `addr` and negotiate.
    pub async fn connect(
        name: PluginName,
        addr: SocketAddr,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let rpc = RpcClient::connect(addr, &config.ipc).await?;
        Self::negotiate(name, rpc, config, cancel).await
    }

    /// Adopt a connection opened by the supervisor and negotiate.
    pub async fn from_stream(
        name: PluginName,
        stream: TcpStream,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        stream.set_nodelay(true)?;
        let rpc = RpcClient::from_stream(stream, &config.ipc);
        Self::negotiate(name, rpc, config, cancel).await
    }

    async fn negotiate(
        name: PluginName,
        rpc: RpcClient,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let plugins = &config.plugins;
        let empty = serde_json::json!({});
        let compat = Negotiator::new(name.as_str(), plugins)
            .negotiate(
                || {
                    rpc.call::<_, PluginMetadata>(
                        methods::GET_PLUGIN_INFO,
                        &empty,
                        plugins.metadata_timeout,
                        cancel,
                    )
                },
                cancel,
            )
            .await?;
        tracing::info!(
            "Plugin {} negotiated: {} (core {}, plugin {})",
            name,
            compat.state,
            compat.core_spec_version,
            compat.plugin_spec_version.as_deref().unwrap_or("unknown"),
        );
        Ok(Self {
            name,
            rpc,
            compat,
            config: plugins.clone(),
            cancel: cancel.child_token(),
        })
    }

    pub fn compatibility(&self) -> &Compatibility {
        &self.compat
    }

    /// Abort every in-flight and future call on this session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl CostSource for PluginClient {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn metadata(&self) -> Option<PluginMetadata> {
        self.compat.metadata.clone()
    }

    async fn projected_cost(&self, request: ProjectedCostRequest) -> Result<ProjectedCostResponse> {
        self.rpc
            .call(
                methods::GET_PROJECTED_COST,
                &request,
                self.config.rpc_timeout,
                &self.cancel,
            )
            .await
    }

    async fn actual_cost(&self, request: ActualCostRequest) -> Result<ActualCostResponse> {
        self.rpc
            .call(
                methods::GET_ACTUAL_COST,
                &request,
                self.config.rpc_timeout,
                &self.cancel,
            )
            .await
    }

    async fn recommendations(
        &self,
        request: RecommendationsRequest,
    ) -> Result<RecommendationsResponse> {
        self.rpc
            .call(
                methods::GET_RECOMMENDATIONS,
                &request,
                self.config.rpc_timeout,
                &self.cancel,
            )
            .await
    }

    async fn dry_run(&self, request: DryRunRequest) -> Result<DryRunResponse> {
        self.rpc
            .call(
                methods::DRY_RUN,
                &request,
                self.config.dry_run_timeout,
                &self.cancel,
            )
            .await
    }
}
