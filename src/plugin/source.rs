//! The cost-source abstraction every plugin is driven through.

use async_trait::async_trait;

use super::protocol::{
    ActualCostRequest, ActualCostResponse, DryRunRequest, DryRunResponse, PluginMetadata,
    ProjectedCostRequest, ProjectedCostResponse, RecommendationsRequest, RecommendationsResponse,
};
use crate::types::Result;

/// A source of cost data.
///
/// Implemented by [`PluginClient`](super::PluginClient) over RPC and by
/// in-process sources hosted with [`PluginServer`](crate::ipc::PluginServer).
/// Methods a source does not support return [`Error::Unimplemented`](crate::Error::Unimplemented).
#[async_trait]
pub trait CostSource: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Metadata captured at negotiation. `None` for legacy plugins.
    fn metadata(&self) -> Option<PluginMetadata>;

    /// Whether this source should be asked about a provider.
    fn supports_provider(&self, provider: &str) -> bool {
        self.metadata()
            .map_or(true, |meta| meta.supports_provider(provider))
    }

    async fn projected_cost(&self, request: ProjectedCostRequest) -> Result<ProjectedCostResponse>;

    async fn actual_cost(&self, request: ActualCostRequest) -> Result<ActualCostResponse>;

    async fn recommendations(
        &self,
        request: RecommendationsRequest,
    ) -> Result<RecommendationsResponse>;

    async fn dry_run(&self, request: DryRunRequest) -> Result<DryRunResponse>;
}
