//! Reference cost plugin: prices every resource at one flat monthly rate.
//!
//! Launched by the core with `--port=N`. The rate comes from
//! `CLOUDCOST_FLATRATE_MONTHLY` (default 10.0 USD).

use async_trait::async_trait;
use std::sync::Arc;

use cloudcost_core::ipc::{resolve_port, PluginServer, PORT_ENV};
use cloudcost_core::plugin::protocol::{
    ActualCostRequest, ActualCostResponse, DryRunRequest, DryRunResponse, FieldMapping,
    FieldSupportStatus, PluginMetadata, ProjectedCostRequest, ProjectedCostResponse,
    RecommendationsRequest, RecommendationsResponse, SPEC_VERSION,
};
use cloudcost_core::plugin::CostSource;
use cloudcost_core::{Config, Error, Result};

const RATE_ENV: &str = "CLOUDCOST_FLATRATE_MONTHLY";

#[derive(Debug)]
struct FlatRate {
    monthly: f64,
}

#[async_trait]
impl CostSource for FlatRate {
    fn name(&self) -> &str {
        "flatrate"
    }

    fn metadata(&self) -> Option<PluginMetadata> {
        Some(PluginMetadata {
            name: "flatrate".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            spec_version: SPEC_VERSION.into(),
            ..Default::default()
        })
    }

    async fn projected_cost(&self, request: ProjectedCostRequest) -> Result<ProjectedCostResponse> {
        let utilization = request.utilization.unwrap_or(1.0);
        Ok(ProjectedCostResponse {
            unit_price: self.monthly / cloudcost_core::engine::HOURS_PER_MONTH,
            currency: "USD".into(),
            cost_per_month: self.monthly * utilization,
            billing_detail: format!("flat rate for {}", request.resource.sku),
            ..Default::default()
        })
    }

    async fn actual_cost(&self, _request: ActualCostRequest) -> Result<ActualCostResponse> {
        Err(Error::unimplemented("flatrate has no billing data"))
    }

    async fn recommendations(
        &self,
        _request: RecommendationsRequest,
    ) -> Result<RecommendationsResponse> {
        Ok(RecommendationsResponse::default())
    }

    async fn dry_run(&self, _request: DryRunRequest) -> Result<DryRunResponse> {
        Ok(DryRunResponse {
            field_mappings: vec![FieldMapping {
                field_name: "cost_per_month".into(),
                support_status: FieldSupportStatus::Supported,
                expected_type: "double".into(),
                ..Default::default()
            }],
            configuration_valid: true,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    cloudcost_core::observability::init_tracing();

    let port = resolve_port(std::env::args(), std::env::var(PORT_ENV).ok())?;
    let monthly = match std::env::var(RATE_ENV) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|_| Error::validation(format!("{} must be a number, got {:?}", RATE_ENV, raw)))?,
        Err(_) => 10.0,
    };

    let server = Arc::new(PluginServer::new(
        Arc::new(FlatRate { monthly }),
        Config::default().ipc,
    ));
    let on_signal = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.shutdown();
        }
    });

    server.serve_port(port).await?;
    Ok(())
}
