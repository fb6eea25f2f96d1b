//! Cost aggregation across every registered source.
//!
//! The engine runs one adapter pass per source over the resources that source
//! supports, then resolves a single row per input resource:
//!
//! ```text
//! projected: plugin answer → spec lookup → plugin placeholder → NO DATA
//! actual:    billing data (HIGH) → runtime estimate (MEDIUM/LOW) → placeholder
//! ```
//!
//! Rows keep input order. Per-resource failures are recorded as
//! [`ErrorDetail`]s; only an engine with nothing to ask fails as a whole.

pub mod estimator;
pub mod results;
pub mod summary;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{convert, ProtocolAdapter, TimeRange};
use crate::plugin::protocol::WireResource;
use crate::plugin::{CostSource, LaunchFailure, LaunchReport, PluginRegistry};
use crate::resource::ResourceDescriptor;
use crate::types::{Config, Error, ProviderDefaults, Result};
use crate::validation::validate_non_empty;

pub use estimator::{estimate, Estimate, EstimateError, IMPORTED_NOTE};
pub use results::{
    Confidence, CostResult, CostResultWithErrors, DryRunReport, ErrorDetail, ErrorKind,
    RecommendationBatch, ResourceRecommendation, DEFAULT_CURRENCY, HOURS_PER_MONTH,
};
pub use summary::{render_json, render_table, CostSummary, CurrencyTotals};

/// Source name on rows priced by the spec lookup.
pub const SPEC_SOURCE: &str = "spec";
/// Source name on rows produced by the runtime estimator.
pub const ESTIMATE_SOURCE: &str = "estimate";

/// Price found in a local pricing spec.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecPrice {
    pub monthly_cost: f64,
    pub currency: String,
    pub notes: String,
}

/// Local pricing-spec fallback. Implemented outside this crate.
#[cfg_attr(test, mockall::automock)]
pub trait SpecLookup: Send + Sync {
    fn lookup(&self, resource: &WireResource) -> Option<SpecPrice>;
}

/// Wall clock used for runtime estimates.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Aggregates cost across a registry of sources.
#[derive(Clone)]
pub struct CostEngine {
    registry: PluginRegistry,
    adapter: ProtocolAdapter,
    defaults: Arc<ProviderDefaults>,
    spec: Option<Arc<dyn SpecLookup>>,
    launch_failures: Vec<LaunchFailure>,
    warnings: Vec<String>,
    clock: Clock,
}

impl fmt::Debug for CostEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostEngine")
            .field("registry", &self.registry)
            .field("spec_lookup", &self.spec.is_some())
            .field("launch_failures", &self.launch_failures.len())
            .field("warnings", &self.warnings)
            .finish()
    }
}

/// One source's rows over a subset of the input batch.
struct Pass {
    /// Input index to row position; `None` where the source was not asked.
    positions: Vec<Option<usize>>,
    batch: CostResultWithErrors,
}

impl Pass {
    fn new(total: usize, indices: &[usize], batch: CostResultWithErrors) -> Self {
        let mut positions = vec![None; total];
        for (pos, &idx) in indices.iter().enumerate() {
            positions[idx] = Some(pos);
        }
        Self { positions, batch }
    }

    fn row_for(&self, idx: usize) -> Option<&CostResult> {
        self.positions
            .get(idx)
            .copied()
            .flatten()
            .and_then(|pos| self.batch.results.get(pos))
    }
}

impl CostEngine {
    pub fn new(registry: PluginRegistry, config: &Config, cancel: CancellationToken) -> Self {
        Self {
            registry,
            adapter: ProtocolAdapter::new(config, cancel),
            defaults: Arc::new(config.providers.clone()),
            spec: None,
            launch_failures: Vec::new(),
            warnings: Vec::new(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Engine over everything a [`LaunchReport`] brought up, carrying its
    /// failures and compatibility warnings into every batch.
    pub fn from_launch(report: &LaunchReport, config: &Config, cancel: CancellationToken) -> Self {
        Self::new(report.registry.clone(), config, cancel)
            .with_launch_failures(report.failures.clone())
            .with_warnings(report.warnings.clone())
    }

    pub fn with_spec_lookup(mut self, spec: Arc<dyn SpecLookup>) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn with_launch_failures(mut self, failures: Vec<LaunchFailure>) -> Self {
        self.launch_failures = failures;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Fails only when there is nothing at all to ask.
    fn ensure_ready(&self) -> Result<()> {
        if self.registry.is_empty() && self.launch_failures.is_empty() && self.spec.is_none() {
            return Err(Error::not_found(
                "no cost plugins are installed and no pricing spec is available",
            ));
        }
        Ok(())
    }

    fn empty_batch(&self, capacity: usize) -> CostResultWithErrors {
        CostResultWithErrors {
            results: Vec::with_capacity(capacity),
            errors: self.launch_failures.iter().map(ErrorDetail::launch).collect(),
            warnings: self.warnings.clone(),
        }
    }

    /// Projected monthly cost, one row per resource.
    pub async fn projected_cost(
        &self,
        resources: &[ResourceDescriptor],
    ) -> Result<CostResultWithErrors> {
        self.ensure_ready()?;
        let passes = self.projected_passes(resources, &all_indices(resources)).await;

        let mut batch = self.empty_batch(resources.len());
        for (idx, resource) in resources.iter().enumerate() {
            let row = match first_priced(&passes, idx) {
                Some(row) => row.clone(),
                None => match self.spec_row(resource) {
                    Some(row) => row,
                    None => first_placeholder(&passes, idx)
                        .cloned()
                        .unwrap_or_else(|| no_source(resource)),
                },
            };
            batch.results.push(row);
        }
        for pass in passes {
            batch.errors.extend(pass.batch.errors);
        }
        tracing::debug!(
            "Projected cost for {} resources with {} errors",
            batch.results.len(),
            batch.errors.len()
        );
        Ok(batch)
    }

    /// Actual cost over `range`, one row per resource.
    ///
    /// Resources without billing data are estimated from their creation
    /// timestamp at the projected hourly rate.
    pub async fn actual_cost(
        &self,
        resources: &[ResourceDescriptor],
        range: TimeRange,
    ) -> Result<CostResultWithErrors> {
        self.ensure_ready()?;
        let indices = all_indices(resources);
        let billing = join_all(self.registry.sources().iter().map(|source| {
            let subset = supported(source, resources, &indices);
            async move {
                let picked: Vec<ResourceDescriptor> =
                    subset.iter().map(|&i| resources[i].clone()).collect();
                let batch = self.adapter.actual_cost(source, &picked, range).await;
                Pass::new(resources.len(), &subset, batch)
            }
        }))
        .await;

        let unbilled: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&idx| first_priced(&billing, idx).is_none())
            .collect();
        let rates = self.projected_passes(resources, &unbilled).await;

        let now = (self.clock)();
        let mut batch = self.empty_batch(resources.len());
        for (idx, resource) in resources.iter().enumerate() {
            if let Some(row) = first_priced(&billing, idx) {
                batch.results.push(row.clone());
                continue;
            }
            let fallback = || {
                first_placeholder(&billing, idx)
                    .filter(|row| !row.notes.starts_with(results::NO_DATA_PREFIX))
                    .cloned()
                    .unwrap_or_else(|| no_source(resource))
            };
            let Some(rate) = self.hourly_rate(&rates, idx, resource) else {
                batch.results.push(fallback());
                continue;
            };
            let lifecycle = resource.lifecycle();
            match estimate(lifecycle.created_at, rate, lifecycle.external, now) {
                Ok(est) => batch
                    .results
                    .push(estimated_row(resource, rate, lifecycle.created_at, now, est)),
                Err(skip) => {
                    tracing::debug!("Skipping estimate for {}: {}", resource.id, skip);
                    batch.warnings.push(format!(
                        "skipped runtime estimate for {} {}: {}",
                        resource.resource_type, resource.id, skip
                    ));
                    batch.results.push(fallback());
                }
            }
        }
        for pass in billing {
            batch.errors.extend(pass.batch.errors);
        }
        // Rate lookup failures are warnings on an actual-cost batch.
        for detail in rates.iter().flat_map(|pass| &pass.batch.errors) {
            batch
                .warnings
                .push(format!("no projected rate for estimate: {}", detail));
        }
        Ok(batch)
    }

    /// Recommendations from every source, sorted by resource, plugin and id.
    pub async fn recommendations(
        &self,
        resources: &[ResourceDescriptor],
    ) -> Result<RecommendationBatch> {
        self.ensure_ready()?;
        let indices = all_indices(resources);
        let batches = join_all(self.registry.sources().iter().map(|source| {
            let picked: Vec<ResourceDescriptor> = supported(source, resources, &indices)
                .into_iter()
                .map(|i| resources[i].clone())
                .collect();
            async move { self.adapter.recommendations(source, &picked).await }
        }))
        .await;

        let mut merged = RecommendationBatch {
            errors: self.launch_failures.iter().map(ErrorDetail::launch).collect(),
            ..Default::default()
        };
        for batch in batches {
            merged.recommendations.extend(batch.recommendations);
            merged.errors.extend(batch.errors);
        }
        merged.recommendations.sort_by(|a, b| {
            (&a.resource_id, &a.plugin, &a.recommendation.id).cmp(&(
                &b.resource_id,
                &b.plugin,
                &b.recommendation.id,
            ))
        });
        Ok(merged)
    }

    /// Field support per source for `resource_type`, in registry order.
    pub async fn dry_run(&self, resource_type: &str) -> Result<Vec<DryRunReport>> {
        validate_non_empty(resource_type, "resource_type")?;
        self.ensure_ready()?;
        let provider = ResourceDescriptor::new(resource_type, "", "").provider();
        let sources = self.registry.sources_for(provider.as_str());
        let outcomes = join_all(
            sources
                .iter()
                .map(|source| self.adapter.dry_run(source, resource_type)),
        )
        .await;

        Ok(sources
            .iter()
            .zip(outcomes)
            .map(|(source, outcome)| match outcome {
                Ok(response) => DryRunReport {
                    plugin: source.name().to_string(),
                    fields: response.field_mappings,
                    configuration_valid: response.configuration_valid,
                    configuration_errors: response.configuration_errors,
                    error: None,
                },
                Err(e) => DryRunReport {
                    plugin: source.name().to_string(),
                    fields: Vec::new(),
                    configuration_valid: false,
                    configuration_errors: Vec::new(),
                    error: Some(e.to_string()),
                },
            })
            .collect())
    }

    async fn projected_passes(
        &self,
        resources: &[ResourceDescriptor],
        indices: &[usize],
    ) -> Vec<Pass> {
        if indices.is_empty() {
            return Vec::new();
        }
        join_all(self.registry.sources().iter().map(|source| {
            let subset = supported(source, resources, indices);
            async move {
                let picked: Vec<ResourceDescriptor> =
                    subset.iter().map(|&i| resources[i].clone()).collect();
                let batch = self.adapter.projected_cost(source, &picked).await;
                Pass::new(resources.len(), &subset, batch)
            }
        }))
        .await
    }

    fn spec_row(&self, resource: &ResourceDescriptor) -> Option<CostResult> {
        let spec = self.spec.as_ref()?;
        let price = spec.lookup(&convert::wire_resource(resource, &self.defaults))?;
        let mut row = CostResult::for_resource(resource, SPEC_SOURCE);
        if !price.currency.trim().is_empty() {
            row.currency = price.currency;
        }
        row.monthly_cost = price.monthly_cost;
        row.hourly_cost = price.monthly_cost / HOURS_PER_MONTH;
        row.notes = price.notes;
        Some(row)
    }

    fn hourly_rate(&self, rates: &[Pass], idx: usize, resource: &ResourceDescriptor) -> Option<f64> {
        first_priced(rates, idx)
            .map(|row| row.hourly_cost)
            .or_else(|| self.spec_row(resource).map(|row| row.hourly_cost))
    }
}

fn all_indices(resources: &[ResourceDescriptor]) -> Vec<usize> {
    (0..resources.len()).collect()
}

/// Indices (from `among`) of resources `source` should be asked about.
fn supported(
    source: &Arc<dyn CostSource>,
    resources: &[ResourceDescriptor],
    among: &[usize],
) -> Vec<usize> {
    among
        .iter()
        .copied()
        .filter(|&i| source.supports_provider(resources[i].provider().as_str()))
        .collect()
}

fn first_priced(passes: &[Pass], idx: usize) -> Option<&CostResult> {
    passes
        .iter()
        .filter_map(|pass| pass.row_for(idx))
        .find(|row| !row.is_placeholder())
}

fn first_placeholder(passes: &[Pass], idx: usize) -> Option<&CostResult> {
    passes.iter().find_map(|pass| pass.row_for(idx))
}

fn no_source(resource: &ResourceDescriptor) -> CostResult {
    CostResult::placeholder(
        resource,
        "",
        results::NO_DATA_PREFIX,
        format!(
            "no plugin or pricing spec covers {} {}",
            resource.provider(),
            resource.resource_type
        ),
    )
}

fn estimated_row(
    resource: &ResourceDescriptor,
    rate: f64,
    created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    est: Estimate,
) -> CostResult {
    let mut row = CostResult::for_resource(resource, ESTIMATE_SOURCE);
    row.hourly_cost = rate;
    row.monthly_cost = rate * HOURS_PER_MONTH;
    row.total_cost = est.total_cost;
    row.runtime_hours = Some(est.runtime_hours);
    row.start = created_at;
    row.end = Some(now);
    row.confidence = Some(est.confidence);
    row.notes = est.notes;
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::protocol::{
        ActualCostEntry, ActualCostResponse, DryRunResponse, FieldMapping, FieldSupportStatus,
        Recommendation, RecommendationsResponse,
    };
    use crate::testing::{monthly, StubSource};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn ec2(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("aws:ec2/instance:Instance", id, "aws")
            .with_property("instanceType", "t3.micro")
            .with_property("region", "us-east-1")
    }

    fn created(resource: ResourceDescriptor, hours_ago: i64, external: bool) -> ResourceDescriptor {
        resource
            .with_property("created", (now() - Duration::hours(hours_ago)).to_rfc3339())
            .with_property("external", external)
    }

    fn engine(sources: Vec<StubSource>) -> CostEngine {
        let registry = sources.into_iter().fold(PluginRegistry::new(), |reg, s| {
            reg.with(Arc::new(s) as Arc<dyn CostSource>)
        });
        CostEngine::new(registry, &Config::default(), CancellationToken::new())
            .with_clock(Arc::new(now))
    }

    fn range() -> TimeRange {
        TimeRange::between(now() - Duration::days(1), now())
    }

    #[tokio::test]
    async fn test_empty_engine_is_a_top_level_error() {
        let err = engine(vec![]).projected_cost(&[ec2("a")]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_first_priced_answer_wins() {
        let failing = StubSource::new("a-failing")
            .with_projected_fn(|_| Err(Error::from_wire("INTERNAL", "down")));
        let pricing = StubSource::new("b-pricing").with_projected(monthly(73.0));
        let batch = engine(vec![failing, pricing])
            .projected_cost(&[ec2("web")])
            .await
            .unwrap();
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.results[0].source, "b-pricing");
        assert_eq!(batch.results[0].monthly_cost, 73.0);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].plugin, "a-failing");
    }

    #[tokio::test]
    async fn test_spec_lookup_fills_in_for_unsupported_provider() {
        let aws_only = StubSource::new("aws-public")
            .with_spec_version("0.5.0", &["aws"])
            .with_projected(monthly(10.0));
        let calls = aws_only.calls();
        let mut spec = MockSpecLookup::new();
        spec.expect_lookup()
            .withf(|wire| wire.provider == "azure")
            .returning(|_| {
                Some(SpecPrice {
                    monthly_cost: 36.5,
                    currency: String::new(),
                    notes: "from local spec".into(),
                })
            });
        let vm = ResourceDescriptor::new("azure-native:compute:VirtualMachine", "vm", "azure")
            .with_property("vmSize", "Standard_B2s")
            .with_property("location", "eastus");

        let batch = engine(vec![aws_only])
            .with_spec_lookup(Arc::new(spec))
            .projected_cost(&[ec2("web"), vm])
            .await
            .unwrap();

        assert_eq!(calls.projected(), 1);
        assert_eq!(batch.results[0].source, "aws-public");
        assert_eq!(batch.results[1].source, SPEC_SOURCE);
        assert_eq!(batch.results[1].currency, "USD");
        assert!((batch.results[1].hourly_cost - 0.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unpriced_resource_gets_no_data_row() {
        let aws_only = StubSource::new("aws-public").with_spec_version("0.5.0", &["aws"]);
        let gcp = ResourceDescriptor::new("gcp:compute/instance:Instance", "g", "gcp");
        let batch = engine(vec![aws_only]).projected_cost(&[gcp]).await.unwrap();
        assert_eq!(batch.results.len(), 1);
        assert!(batch.results[0].notes.starts_with("NO DATA: "));
        assert!(!batch.has_errors());
    }

    #[tokio::test]
    async fn test_billing_data_is_high_confidence() {
        let billing = StubSource::new("kubecost").with_actual(ActualCostResponse {
            results: vec![ActualCostEntry {
                cost: 2.4,
                source: "compute".into(),
                ..Default::default()
            }],
            ..Default::default()
        });
        let batch = engine(vec![billing])
            .actual_cost(&[created(ec2("web"), 48, true)], range())
            .await
            .unwrap();
        assert_eq!(batch.results[0].confidence, Some(Confidence::High));
        assert_eq!(batch.results[0].total_cost, 2.4);
    }

    #[tokio::test]
    async fn test_estimator_fallback_confidence() {
        let projected_only = StubSource::new("aws-public").with_projected(monthly(73.0));
        let resources = [created(ec2("native"), 48, false), created(ec2("imported"), 48, true)];
        let batch = engine(vec![projected_only])
            .actual_cost(&resources, range())
            .await
            .unwrap();

        let native = &batch.results[0];
        assert_eq!(native.source, ESTIMATE_SOURCE);
        assert_eq!(native.confidence, Some(Confidence::Medium));
        assert!((native.total_cost - 4.80).abs() < 1e-9);
        assert!(native.notes.is_empty());

        let imported = &batch.results[1];
        assert_eq!(imported.confidence, Some(Confidence::Low));
        assert!(imported.notes.contains("Imported resource"));
        assert!((imported.total_cost - 4.80).abs() < 1e-9);

        // A source without billing support is not an error.
        assert!(!batch.has_errors());
        assert!(batch.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_one_error_per_failed_resource_per_plugin() {
        let down = StubSource::new("aws-public")
            .with_actual_fn(|_| Err(Error::from_wire("INTERNAL", "billing api down")))
            .with_projected_fn(|_| Err(Error::from_wire("INTERNAL", "pricing api down")));
        let batch = engine(vec![down])
            .actual_cost(&[created(ec2("web"), 48, false)], range())
            .await
            .unwrap();

        assert_eq!(batch.results.len(), 1);
        assert!(batch.results[0].is_plugin_failure());
        assert_eq!(batch.errors.len(), 1);
        assert!(batch.errors[0].error.to_string().contains("billing api down"));
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].contains("pricing api down"));
        assert!(!batch.error_summary().contains("pricing api down"));
    }

    #[test]
    fn test_pass_rows_follow_subset_positions() {
        let resources = [ec2("a"), ec2("b"), ec2("c")];
        let batch = CostResultWithErrors {
            results: vec![
                CostResult::for_resource(&resources[0], "p"),
                CostResult::for_resource(&resources[2], "p"),
            ],
            ..Default::default()
        };
        let pass = Pass::new(resources.len(), &[0, 2], batch);
        assert_eq!(pass.row_for(0).map(|r| r.resource_id.as_str()), Some("a"));
        assert!(pass.row_for(1).is_none());
        assert_eq!(pass.row_for(2).map(|r| r.resource_id.as_str()), Some("c"));
        assert!(pass.row_for(7).is_none());
    }

    #[tokio::test]
    async fn test_missing_timestamp_is_a_warning_not_an_error() {
        let projected_only = StubSource::new("aws-public")
            .with_projected(monthly(73.0))
            .with_actual(ActualCostResponse::default());
        let batch = engine(vec![projected_only])
            .actual_cost(&[ec2("untracked")], range())
            .await
            .unwrap();
        assert_eq!(batch.results.len(), 1);
        assert!(batch.results[0].notes.starts_with("NO DATA: "));
        assert_eq!(batch.results[0].confidence, None);
        assert!(!batch.has_errors());
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].contains("creation timestamp is not set"));
    }

    #[tokio::test]
    async fn test_launch_failures_lead_the_error_list() {
        let failure = LaunchFailure {
            plugin: "never-binds".into(),
            path: PathBuf::from("/opt/plugins/cloudcost-plugin-never-binds"),
            error: Arc::new(Error::launch("bind timeout")),
        };
        let mut spec = MockSpecLookup::new();
        spec.expect_lookup().returning(|_| {
            Some(SpecPrice {
                monthly_cost: 73.0,
                currency: "USD".into(),
                notes: String::new(),
            })
        });
        let batch = CostEngine::new(PluginRegistry::new(), &Config::default(), CancellationToken::new())
            .with_launch_failures(vec![failure])
            .with_spec_lookup(Arc::new(spec))
            .with_clock(Arc::new(now))
            .actual_cost(&[created(ec2("web"), 10, false)], range())
            .await
            .unwrap();
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].kind, ErrorKind::Launch);
        assert_eq!(batch.results[0].confidence, Some(Confidence::Medium));
        assert!((batch.results[0].total_cost - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recommendations_are_sorted() {
        let rec = |id: &str| Recommendation {
            id: id.into(),
            action_type: "RIGHTSIZE".into(),
            estimated_savings: 1.0,
            ..Default::default()
        };
        let a = StubSource::new("zeta").with_recommendations(RecommendationsResponse {
            recommendations: vec![rec("r2"), rec("r1")],
            ..Default::default()
        });
        let b = StubSource::new("alpha").with_recommendations(RecommendationsResponse {
            recommendations: vec![rec("r9")],
            ..Default::default()
        });
        let batch = engine(vec![a, b])
            .recommendations(&[ec2("web"), ec2("api")])
            .await
            .unwrap();
        let keys: Vec<(String, String, String)> = batch
            .recommendations
            .iter()
            .map(|r| (r.resource_id.clone(), r.plugin.clone(), r.recommendation.id.clone()))
            .collect();
        assert_eq!(keys[0], ("api".into(), "alpha".into(), "r9".into()));
        assert_eq!(keys[1], ("api".into(), "zeta".into(), "r1".into()));
        assert_eq!(keys.len(), 6);
    }

    #[tokio::test]
    async fn test_dry_run_reports_per_plugin() {
        let capable = StubSource::new("aws-public").with_dry_run(DryRunResponse {
            field_mappings: vec![FieldMapping {
                field_name: "cost_per_month".into(),
                support_status: FieldSupportStatus::Supported,
                ..Default::default()
            }],
            configuration_valid: true,
            ..Default::default()
        });
        let legacy = StubSource::new("legacy");
        let reports = engine(vec![capable, legacy])
            .dry_run("aws:ec2/instance:Instance")
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].plugin, "aws-public");
        assert_eq!(reports[0].fields.len(), 1);
        assert!(reports[1].error.as_deref().unwrap_or_default().contains("not implemented"));

        let err = engine(vec![]).dry_run("  ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
