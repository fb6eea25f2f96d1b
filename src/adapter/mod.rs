//! Protocol adapter: one plugin's pass over a batch of resources.
//!
//! Per resource the adapter builds the wire request, validates it locally,
//! calls the plugin under the shared concurrency limit, and converts the
//! answer. Every failure becomes a zero-cost placeholder row plus an
//! [`ErrorDetail`]; a pass always yields exactly one row per input resource,
//! in input order.

pub mod convert;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::engine::results::{
    CostResult, CostResultWithErrors, ErrorDetail, ErrorKind, RecommendationBatch,
    ResourceRecommendation, ERROR_PREFIX, NO_DATA_PREFIX, VALIDATION_PREFIX,
};
use crate::plugin::protocol::{DryRunRequest, DryRunResponse, Recommendation};
use crate::plugin::CostSource;
use crate::resource::ResourceDescriptor;
use crate::types::{Config, Error, ProviderDefaults, Result};
use crate::validation::{
    validate_actual, validate_dry_run, validate_projected, validate_recommendations,
    ValidationError,
};

pub use convert::TimeRange;

type Row = (CostResult, Option<ErrorDetail>);

/// Dispatches batches to a single cost source.
#[derive(Debug, Clone)]
pub struct ProtocolAdapter {
    defaults: Arc<ProviderDefaults>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ProtocolAdapter {
    pub fn new(config: &Config, cancel: CancellationToken) -> Self {
        Self {
            defaults: Arc::new(config.providers.clone()),
            limiter: Arc::new(Semaphore::new(config.plugins.max_concurrency)),
            cancel,
        }
    }

    /// Projected cost for every resource.
    pub async fn projected_cost(
        &self,
        source: &Arc<dyn CostSource>,
        resources: &[ResourceDescriptor],
    ) -> CostResultWithErrors {
        let slots = self
            .run_pool(resources, |resource| {
                let (source, defaults, limiter, cancel) = self.task_context(source);
                async move {
                    let plugin = source.name().to_string();
                    let request = convert::projected_request(&resource, &defaults);
                    if let Err(invalid) = validate_projected(&request) {
                        return rejected(&resource, &plugin, invalid);
                    }
                    match guarded(limiter, cancel, source.projected_cost(request)).await {
                        Ok(response) => (convert::projected_result(&resource, &plugin, response), None),
                        Err(e) => failed(&resource, &plugin, e),
                    }
                }
            })
            .await;
        assemble(resources, source.name(), slots)
    }

    /// Billing-derived cost over `range` for every resource. A source
    /// without billing support yields `NO DATA` rows and no errors.
    pub async fn actual_cost(
        &self,
        source: &Arc<dyn CostSource>,
        resources: &[ResourceDescriptor],
        range: TimeRange,
    ) -> CostResultWithErrors {
        let slots = self
            .run_pool(resources, |resource| {
                let (source, defaults, limiter, cancel) = self.task_context(source);
                async move {
                    let plugin = source.name().to_string();
                    let request = convert::actual_request(&resource, &defaults, range);
                    if let Err(invalid) = validate_actual(&request) {
                        return rejected(&resource, &plugin, invalid);
                    }
                    match guarded(limiter, cancel, source.actual_cost(request)).await {
                        Ok(response) => {
                            match convert::actual_result(&resource, &plugin, response, range) {
                                Some(result) => (result, None),
                                None => (
                                    CostResult::placeholder(
                                        &resource,
                                        &plugin,
                                        NO_DATA_PREFIX,
                                        format!("{} returned no billing data", plugin),
                                    ),
                                    None,
                                ),
                            }
                        }
                        Err(e) if e.is_unimplemented() => {
                            tracing::debug!("{} does not provide billing data", plugin);
                            (
                                CostResult::placeholder(
                                    &resource,
                                    &plugin,
                                    NO_DATA_PREFIX,
                                    format!("{} does not report billing data", plugin),
                                ),
                                None,
                            )
                        }
                        Err(e) => failed(&resource, &plugin, e),
                    }
                }
            })
            .await;
        assemble(resources, source.name(), slots)
    }

    /// Recommendations for every resource. Sources that do not implement
    /// recommendations contribute nothing and record no error.
    pub async fn recommendations(
        &self,
        source: &Arc<dyn CostSource>,
        resources: &[ResourceDescriptor],
    ) -> RecommendationBatch {
        let slots = self
            .run_pool(resources, |resource| {
                let (source, defaults, limiter, cancel) = self.task_context(source);
                async move {
                    let plugin = source.name().to_string();
                    let request = convert::recommendations_request(&resource, &defaults);
                    if let Err(invalid) = validate_recommendations(&request) {
                        return Err(ErrorDetail::new(
                            ErrorKind::Validation,
                            &resource,
                            plugin,
                            invalid.into(),
                        ));
                    }
                    match guarded(limiter, cancel, source.recommendations(request)).await {
                        Ok(response) => Ok(attach(&resource, &plugin, response.recommendations)),
                        Err(e) if e.is_unimplemented() => {
                            tracing::debug!("{} does not provide recommendations", plugin);
                            Ok(Vec::new())
                        }
                        Err(e) => Err(ErrorDetail::new(ErrorKind::Plugin, &resource, plugin, e)),
                    }
                }
            })
            .await;

        let mut batch = RecommendationBatch::default();
        for (resource, slot) in resources.iter().zip(slots) {
            match slot {
                Some(Ok(items)) => batch.recommendations.extend(items),
                Some(Err(detail)) => batch.errors.push(detail),
                None => batch.errors.push(aborted(resource, source.name())),
            }
        }
        batch
    }

    /// Capability discovery for one resource type.
    pub async fn dry_run(
        &self,
        source: &Arc<dyn CostSource>,
        resource_type: &str,
    ) -> Result<DryRunResponse> {
        let request = DryRunRequest {
            resource_type: resource_type.to_string(),
        };
        validate_dry_run(&request)?;
        guarded(
            Arc::clone(&self.limiter),
            self.cancel.clone(),
            source.dry_run(request),
        )
        .await
    }

    fn task_context(
        &self,
        source: &Arc<dyn CostSource>,
    ) -> (
        Arc<dyn CostSource>,
        Arc<ProviderDefaults>,
        Arc<Semaphore>,
        CancellationToken,
    ) {
        (
            Arc::clone(source),
            Arc::clone(&self.defaults),
            Arc::clone(&self.limiter),
            self.cancel.clone(),
        )
    }

    /// Run one task per resource and collect outputs by input index.
    ///
    /// A slot is `None` only when its task panicked.
    async fn run_pool<T, F, Fut>(&self, resources: &[ResourceDescriptor], task: F) -> Vec<Option<T>>
    where
        F: Fn(ResourceDescriptor) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let slots: Arc<Mutex<Vec<Option<T>>>> =
            Arc::new(Mutex::new((0..resources.len()).map(|_| None).collect()));
        let mut set = JoinSet::new();
        for (idx, resource) in resources.iter().cloned().enumerate() {
            let work = task(resource);
            let slots = Arc::clone(&slots);
            set.spawn(async move {
                let output = work.await;
                slots.lock().await[idx] = Some(output);
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Resource task aborted: {}", e);
            }
        }
        let mut guard = slots.lock().await;
        std::mem::take(&mut *guard)
    }
}

/// Await a permit, then the call, both abandoned on cancellation.
async fn guarded<T, Fut>(limiter: Arc<Semaphore>, cancel: CancellationToken, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::cancelled("batch cancelled")),
        permit = limiter.acquire_owned() => {
            permit.map_err(|_| Error::internal("worker pool closed"))?
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled("batch cancelled")),
        result = call => result,
    }
}

fn rejected(resource: &ResourceDescriptor, plugin: &str, invalid: ValidationError) -> Row {
    tracing::debug!(
        "Rejected {} {} before calling {}: {}",
        resource.resource_type,
        resource.id,
        plugin,
        invalid
    );
    let placeholder = CostResult::placeholder(resource, plugin, VALIDATION_PREFIX, &invalid);
    let detail = ErrorDetail::new(ErrorKind::Validation, resource, plugin, invalid.into());
    (placeholder, Some(detail))
}

fn failed(resource: &ResourceDescriptor, plugin: &str, error: Error) -> Row {
    tracing::debug!(
        "{} failed for {} {}: {}",
        plugin,
        resource.resource_type,
        resource.id,
        error
    );
    let placeholder = CostResult::placeholder(resource, plugin, ERROR_PREFIX, &error);
    let detail = ErrorDetail::new(ErrorKind::Plugin, resource, plugin, error);
    (placeholder, Some(detail))
}

fn aborted(resource: &ResourceDescriptor, plugin: &str) -> ErrorDetail {
    ErrorDetail::new(
        ErrorKind::Plugin,
        resource,
        plugin,
        Error::internal("resource task aborted"),
    )
}

fn attach(
    resource: &ResourceDescriptor,
    plugin: &str,
    recommendations: Vec<Recommendation>,
) -> Vec<ResourceRecommendation> {
    recommendations
        .into_iter()
        .map(|recommendation| ResourceRecommendation {
            resource_type: resource.resource_type.clone(),
            resource_id: resource.id.clone(),
            plugin: plugin.to_string(),
            recommendation,
        })
        .collect()
}

fn assemble(
    resources: &[ResourceDescriptor],
    plugin: &str,
    slots: Vec<Option<Row>>,
) -> CostResultWithErrors {
    let mut batch = CostResultWithErrors {
        results: Vec::with_capacity(resources.len()),
        ..Default::default()
    };
    for (resource, slot) in resources.iter().zip(slots) {
        let (result, error) = match slot {
            Some(row) => row,
            None => (
                CostResult::placeholder(resource, plugin, ERROR_PREFIX, "resource task aborted"),
                Some(aborted(resource, plugin)),
            ),
        };
        batch.results.push(result);
        batch.errors.extend(error);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::protocol::RecommendationsResponse;
    use crate::testing::{monthly, StubSource};
    use std::time::Duration;

    fn ec2(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("aws:ec2/instance:Instance", id, "aws")
            .with_property("instanceType", "t3.micro")
            .with_property("region", "us-east-1")
    }

    fn adapter(max_concurrency: usize) -> ProtocolAdapter {
        let mut config = Config::default();
        config.plugins.max_concurrency = max_concurrency;
        ProtocolAdapter::new(&config, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_invalid_resource_is_never_sent() {
        let stub = StubSource::new("aws").with_projected(monthly(7.3));
        let calls = stub.calls();
        let source: Arc<dyn CostSource> = Arc::new(stub);

        let missing_region = ResourceDescriptor::new("aws:ec2/instance:Instance", "bad", "aws")
            .with_property("instanceType", "t3.micro");
        let batch = adapter(4)
            .projected_cost(&source, &[ec2("a"), missing_region, ec2("c")])
            .await;

        assert_eq!(batch.results.len(), 3);
        assert_eq!(calls.projected(), 2);
        assert!(batch.results[1].is_validation_failure());
        assert!(batch.results[1].notes.contains("region is empty"));
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].kind, ErrorKind::Validation);
        assert_eq!(batch.errors[0].resource_id, "bad");
        assert_eq!(batch.results[0].monthly_cost, 7.3);
    }

    #[tokio::test]
    async fn test_plugin_failure_becomes_placeholder() {
        let stub = StubSource::new("aws").with_projected_fn(|req| {
            if req.resource.sku == "boom" {
                Err(Error::from_wire("INTERNAL", "pricing table missing"))
            } else {
                Ok(monthly(1.0))
            }
        });
        let source: Arc<dyn CostSource> = Arc::new(stub);
        let boom = ec2("b").with_property("instanceType", "boom");
        let batch = adapter(2).projected_cost(&source, &[ec2("a"), boom]).await;

        assert_eq!(batch.results.len(), 2);
        assert!(!batch.results[0].is_placeholder());
        assert!(batch.results[1].is_plugin_failure());
        assert!(batch.results[1].notes.contains("pricing table missing"));
        assert_eq!(batch.errors[0].kind, ErrorKind::Plugin);
    }

    #[tokio::test]
    async fn test_order_preserved_under_concurrency() {
        let stub = StubSource::new("aws")
            .with_delay(Duration::from_millis(5))
            .with_projected_fn(|req| Ok(monthly(req.resource.tags.len() as f64)));
        let peak = stub.peak_in_flight();
        let source: Arc<dyn CostSource> = Arc::new(stub);
        let resources: Vec<_> = (0..20).map(|i| ec2(&format!("r{i}"))).collect();

        let batch = adapter(3).projected_cost(&source, &resources).await;

        let ids: Vec<&str> = batch.results.iter().map(|r| r.resource_id.as_str()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("r{i}")).collect();
        assert_eq!(ids, expected);
        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_cancelled_batch_keeps_rows() {
        let stub = StubSource::new("aws")
            .with_delay(Duration::from_secs(10))
            .with_projected(monthly(1.0));
        let source: Arc<dyn CostSource> = Arc::new(stub);
        let cancel = CancellationToken::new();
        let adapter = ProtocolAdapter::new(&Config::default(), cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let batch = adapter.projected_cost(&source, &[ec2("a"), ec2("b")]).await;
        assert_eq!(batch.results.len(), 2);
        assert!(batch.results.iter().all(CostResult::is_plugin_failure));
        assert!(batch
            .errors
            .iter()
            .all(|e| matches!(*e.error, Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_actual_without_end_is_rejected_locally() {
        let stub = StubSource::new("kubecost");
        let calls = stub.calls();
        let source: Arc<dyn CostSource> = Arc::new(stub);
        let range = TimeRange {
            start: Some(chrono::Utc::now()),
            end: None,
        };
        let batch = adapter(2).actual_cost(&source, &[ec2("a")], range).await;
        assert_eq!(calls.actual(), 0);
        assert!(batch.results[0].notes.starts_with("VALIDATION: end"));
    }

    #[tokio::test]
    async fn test_actual_unimplemented_is_no_data() {
        let projected_only: Arc<dyn CostSource> =
            Arc::new(StubSource::new("aws-public").with_projected(monthly(1.0)));
        let now = chrono::Utc::now();
        let range = TimeRange::between(now - chrono::Duration::hours(1), now);
        let batch = adapter(2)
            .actual_cost(&projected_only, &[ec2("a"), ec2("b")], range)
            .await;
        assert_eq!(batch.results.len(), 2);
        assert!(batch.results.iter().all(|r| r.notes.starts_with("NO DATA: ")));
        assert!(!batch.has_errors());
    }

    #[tokio::test]
    async fn test_recommendations_unimplemented_is_silent() {
        let legacy: Arc<dyn CostSource> = Arc::new(StubSource::new("legacy"));
        let batch = adapter(2).recommendations(&legacy, &[ec2("a")]).await;
        assert!(batch.recommendations.is_empty());
        assert!(!batch.has_errors());

        let rightsizer: Arc<dyn CostSource> = Arc::new(StubSource::new("rightsizer").with_recommendations(
            RecommendationsResponse {
                recommendations: vec![Recommendation {
                    id: "rec-1".into(),
                    action_type: "RIGHTSIZE".into(),
                    estimated_savings: 3.5,
                    ..Default::default()
                }],
                ..Default::default()
            },
        ));
        let batch = adapter(2).recommendations(&rightsizer, &[ec2("a"), ec2("b")]).await;
        assert_eq!(batch.recommendations.len(), 2);
        assert_eq!(batch.recommendations[1].resource_id, "b");
        assert_eq!(batch.savings_by_currency()["USD"], 7.0);
    }

    #[tokio::test]
    async fn test_dry_run_requires_resource_type() {
        let source: Arc<dyn CostSource> = Arc::new(StubSource::new("aws"));
        let err = adapter(1).dry_run(&source, "").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
