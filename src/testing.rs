//! In-memory cost sources for tests and local demos.
//!
//! [`StubSource`] answers every method from a configurable closure, counts
//! calls per method, and records peak concurrency so dispatch bounds can be
//! asserted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::plugin::protocol::{
    ActualCostRequest, ActualCostResponse, DryRunRequest, DryRunResponse, PluginMetadata,
    ProjectedCostRequest, ProjectedCostResponse, RecommendationsRequest, RecommendationsResponse,
};
use crate::plugin::CostSource;
use crate::types::{Error, Result};

type Handler<Req, Resp> = Arc<dyn Fn(&Req) -> Result<Resp> + Send + Sync>;

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub projected: AtomicUsize,
    pub actual: AtomicUsize,
    pub recommendations: AtomicUsize,
    pub dry_run: AtomicUsize,
}

impl CallCounts {
    pub fn projected(&self) -> usize {
        self.projected.load(Ordering::SeqCst)
    }

    pub fn actual(&self) -> usize {
        self.actual.load(Ordering::SeqCst)
    }

    pub fn recommendations(&self) -> usize {
        self.recommendations.load(Ordering::SeqCst)
    }

    pub fn dry_run(&self) -> usize {
        self.dry_run.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.projected() + self.actual() + self.recommendations() + self.dry_run()
    }
}

/// Scriptable cost source. Unconfigured methods answer `UNIMPLEMENTED`.
#[derive(Clone)]
pub struct StubSource {
    name: String,
    metadata: Option<PluginMetadata>,
    delay: Option<Duration>,
    projected: Handler<ProjectedCostRequest, ProjectedCostResponse>,
    actual: Handler<ActualCostRequest, ActualCostResponse>,
    recommendations: Handler<RecommendationsRequest, RecommendationsResponse>,
    dry_run: Handler<DryRunRequest, DryRunResponse>,
    calls: Arc<CallCounts>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for StubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubSource")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("calls", &self.calls)
            .finish()
    }
}

fn unimplemented<Req, Resp>(method: &'static str) -> Handler<Req, Resp> {
    Arc::new(move |_| Err(Error::unimplemented(method)))
}

impl StubSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: None,
            delay: None,
            projected: unimplemented("GetProjectedCost"),
            actual: unimplemented("GetActualCost"),
            recommendations: unimplemented("GetRecommendations"),
            dry_run: unimplemented("DryRun"),
            calls: Arc::new(CallCounts::default()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_metadata(mut self, metadata: PluginMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Metadata built against `spec_version`, supporting `providers`.
    pub fn with_spec_version(self, spec_version: &str, providers: &[&str]) -> Self {
        let name = self.name.clone();
        self.with_metadata(PluginMetadata {
            name,
            version: "1.0.0".into(),
            spec_version: spec_version.into(),
            supported_providers: providers.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Sleep this long inside every cost call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_projected(self, response: ProjectedCostResponse) -> Self {
        self.with_projected_fn(move |_| Ok(response.clone()))
    }

    pub fn with_projected_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProjectedCostRequest) -> Result<ProjectedCostResponse> + Send + Sync + 'static,
    {
        self.projected = Arc::new(f);
        self
    }

    pub fn with_actual(self, response: ActualCostResponse) -> Self {
        self.with_actual_fn(move |_| Ok(response.clone()))
    }

    pub fn with_actual_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ActualCostRequest) -> Result<ActualCostResponse> + Send + Sync + 'static,
    {
        self.actual = Arc::new(f);
        self
    }

    pub fn with_recommendations(self, response: RecommendationsResponse) -> Self {
        self.with_recommendations_fn(move |_| Ok(response.clone()))
    }

    pub fn with_recommendations_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecommendationsRequest) -> Result<RecommendationsResponse> + Send + Sync + 'static,
    {
        self.recommendations = Arc::new(f);
        self
    }

    pub fn with_dry_run(self, response: DryRunResponse) -> Self {
        self.with_dry_run_fn(move |_| Ok(response.clone()))
    }

    pub fn with_dry_run_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&DryRunRequest) -> Result<DryRunResponse> + Send + Sync + 'static,
    {
        self.dry_run = Arc::new(f);
        self
    }

    /// Shared call counters; stays valid after the source is moved.
    pub fn calls(&self) -> Arc<CallCounts> {
        Arc::clone(&self.calls)
    }

    /// Shared high-water mark of concurrent cost calls.
    pub fn peak_in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.peak_in_flight)
    }

    async fn enter(&self, counter: &AtomicUsize) -> InFlight<'_> {
        counter.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CostSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<PluginMetadata> {
        self.metadata.clone()
    }

    async fn projected_cost(&self, request: ProjectedCostRequest) -> Result<ProjectedCostResponse> {
        let _guard = self.enter(&self.calls.projected).await;
        (self.projected)(&request)
    }

    async fn actual_cost(&self, request: ActualCostRequest) -> Result<ActualCostResponse> {
        let _guard = self.enter(&self.calls.actual).await;
        (self.actual)(&request)
    }

    async fn recommendations(
        &self,
        request: RecommendationsRequest,
    ) -> Result<RecommendationsResponse> {
        let _guard = self.enter(&self.calls.recommendations).await;
        (self.recommendations)(&request)
    }

    async fn dry_run(&self, request: DryRunRequest) -> Result<DryRunResponse> {
        let _guard = self.enter(&self.calls.dry_run).await;
        (self.dry_run)(&request)
    }
}

/// Projected response with a monthly cost in USD.
pub fn monthly(cost_per_month: f64) -> ProjectedCostResponse {
    ProjectedCostResponse {
        unit_price: cost_per_month / crate::engine::HOURS_PER_MONTH,
        currency: "USD".into(),
        cost_per_month,
        billing_detail: "stub".into(),
        ..Default::default()
    }
}
