//! Conversions between resource descriptors, wire records and cost results.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::engine::results::{Confidence, CostResult, DEFAULT_CURRENCY, HOURS_PER_MONTH};
use crate::plugin::protocol::{
    ActualCostRequest, ActualCostResponse, ProjectedCostRequest, ProjectedCostResponse,
    RecommendationsRequest, WireResource,
};
use crate::resource::{resolve_region, resolve_sku, ResourceDescriptor};
use crate::types::ProviderDefaults;

/// Property key carrying an expected utilization fraction.
pub const UTILIZATION_KEY: &str = "utilization";

/// Billing category used when an entry carries none.
pub const UNCATEGORIZED: &str = "other";

/// Half-open query window for actual cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Length in hours, when both ends are set and ordered.
    pub fn hours(&self) -> Option<f64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end > start => {
                Some((end - start).num_milliseconds() as f64 / 3_600_000.0)
            }
            _ => None,
        }
    }
}

/// Identity, SKU and region as sent to plugins. Unresolvable fields stay
/// empty for the validator to report.
pub fn wire_resource(resource: &ResourceDescriptor, defaults: &ProviderDefaults) -> WireResource {
    let provider = resource.provider();
    WireResource {
        provider: provider.as_str().to_string(),
        resource_type: resource.resource_type.clone(),
        sku: resolve_sku(resource, &provider).unwrap_or_default(),
        region: resolve_region(resource, &provider, defaults).unwrap_or_default(),
        tags: resource.tags(),
    }
}

pub fn projected_request(
    resource: &ResourceDescriptor,
    defaults: &ProviderDefaults,
) -> ProjectedCostRequest {
    ProjectedCostRequest {
        resource: wire_resource(resource, defaults),
        utilization: resource
            .properties
            .get(UTILIZATION_KEY)
            .and_then(serde_json::Value::as_f64),
    }
}

pub fn actual_request(
    resource: &ResourceDescriptor,
    defaults: &ProviderDefaults,
    range: TimeRange,
) -> ActualCostRequest {
    ActualCostRequest {
        resource_id: resource.id.clone(),
        resource: wire_resource(resource, defaults),
        start: range.start,
        end: range.end,
    }
}

pub fn recommendations_request(
    resource: &ResourceDescriptor,
    defaults: &ProviderDefaults,
) -> RecommendationsRequest {
    RecommendationsRequest {
        resource_id: resource.id.clone(),
        resource: wire_resource(resource, defaults),
    }
}

fn currency_or_default(currency: &str) -> String {
    if currency.trim().is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        currency.to_string()
    }
}

pub fn projected_result(
    resource: &ResourceDescriptor,
    plugin: &str,
    response: ProjectedCostResponse,
) -> CostResult {
    let mut result = CostResult::for_resource(resource, plugin);
    result.currency = currency_or_default(&response.currency);
    result.monthly_cost = response.cost_per_month;
    result.hourly_cost = response.cost_per_month / HOURS_PER_MONTH;
    result.notes = response.billing_detail;
    result
}

/// Billing-derived result, or `None` when the plugin had no entries.
pub fn actual_result(
    resource: &ResourceDescriptor,
    plugin: &str,
    response: ActualCostResponse,
    range: TimeRange,
) -> Option<CostResult> {
    if response.results.is_empty() {
        return None;
    }
    let mut breakdown: BTreeMap<String, f64> = BTreeMap::new();
    for entry in &response.results {
        let category = if entry.source.trim().is_empty() {
            UNCATEGORIZED
        } else {
            entry.source.as_str()
        };
        *breakdown.entry(category.to_string()).or_insert(0.0) += entry.cost;
    }
    let total: f64 = response.results.iter().map(|e| e.cost).sum();

    let mut result = CostResult::for_resource(resource, plugin);
    result.currency = currency_or_default(&response.currency);
    result.total_cost = total;
    result.start = range.start;
    result.end = range.end;
    result.breakdown = breakdown;
    result.confidence = Some(Confidence::High);
    if let Some(hours) = range.hours() {
        result.runtime_hours = Some(hours);
        result.hourly_cost = total / hours;
        result.monthly_cost = result.hourly_cost * HOURS_PER_MONTH;
    }
    Some(result)
}
