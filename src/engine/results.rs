//! Per-resource cost results and the batch container handed to renderers.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::plugin::protocol::{FieldMapping, Recommendation};
use crate::plugin::LaunchFailure;
use crate::resource::ResourceDescriptor;
use crate::types::Error;

/// Hours in an average month (8760 / 12).
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Default currency when a source omits one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Note prefix for requests rejected locally before any RPC.
pub const VALIDATION_PREFIX: &str = "VALIDATION: ";
/// Note prefix for failed plugin calls.
pub const ERROR_PREFIX: &str = "ERROR: ";
/// Note prefix for resources no source could price.
pub const NO_DATA_PREFIX: &str = "NO DATA: ";

/// Provenance of a cost figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    /// Billing-derived.
    High,
    /// Runtime estimate on a resource the deployment created.
    Medium,
    /// Runtime estimate on an imported resource.
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost of one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostResult {
    pub resource_type: String,
    pub resource_id: String,
    pub provider: String,
    /// Plugin name, `spec`, or `estimate`; empty when nothing answered.
    pub source: String,
    pub currency: String,
    pub monthly_cost: f64,
    pub hourly_cost: f64,
    /// Cost over `start..end` (actual cost and estimates).
    pub total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Cost per billing category.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown: BTreeMap<String, f64>,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

impl CostResult {
    /// Zero-cost result identifying `resource`.
    pub fn for_resource(resource: &ResourceDescriptor, source: impl Into<String>) -> Self {
        Self {
            resource_type: resource.resource_type.clone(),
            resource_id: resource.id.clone(),
            provider: resource.provider().to_string(),
            source: source.into(),
            currency: DEFAULT_CURRENCY.to_string(),
            monthly_cost: 0.0,
            hourly_cost: 0.0,
            total_cost: 0.0,
            runtime_hours: None,
            start: None,
            end: None,
            breakdown: BTreeMap::new(),
            notes: String::new(),
            confidence: None,
        }
    }

    /// Zero-cost placeholder carrying a prefixed note.
    pub fn placeholder(
        resource: &ResourceDescriptor,
        source: impl Into<String>,
        prefix: &str,
        message: impl fmt::Display,
    ) -> Self {
        let mut result = Self::for_resource(resource, source);
        result.notes = format!("{}{}", prefix, message);
        result
    }

    /// Whether this row is a stand-in rather than a priced answer.
    pub fn is_placeholder(&self) -> bool {
        [VALIDATION_PREFIX, ERROR_PREFIX, NO_DATA_PREFIX]
            .iter()
            .any(|p| self.notes.starts_with(p))
    }

    pub fn is_validation_failure(&self) -> bool {
        self.notes.starts_with(VALIDATION_PREFIX)
    }

    pub fn is_plugin_failure(&self) -> bool {
        self.notes.starts_with(ERROR_PREFIX)
    }
}

/// Which stage a per-resource failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Launch,
    Validation,
    Plugin,
}

/// One failed per-resource operation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub resource_type: String,
    pub resource_id: String,
    pub plugin: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: Arc<Error>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorDetail {
    pub fn new(
        kind: ErrorKind,
        resource: &ResourceDescriptor,
        plugin: impl Into<String>,
        error: Error,
    ) -> Self {
        Self {
            kind,
            resource_type: resource.resource_type.clone(),
            resource_id: resource.id.clone(),
            plugin: plugin.into(),
            error: Arc::new(error),
            timestamp: Utc::now(),
        }
    }

    /// A plugin that never came up. Carries no resource.
    pub fn launch(failure: &LaunchFailure) -> Self {
        Self {
            kind: ErrorKind::Launch,
            resource_type: String::new(),
            resource_id: String::new(),
            plugin: failure.plugin.clone(),
            error: Arc::clone(&failure.error),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Launch => write!(f, "plugin {}: {}", self.plugin, self.error),
            _ => write!(
                f,
                "{} {} ({}): {}",
                self.resource_type, self.resource_id, self.plugin, self.error
            ),
        }
    }
}

pub(crate) fn serialize_error<S: Serializer>(error: &Arc<Error>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Number of errors listed in [`CostResultWithErrors::error_summary`].
pub const ERROR_SUMMARY_LIMIT: usize = 5;

/// Batch result: one row per input resource plus per-resource errors and
/// batch-level warnings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostResultWithErrors {
    pub results: Vec<CostResult>,
    pub errors: Vec<ErrorDetail>,
    /// Compatibility notices and skipped estimates. Not counted as errors.
    pub warnings: Vec<String>,
}

impl CostResultWithErrors {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Human-readable error listing, capped at [`ERROR_SUMMARY_LIMIT`] lines.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        let mut lines = vec![format!("{} error(s):", self.errors.len())];
        lines.extend(
            self.errors
                .iter()
                .take(ERROR_SUMMARY_LIMIT)
                .map(|e| format!("  - {}", e)),
        );
        if self.errors.len() > ERROR_SUMMARY_LIMIT {
            lines.push(format!(
                "  ...and {} more",
                self.errors.len() - ERROR_SUMMARY_LIMIT
            ));
        }
        lines.join("\n")
    }
}

/// One recommendation tied to the resource it was produced for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecommendation {
    pub resource_type: String,
    pub resource_id: String,
    pub plugin: String,
    pub recommendation: Recommendation,
}

/// Recommendations across a batch, plus per-resource failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecommendationBatch {
    pub recommendations: Vec<ResourceRecommendation>,
    pub errors: Vec<ErrorDetail>,
}

impl RecommendationBatch {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Total estimated savings per currency.
    pub fn savings_by_currency(&self) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for item in &self.recommendations {
            let currency = if item.recommendation.currency.is_empty() {
                DEFAULT_CURRENCY
            } else {
                item.recommendation.currency.as_str()
            };
            *totals.entry(currency.to_string()).or_insert(0.0) +=
                item.recommendation.estimated_savings;
        }
        totals
    }
}

/// Field support one plugin reports for a resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRunReport {
    pub plugin: String,
    pub fields: Vec<FieldMapping>,
    pub configuration_valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configuration_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
