//! Wire records exchanged with cost plugins.
//!
//! Every record is permissive: missing fields take their defaults and unknown
//! fields land in a flattened `extra` map. A plugin built against a newer
//! protocol minor therefore still decodes; the extra fields are kept for
//! diagnostics and otherwise ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Protocol-spec version this core is built against.
pub const SPEC_VERSION: &str = "0.5.0";

/// RPC service name carried in every request envelope.
pub const SERVICE: &str = "costsource";

/// Wire method names.
pub mod methods {
    pub const GET_PLUGIN_INFO: &str = "GetPluginInfo";
    pub const GET_PROJECTED_COST: &str = "GetProjectedCost";
    pub const GET_ACTUAL_COST: &str = "GetActualCost";
    pub const GET_RECOMMENDATIONS: &str = "GetRecommendations";
    pub const DRY_RUN: &str = "DryRun";
}

/// Plugin self-description returned by `GetPluginInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginMetadata {
    pub name: String,
    /// Implementation version of the plugin binary.
    pub version: String,
    /// Protocol-spec version the plugin was built against.
    pub spec_version: String,
    pub supported_providers: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginMetadata {
    /// Whether this plugin declares support for a provider.
    ///
    /// An empty provider list or a `*` entry means every provider.
    pub fn supports_provider(&self, provider: &str) -> bool {
        self.supported_providers.is_empty()
            || self
                .supported_providers
                .iter()
                .any(|p| p == "*" || p.eq_ignore_ascii_case(provider))
    }
}

/// Resource identity as sent to plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireResource {
    pub provider: String,
    pub resource_type: String,
    pub sku: String,
    pub region: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectedCostRequest {
    pub resource: WireResource,
    /// Expected utilization as a fraction in `[0.0, 1.0]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectedCostResponse {
    pub unit_price: f64,
    pub currency: String,
    pub cost_per_month: f64,
    pub billing_detail: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActualCostRequest {
    pub resource_id: String,
    pub resource: WireResource,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// One billing-derived cost entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActualCostEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub cost: f64,
    pub usage_amount: f64,
    pub usage_unit: String,
    /// Billing category, e.g. `compute` or `storage`.
    pub source: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActualCostResponse {
    pub currency: String,
    pub results: Vec<ActualCostEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationsRequest {
    pub resource_id: String,
    pub resource: WireResource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendation {
    pub id: String,
    pub action_type: String,
    pub description: String,
    pub estimated_savings: f64,
    pub currency: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DryRunRequest {
    pub resource_type: String,
}

/// Support status of one cost-model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldSupportStatus {
    Supported,
    Unsupported,
    Conditional,
    Dynamic,
    /// A status this core does not know yet.
    #[default]
    #[serde(other)]
    Unknown,
}

/// One cost-model field a plugin claims for a resource type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub field_name: String,
    pub support_status: FieldSupportStatus,
    pub condition: String,
    pub expected_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DryRunResponse {
    pub field_mappings: Vec<FieldMapping>,
    pub configuration_valid: bool,
    pub configuration_errors: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_newer_plugin_fields_are_preserved_not_rejected() {
        let response: ProjectedCostResponse = serde_json::from_value(json!({
            "unit_price": 0.0104,
            "currency": "USD",
            "cost_per_month": 7.592,
            "billing_detail": "On-demand Linux",
            "carbon_grams": 1200,
        }))
        .unwrap();
        assert_eq!(response.cost_per_month, 7.592);
        assert_eq!(response.extra.get("carbon_grams"), Some(&json!(1200)));
    }

    #[test]
    fn test_missing_fields_default() {
        let response: ActualCostResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.results.is_empty());
        assert!(response.currency.is_empty());
    }

    #[test]
    fn test_unknown_field_status_decodes() {
        let mapping: FieldMapping = serde_json::from_value(json!({
            "field_name": "cost_per_month",
            "support_status": "EXPERIMENTAL",
        }))
        .unwrap();
        assert_eq!(mapping.support_status, FieldSupportStatus::Unknown);

        let mapping: FieldMapping = serde_json::from_value(json!({
            "field_name": "unit_price",
            "support_status": "CONDITIONAL",
            "condition": "only for on-demand",
        }))
        .unwrap();
        assert_eq!(mapping.support_status, FieldSupportStatus::Conditional);
    }

    #[test]
    fn test_provider_support() {
        let meta = PluginMetadata {
            supported_providers: vec!["aws".into()],
            ..Default::default()
        };
        assert!(meta.supports_provider("AWS"));
        assert!(!meta.supports_provider("azure"));

        let wildcard = PluginMetadata::default();
        assert!(wildcard.supports_provider("gcp"));
    }
}
