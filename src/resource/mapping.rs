//! SKU and region resolution from provider-specific property keys.
//!
//! Defaults are looked up through [`ProviderDefaults`], whose sections are
//! per provider; only the matching provider's arm reads its section.

use crate::types::ProviderDefaults;
use serde_json::Value;

use super::{Provider, ResourceDescriptor};

const AWS_SKU_KEYS: &[&str] = &[
    "instanceType",
    "instanceClass",
    "nodeType",
    "volumeType",
    "storageClass",
];
const AZURE_SKU_KEYS: &[&str] = &["vmSize", "skuName", "size"];
const GCP_SKU_KEYS: &[&str] = &["machineType", "tier", "storageClass"];

/// Resolve the SKU (or equivalent pricing dimension) for a resource.
pub fn resolve_sku(resource: &ResourceDescriptor, provider: &Provider) -> Option<String> {
    match provider {
        Provider::Aws => first_property(resource, AWS_SKU_KEYS),
        Provider::Azure => {
            first_property(resource, AZURE_SKU_KEYS).or_else(|| nested_sku_name(resource))
        }
        // Machine types may arrive as full self-links.
        Provider::Gcp => first_property(resource, GCP_SKU_KEYS)
            .map(|sku| last_path_segment(&sku).to_string()),
        Provider::Kubernetes | Provider::Other(_) => first_property(resource, &["sku"]),
    }
}

/// Resolve the region for a resource.
///
/// Order: the resource's own region-like property, then a region derived from
/// its zone, then the provider's own default section.
pub fn resolve_region(
    resource: &ResourceDescriptor,
    provider: &Provider,
    defaults: &ProviderDefaults,
) -> Option<String> {
    match provider {
        Provider::Aws => first_property(resource, &["region"])
            .or_else(|| {
                resource
                    .str_property("availabilityZone")
                    .and_then(region_from_availability_zone)
            })
            .or_else(|| defaults.aws.region.clone()),
        Provider::Azure => first_property(resource, &["location", "region"]),
        Provider::Gcp => first_property(resource, &["region"]).or_else(|| {
            resource
                .str_property("zone")
                .map(last_path_segment)
                .and_then(region_from_gcp_zone)
        }),
        Provider::Kubernetes | Provider::Other(_) => first_property(resource, &["region"]),
    }
}

/// `us-east-1a` → `us-east-1`.
///
/// Returns `None` when the value does not end in a zone letter after a digit.
pub fn region_from_availability_zone(zone: &str) -> Option<String> {
    let trimmed = zone.trim();
    let region = trimmed.trim_end_matches(|c: char| c.is_ascii_lowercase());
    let stripped = trimmed.len() - region.len();
    if stripped == 0 || stripped > 1 || !region.ends_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(region.to_string())
}

/// `us-central1-a` → `us-central1`.
pub fn region_from_gcp_zone(zone: &str) -> Option<String> {
    let (region, suffix) = zone.trim().rsplit_once('-')?;
    if region.is_empty() || suffix.len() != 1 || !suffix.chars().all(|c| c.is_ascii_lowercase()) {
        return None;
    }
    Some(region.to_string())
}

fn first_property(resource: &ResourceDescriptor, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| resource.str_property(key))
        .map(str::to_string)
}

fn nested_sku_name(resource: &ResourceDescriptor) -> Option<String> {
    match resource.properties.get("sku") {
        Some(Value::Object(sku)) => sku
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn last_path_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}
