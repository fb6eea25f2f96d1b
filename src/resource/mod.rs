//! Resource descriptors handed to the engine by upstream ingestion.
//!
//! A descriptor is immutable once it reaches the engine. Lifecycle metadata
//! (`created`, `external`) is injected into `properties` by the ingestion
//! step and read back through [`ResourceDescriptor::lifecycle`].

pub mod mapping;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub use mapping::{
    region_from_availability_zone, region_from_gcp_zone, resolve_region, resolve_sku,
};

/// Property key carrying the RFC 3339 creation timestamp.
pub const CREATED_KEY: &str = "created";
/// Property key flagging a resource imported from a pre-existing cloud object.
pub const EXTERNAL_KEY: &str = "external";
/// Property key carrying resource tags.
pub const TAGS_KEY: &str = "tags";

/// A cloud resource to price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Provider-qualified kind, e.g. `aws:ec2/instance:Instance`.
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl ResourceDescriptor {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            provider: provider.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter used by ingestion and tests.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Provider of this resource.
    ///
    /// Uses the explicit `provider` field when set, otherwise the prefix of
    /// the resource type (`aws:ec2/instance:Instance` → `aws`).
    pub fn provider(&self) -> Provider {
        if !self.provider.trim().is_empty() {
            return Provider::parse(&self.provider);
        }
        let prefix = self.resource_type.split(':').next().unwrap_or_default();
        Provider::parse(prefix)
    }

    /// String-valued property, ignoring empty strings.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Tags as a sorted string map. Non-string tag values are rendered as JSON.
    pub fn tags(&self) -> BTreeMap<String, String> {
        match self.properties.get(TAGS_KEY) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let rendered = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), rendered)
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Injected lifecycle metadata.
    pub fn lifecycle(&self) -> Lifecycle {
        let created_at = self
            .str_property(CREATED_KEY)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let external = match self.properties.get(EXTERNAL_KEY) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        Lifecycle {
            created_at,
            external,
        }
    }
}

/// Creation metadata read from a descriptor's properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    /// Unset when the property is absent or not a valid RFC 3339 timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// True when the resource was imported rather than created by the deployment.
    pub external: bool,
}

/// Cloud provider of a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
    Kubernetes,
    Other(String),
}

impl Provider {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "aws" | "aws-native" => Provider::Aws,
            "azure" | "azure-native" | "azurerm" => Provider::Azure,
            "gcp" | "google" | "google-native" => Provider::Gcp,
            "kubernetes" | "k8s" => Provider::Kubernetes,
            other => Provider::Other(other.to_string()),
        }
    }

    /// Canonical lowercase name used on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
            Provider::Kubernetes => "kubernetes",
            Provider::Other(name) => name,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
