//! Pre-flight request validation.
//!
//! Requests are checked in-process before they cross the process boundary.
//! Checks run in a fixed order and stop at the first violation; the request
//! is never modified.

use thiserror::Error;

use crate::plugin::protocol::{
    ActualCostRequest, DryRunRequest, ProjectedCostRequest, RecommendationsRequest, WireResource,
};

/// First violation found in an outgoing request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is empty")]
    Empty { field: &'static str },

    #[error("{field} is empty; {hint}")]
    EmptyWithHint {
        field: &'static str,
        hint: &'static str,
    },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} is required for a time-range request")]
    MissingTimestamp { field: &'static str },

    #[error("end ({end}) must be strictly after start ({start})")]
    InvalidTimeRange { start: String, end: String },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Empty { field }
            | ValidationError::EmptyWithHint { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MissingTimestamp { field } => field,
            ValidationError::InvalidTimeRange { .. } => "end",
        }
    }
}

impl From<ValidationError> for crate::types::Error {
    fn from(err: ValidationError) -> Self {
        crate::types::Error::validation(err.to_string())
    }
}

pub type ValidationResult = std::result::Result<(), ValidationError>;

const PROVIDER_HINT: &str =
    "set the provider on the resource or use a provider-qualified type such as `aws:ec2/instance:Instance`";
const SKU_HINT: &str =
    "derive it from the provider's size attribute (instanceType, vmSize, machineType) with resolve_sku";
const REGION_HINT: &str =
    "derive it from an availability-zone attribute with resolve_region or region_from_availability_zone";

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &'static str) -> ValidationResult {
    if s.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

fn validate_non_empty_hinted(s: &str, field: &'static str, hint: &'static str) -> ValidationResult {
    if s.trim().is_empty() {
        return Err(ValidationError::EmptyWithHint { field, hint });
    }
    Ok(())
}

/// Validate that a value is a finite number within an inclusive range.
pub fn validate_range(value: f64, field: &'static str, min: f64, max: f64) -> ValidationResult {
    if !value.is_finite() || value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn validate_identity(resource: &WireResource) -> ValidationResult {
    validate_non_empty_hinted(&resource.provider, "provider", PROVIDER_HINT)?;
    validate_non_empty(&resource.resource_type, "resource_type")
}

/// Projected cost: provider, resource type, SKU, region, utilization.
pub fn validate_projected(request: &ProjectedCostRequest) -> ValidationResult {
    validate_identity(&request.resource)?;
    validate_non_empty_hinted(&request.resource.sku, "sku", SKU_HINT)?;
    validate_non_empty_hinted(&request.resource.region, "region", REGION_HINT)?;
    if let Some(utilization) = request.utilization {
        validate_range(utilization, "utilization", 0.0, 1.0)?;
    }
    Ok(())
}

/// Actual cost: resource id, provider, resource type, then the time range.
pub fn validate_actual(request: &ActualCostRequest) -> ValidationResult {
    validate_non_empty(&request.resource_id, "resource_id")?;
    validate_identity(&request.resource)?;
    let start = request
        .start
        .ok_or(ValidationError::MissingTimestamp { field: "start" })?;
    let end = request
        .end
        .ok_or(ValidationError::MissingTimestamp { field: "end" })?;
    if end <= start {
        return Err(ValidationError::InvalidTimeRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }
    Ok(())
}

pub fn validate_recommendations(request: &RecommendationsRequest) -> ValidationResult {
    validate_non_empty(&request.resource_id, "resource_id")?;
    validate_identity(&request.resource)
}

pub fn validate_dry_run(request: &DryRunRequest) -> ValidationResult {
    validate_non_empty(&request.resource_type, "resource_type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn projected() -> ProjectedCostRequest {
        ProjectedCostRequest {
            resource: WireResource {
                provider: "aws".into(),
                resource_type: "aws:ec2/instance:Instance".into(),
                sku: "t3.micro".into(),
                region: "us-east-1".into(),
                tags: Default::default(),
            },
            utilization: None,
        }
    }

    fn actual() -> ActualCostRequest {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        ActualCostRequest {
            resource_id: "i-123".into(),
            resource: projected().resource,
            start: Some(start),
            end: Some(start + Duration::days(1)),
        }
    }

    #[test]
    fn test_valid_projected_passes() {
        assert_eq!(validate_projected(&projected()), Ok(()));
    }

    #[test]
    fn test_fail_fast_order() {
        let mut req = projected();
        req.resource.sku.clear();
        req.resource.region.clear();
        let err = validate_projected(&req).unwrap_err();
        assert_eq!(err.field(), "sku");
    }

    #[test]
    fn test_region_message_suggests_helper() {
        let mut req = projected();
        req.resource.region = "  ".into();
        let err = validate_projected(&req).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("region is empty"));
        assert!(msg.contains("availability-zone"));
    }

    #[test]
    fn test_utilization_range() {
        let mut req = projected();
        req.utilization = Some(1.0);
        assert!(validate_projected(&req).is_ok());
        req.utilization = Some(1.5);
        assert_eq!(validate_projected(&req).unwrap_err().field(), "utilization");
        req.utilization = Some(f64::NAN);
        assert!(validate_projected(&req).is_err());
    }

    #[test]
    fn test_actual_requires_end() {
        let mut req = actual();
        req.end = None;
        assert_eq!(
            validate_actual(&req),
            Err(ValidationError::MissingTimestamp { field: "end" })
        );
    }

    #[test]
    fn test_actual_end_must_follow_start() {
        let mut req = actual();
        req.end = req.start;
        let err = validate_actual(&req).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTimeRange { .. }));
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let req = projected();
        let before = req.clone();
        let _ = validate_projected(&req);
        assert_eq!(req, before);
    }

    #[test]
    fn test_converts_into_crate_error() {
        let err: crate::types::Error = ValidationError::Empty { field: "resource_id" }.into();
        assert_eq!(err.to_string(), "validation error: resource_id is empty");
    }

    #[test]
    fn test_dry_run_requires_type() {
        assert!(validate_dry_run(&DryRunRequest::default()).is_err());
    }
}
