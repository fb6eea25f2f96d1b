//! Runtime-based cost estimation from resource creation metadata.
//!
//! `total = hourly_rate × hours since creation`. Continuous uptime since
//! creation is assumed; stopped or scaled-to-zero periods are not visible
//! here.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::results::Confidence;

/// Note attached to estimates for imported resources.
pub const IMPORTED_NOTE: &str = "Imported resource: the creation timestamp records when it was \
     imported, not when the cloud resource was created, so the actual runtime and cost may be higher";

/// Rejected estimator input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimateError {
    #[error("hourly rate must be a non-negative number, got {0}")]
    InvalidRate(f64),

    #[error("creation timestamp is not set")]
    MissingCreatedAt,

    #[error("creation timestamp {created_at} is after now ({now})")]
    CreatedInFuture {
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub total_cost: f64,
    pub runtime_hours: f64,
    pub confidence: Confidence,
    pub notes: String,
}

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Estimate accumulated cost since `created_at`.
///
/// Pure: identical inputs give bit-identical outputs.
pub fn estimate(
    created_at: Option<DateTime<Utc>>,
    hourly_rate: f64,
    is_external: bool,
    now: DateTime<Utc>,
) -> Result<Estimate, EstimateError> {
    if !hourly_rate.is_finite() || hourly_rate < 0.0 {
        return Err(EstimateError::InvalidRate(hourly_rate));
    }
    let created_at = match created_at {
        Some(ts) if ts.timestamp_millis() != 0 => ts,
        _ => return Err(EstimateError::MissingCreatedAt),
    };
    if created_at > now {
        return Err(EstimateError::CreatedInFuture { created_at, now });
    }

    let runtime_hours = (now - created_at).num_milliseconds() as f64 / MILLIS_PER_HOUR;
    let (confidence, notes) = if is_external {
        (Confidence::Low, IMPORTED_NOTE.to_string())
    } else {
        (Confidence::Medium, String::new())
    };
    Ok(Estimate {
        total_cost: hourly_rate * runtime_hours,
        runtime_hours,
        confidence,
        notes,
    })
}
