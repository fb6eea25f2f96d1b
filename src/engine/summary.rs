//! Deterministic totals and renderings of a cost batch.
//!
//! Every keyed collection is a `BTreeMap` and rows are sorted by
//! `(resource_type, resource_id, source)` before rendering, so the same batch
//! always renders to the same bytes regardless of the order sources answered.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use super::results::{CostResult, CostResultWithErrors, ErrorDetail};
use crate::types::Result;

/// Totals in one currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrencyTotals {
    pub monthly_cost: f64,
    pub total_cost: f64,
    pub by_provider: BTreeMap<String, f64>,
    pub by_resource_type: BTreeMap<String, f64>,
    /// Billing categories from actual-cost breakdowns.
    pub by_category: BTreeMap<String, f64>,
}

/// Aggregate view of a [`CostResultWithErrors`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub resources: usize,
    pub priced: usize,
    pub placeholders: usize,
    pub errors: usize,
    pub warnings: usize,
    pub by_currency: BTreeMap<String, CurrencyTotals>,
    /// Row count per confidence label; unlabelled rows are not counted.
    pub by_confidence: BTreeMap<String, usize>,
}

impl CostSummary {
    pub fn from_batch(batch: &CostResultWithErrors) -> Self {
        let mut summary = CostSummary {
            resources: batch.results.len(),
            errors: batch.errors.len(),
            warnings: batch.warnings.len(),
            ..Default::default()
        };
        for row in sorted_rows(batch) {
            if row.is_placeholder() {
                summary.placeholders += 1;
                continue;
            }
            summary.priced += 1;
            if let Some(confidence) = row.confidence {
                *summary
                    .by_confidence
                    .entry(confidence.as_str().to_string())
                    .or_insert(0) += 1;
            }
            let totals = summary.by_currency.entry(row.currency.clone()).or_default();
            totals.monthly_cost += row.monthly_cost;
            totals.total_cost += row.total_cost;
            *totals.by_provider.entry(row.provider.clone()).or_insert(0.0) += row.monthly_cost;
            *totals
                .by_resource_type
                .entry(row.resource_type.clone())
                .or_insert(0.0) += row.monthly_cost;
            for (category, cost) in &row.breakdown {
                *totals.by_category.entry(category.clone()).or_insert(0.0) += cost;
            }
        }
        summary
    }
}

impl fmt::Display for CostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} resources: {} priced, {} without a price",
            self.resources, self.priced, self.placeholders
        )?;
        for (currency, totals) in &self.by_currency {
            writeln!(
                f,
                "{}: {:.2}/month, {:.2} over period",
                currency, totals.monthly_cost, totals.total_cost
            )?;
            for (provider, cost) in &totals.by_provider {
                writeln!(f, "  provider {:<24} {:>12.2}", provider, cost)?;
            }
            for (category, cost) in &totals.by_category {
                writeln!(f, "  category {:<24} {:>12.2}", category, cost)?;
            }
        }
        for (confidence, count) in &self.by_confidence {
            writeln!(f, "confidence {}: {}", confidence, count)?;
        }
        Ok(())
    }
}

fn sorted_rows(batch: &CostResultWithErrors) -> Vec<&CostResult> {
    let mut rows: Vec<&CostResult> = batch.results.iter().collect();
    rows.sort_by(|a, b| {
        (&a.resource_type, &a.resource_id, &a.source).cmp(&(
            &b.resource_type,
            &b.resource_id,
            &b.source,
        ))
    });
    rows
}

/// Plain-text table of every row, then totals, errors and warnings.
pub fn render_table(batch: &CostResultWithErrors) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:<24} {:<14} {:>12} {:>12} {:<4} {:<10} NOTES",
        "RESOURCE", "TYPE", "SOURCE", "MONTHLY", "TOTAL", "CUR", "CONFIDENCE"
    );
    for row in sorted_rows(batch) {
        let _ = writeln!(
            out,
            "{:<40} {:<24} {:<14} {:>12.2} {:>12.2} {:<4} {:<10} {}",
            row.resource_id,
            row.resource_type,
            row.source,
            row.monthly_cost,
            row.total_cost,
            row.currency,
            row.confidence.map(|c| c.as_str()).unwrap_or("-"),
            row.notes
        );
    }
    out.push('\n');
    let _ = write!(out, "{}", CostSummary::from_batch(batch));
    if batch.has_errors() {
        out.push('\n');
        out.push_str(&batch.error_summary());
        out.push('\n');
    }
    for warning in &batch.warnings {
        let _ = writeln!(out, "warning: {}", warning);
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: Vec<&'a CostResult>,
    errors: &'a [ErrorDetail],
    warnings: &'a [String],
    summary: CostSummary,
}

/// Pretty JSON with rows sorted and a summary attached.
pub fn render_json(batch: &CostResultWithErrors) -> Result<String> {
    let report = JsonReport {
        results: sorted_rows(batch),
        errors: &batch.errors,
        warnings: &batch.warnings,
        summary: CostSummary::from_batch(batch),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
