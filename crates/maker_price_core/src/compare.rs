//! crates/maker_price_core/src/compare.rs
//!
//! Helpers for comparing the current pricing run against the previous
//! snapshot. The orchestrator only attaches comparison data to an advice
//! request when at least one of these helpers reports a genuine change.

use crate::domain::{PricingBreakdown, PricingInput, Snapshot};

/// Differences below this magnitude are float noise, not a rate change.
const RATE_NOISE_FLOOR: f64 = 0.01;

/// A single changed input field, formatted for the change summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub from: String,
    pub to: String,
}

/// Computes the effective-hourly-rate delta between the previous snapshot
/// and the current results.
///
/// The effective rate is externally supplied and optional on both sides;
/// when either side lacks it there is no delta. Magnitudes below the noise
/// floor collapse to zero (no change).
pub fn effective_rate_delta(previous: &Snapshot, current: &PricingBreakdown) -> Option<f64> {
    let prev_rate = previous.results.effective_hourly_rate?;
    let cur_rate = current.effective_hourly_rate?;
    let delta = cur_rate - prev_rate;
    if delta.abs() >= RATE_NOISE_FLOOR {
        Some(delta)
    } else {
        Some(0.0)
    }
}

/// Reports every input field whose value differs between the two runs,
/// using the wire names the advice service sees.
pub fn diff_inputs(previous: &PricingInput, current: &PricingInput) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if previous.product_name != current.product_name {
        changes.push(FieldChange {
            field: "productName",
            from: previous.product_name.clone(),
            to: current.product_name.clone(),
        });
    }

    let numeric_fields: [(&'static str, f64, f64); 6] = [
        ("hourlyRate", previous.hourly_rate, current.hourly_rate),
        ("timeTaken", previous.time_taken, current.time_taken),
        ("materials", previous.materials, current.materials),
        ("overheads", previous.overheads, current.overheads),
        ("extras", previous.extras, current.extras),
        ("profitMargin", previous.profit_margin, current.profit_margin),
    ];
    for (field, from, to) in numeric_fields {
        if from != to {
            changes.push(FieldChange {
                field,
                from: from.to_string(),
                to: to.to_string(),
            });
        }
    }

    changes
}

/// Collapses a field diff into one human-readable line, reporting up to
/// the first three changes. Returns `None` when nothing changed.
pub fn change_summary(changes: &[FieldChange]) -> Option<String> {
    if changes.is_empty() {
        return None;
    }
    let top: Vec<String> = changes
        .iter()
        .take(3)
        .map(|c| format!("{}: {} → {}", c.field, c.from, c.to))
        .collect();
    Some(format!("Changes since last run: {}.", top.join(", ")))
}
