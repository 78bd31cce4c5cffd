//! crates/maker_price_core/src/pricing.rs
//!
//! The pricing arithmetic: a pure, deterministic function from the maker's
//! inputs to the suggested retail price and its cost breakdown, plus the
//! prefill link into the wholesale checker.

use crate::domain::{PricingBreakdown, PricingInput};
use url::form_urlencoded;

/// Computes the cost breakdown for the given inputs.
///
/// labor = rate × time; base = labor + materials + overheads + extras;
/// profit = base × margin; suggested = base + profit.
pub fn compute_breakdown(input: &PricingInput) -> PricingBreakdown {
    let labor_cost = input.hourly_rate * input.time_taken;
    let base_cost = labor_cost + input.materials + input.overheads + input.extras;
    let profit_amount = base_cost * (input.profit_margin / 100.0);
    let suggested_price = base_cost + profit_amount;

    PricingBreakdown {
        labor_cost,
        base_cost,
        profit_amount,
        suggested_price,
        effective_hourly_rate: None,
    }
}

/// Builds the link into the wholesale checker with the current run prefilled.
///
/// Production cost carries hard costs only (materials + overheads + extras),
/// never labor; labor is represented by the time and ideal-rate parameters.
pub fn wholesale_prefill_url(
    base_url: &str,
    input: &PricingInput,
    breakdown: &PricingBreakdown,
) -> String {
    let mut params = form_urlencoded::Serializer::new(String::new());

    let product_name = input.product_name.trim();
    if !product_name.is_empty() {
        params.append_pair("productName", product_name);
    }

    params.append_pair("targetRetail", &breakdown.suggested_price.to_string());

    let hard_costs = input.materials + input.overheads + input.extras;
    params.append_pair("productionCost", &hard_costs.to_string());

    params.append_pair("timeTaken", &input.time_taken.to_string());
    params.append_pair("idealHourlyRate", &input.hourly_rate.to_string());

    let qs = params.finish();
    if qs.is_empty() {
        base_url.to_string()
    } else {
        format!("{}?{}", base_url, qs)
    }
}
