//! crates/maker_price_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage or transport format beyond
//! the camelCase wire names the remote advice service expects.

use serde::{Deserialize, Serialize};

/// The maker's current pricing inputs, owned by the top-level UI and
/// recomputed on every field edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingInput {
    pub product_name: String,
    pub hourly_rate: f64,
    pub time_taken: f64,
    pub materials: f64,
    pub overheads: f64,
    pub extras: f64,
    pub profit_margin: f64,
}

impl Default for PricingInput {
    fn default() -> Self {
        Self {
            product_name: String::new(),
            hourly_rate: 25.0,
            time_taken: 1.0,
            materials: 0.0,
            overheads: 0.0,
            extras: 0.0,
            profit_margin: 40.0,
        }
    }
}

/// The derived cost breakdown. Always a pure function of the current input.
///
/// `effective_hourly_rate` is only ever supplied externally (it arrives in
/// advice responses for comparison purposes) and is never computed locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBreakdown {
    pub labor_cost: f64,
    pub base_cost: f64,
    pub profit_amount: f64,
    pub suggested_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_hourly_rate: Option<f64>,
}

/// The last successful (input, result) pair. Exactly one snapshot persists
/// at a time; it is overwritten on every successful advice response and
/// cleared on session reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: PricingInput,
    pub results: PricingBreakdown,
    pub saved_at_ms: i64,
}

/// Server-authoritative usage counters. The client only mirrors values
/// returned by the remote service and never increments locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageState {
    pub entitled: bool,
    pub free_used: u32,
    pub paid_remaining: u32,
}

/// A partial usage update carried by a remote response. Fields absent from
/// the response leave the local value unchanged; absent is not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_remaining: Option<u32>,
}

impl UsageState {
    /// Applies a partial server update field by field.
    pub fn apply(&mut self, patch: &UsagePatch) {
        if let Some(entitled) = patch.entitled {
            self.entitled = entitled;
        }
        if let Some(free_used) = patch.free_used {
            self.free_used = free_used;
        }
        if let Some(paid_remaining) = patch.paid_remaining {
            self.paid_remaining = paid_remaining;
        }
    }
}

/// The identity handle for the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub uid: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

/// The display currencies supported by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Dollar,
    Pound,
    Euro,
}

impl Currency {
    pub fn symbol(self) -> &'static str {
        match self {
            Currency::Dollar => "$",
            Currency::Pound => "£",
            Currency::Euro => "€",
        }
    }

    pub fn locale(self) -> &'static str {
        match self {
            Currency::Dollar => "en-US",
            Currency::Pound => "en-GB",
            Currency::Euro => "de-DE",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Currency::Dollar => "Dollars ($)",
            Currency::Pound => "Pounds (£)",
            Currency::Euro => "Euros (€)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_apply_overwrites_only_present_fields() {
        let mut usage = UsageState {
            entitled: true,
            free_used: 1,
            paid_remaining: 99,
        };
        usage.apply(&UsagePatch {
            entitled: None,
            free_used: Some(2),
            paid_remaining: None,
        });
        assert!(usage.entitled);
        assert_eq!(usage.free_used, 2);
        assert_eq!(usage.paid_remaining, 99);
    }

    #[test]
    fn usage_patch_deserializes_absent_fields_as_none() {
        let patch: UsagePatch = serde_json::from_str(r#"{"freeUsed": 2}"#).unwrap();
        assert_eq!(patch.entitled, None);
        assert_eq!(patch.free_used, Some(2));
        assert_eq!(patch.paid_remaining, None);
    }

    #[test]
    fn breakdown_omits_absent_effective_rate_on_the_wire() {
        let breakdown = PricingBreakdown {
            labor_cost: 25.0,
            base_cost: 25.0,
            profit_amount: 10.0,
            suggested_price: 35.0,
            effective_hourly_rate: None,
        };
        let json = serde_json::to_value(&breakdown).unwrap();
        assert!(json.get("effectiveHourlyRate").is_none());
        assert_eq!(json.get("suggestedPrice").unwrap().as_f64(), Some(35.0));
    }

    #[test]
    fn currency_table_matches_display_config() {
        assert_eq!(Currency::Dollar.symbol(), "$");
        assert_eq!(Currency::Pound.locale(), "en-GB");
        assert_eq!(Currency::Euro.label(), "Euros (€)");
        let c: Currency = serde_json::from_str(r#""POUND""#).unwrap();
        assert_eq!(c, Currency::Pound);
    }
}
