//! services/advisor/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the
//! advisor service, and their mapping onto the core domain types.

use crate::panel::{AdvicePanel, PanelMode};
use maker_price_core::advice::{Block, Section};
use maker_price_core::domain::{Currency, PricingBreakdown, PricingInput, UsageState};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

//=========================================================================================
// Pricing Payloads
//=========================================================================================

/// The maker's inputs as the browser submits them.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PricingInputDto {
    pub product_name: String,
    pub hourly_rate: f64,
    pub time_taken: f64,
    pub materials: f64,
    pub overheads: f64,
    pub extras: f64,
    pub profit_margin: f64,
}

impl From<PricingInputDto> for PricingInput {
    fn from(dto: PricingInputDto) -> Self {
        PricingInput {
            product_name: dto.product_name,
            hourly_rate: dto.hourly_rate,
            time_taken: dto.time_taken,
            materials: dto.materials,
            overheads: dto.overheads,
            extras: dto.extras,
            profit_margin: dto.profit_margin,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownDto {
    pub labor_cost: f64,
    pub base_cost: f64,
    pub profit_amount: f64,
    pub suggested_price: f64,
}

impl From<&PricingBreakdown> for BreakdownDto {
    fn from(breakdown: &PricingBreakdown) -> Self {
        BreakdownDto {
            labor_cost: breakdown.labor_cost,
            base_cost: breakdown.base_cost,
            profit_amount: breakdown.profit_amount,
            suggested_price: breakdown.suggested_price,
        }
    }
}

/// The breakdown pre-formatted with the display currency symbol.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormattedBreakdownDto {
    pub labor_cost: String,
    pub base_cost: String,
    pub profit_amount: String,
    pub suggested_price: String,
}

impl FormattedBreakdownDto {
    pub fn new(breakdown: &PricingBreakdown, currency: Currency) -> Self {
        let money = |value: f64| format!("{}{:.2}", currency.symbol(), value);
        FormattedBreakdownDto {
            labor_cost: money(breakdown.labor_cost),
            base_cost: money(breakdown.base_cost),
            profit_amount: money(breakdown.profit_amount),
            suggested_price: money(breakdown.suggested_price),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub input: PricingInputDto,
    #[schema(value_type = String, example = "DOLLAR")]
    pub currency: Currency,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub breakdown: BreakdownDto,
    pub formatted: FormattedBreakdownDto,
    /// Link into the wholesale checker with this run prefilled.
    pub wholesale_url: String,
}

//=========================================================================================
// Advice and Identity Payloads
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdviceRunRequest {
    pub input: PricingInputDto,
    #[schema(value_type = String, example = "DOLLAR")]
    pub currency: Currency,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProviderSignInRequest {
    /// The provider credential the browser obtained interactively.
    pub credential: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailLinkRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailLinkCompleteRequest {
    /// The full sign-in link the user opened.
    pub link: String,
    /// Manually entered email, required only when none was remembered.
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignInPanelRequest {
    pub show: bool,
}

#[derive(Serialize, ToSchema)]
pub struct UpgradeResponse {
    pub url: String,
}

//=========================================================================================
// Panel View
//=========================================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageDto {
    pub entitled: bool,
    pub free_used: u32,
    pub paid_remaining: u32,
}

impl From<UsageState> for UsageDto {
    fn from(usage: UsageState) -> Self {
        UsageDto {
            entitled: usage.entitled,
            free_used: usage.free_used,
            paid_remaining: usage.paid_remaining,
        }
    }
}

/// One advice block, flattened for rendering. Paragraphs that open with a
/// short label ("Price: ...") carry it separately so the renderer can set
/// it off.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockDto {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

impl From<&Block> for BlockDto {
    fn from(block: &Block) -> Self {
        match block {
            Block::Paragraph { text } => {
                let (label, text) = split_paragraph_label(text);
                BlockDto {
                    kind: "p".to_string(),
                    label,
                    text: Some(text),
                    items: None,
                }
            }
            Block::UnorderedList { items } => BlockDto {
                kind: "ul".to_string(),
                label: None,
                text: None,
                items: Some(items.clone()),
            },
            Block::OrderedList { items } => BlockDto {
                kind: "ol".to_string(),
                label: None,
                text: None,
                items: Some(items.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SectionDto {
    pub title: String,
    pub blocks: Vec<BlockDto>,
}

impl From<&Section> for SectionDto {
    fn from(section: &Section) -> Self {
        SectionDto {
            title: section.title.clone(),
            blocks: section.blocks.iter().map(BlockDto::from).collect(),
        }
    }
}

/// Everything the browser needs to render the advice panel.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PanelViewDto {
    #[schema(value_type = String, example = "idle")]
    pub mode: PanelMode,
    pub loading: bool,
    pub auth_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlement_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_link_notice: Option<String>,
    pub usage: UsageDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice_markdown: Option<String>,
    pub sections: Vec<SectionDto>,
    pub show_sign_in_panel: bool,
    pub show_upgrade_modal: bool,
}

impl PanelViewDto {
    pub fn from_panel(panel: &AdvicePanel) -> Self {
        let state = panel.state();
        let sections = panel
            .advice_document()
            .iter()
            .map(SectionDto::from)
            .collect();

        PanelViewDto {
            mode: state.mode,
            loading: state.loading,
            auth_line: state.auth_line(),
            entitlement_line: state.entitlement_line(),
            error: state.error_msg.clone(),
            info: state.info_msg.clone(),
            email_link_notice: state.email_link_notice.clone(),
            usage: state.usage.into(),
            advice_markdown: state.advice_markdown.clone(),
            sections,
            show_sign_in_panel: state.show_sign_in_panel,
            show_upgrade_modal: state.show_upgrade_modal,
        }
    }
}

/// Splits a short leading label off a paragraph ("Price: hold steady" into
/// "Price" and "hold steady").
fn split_paragraph_label(text: &str) -> (Option<String>, String) {
    let label_regex = Regex::new(r"^([^:]{2,40}):\s+(.*)$").unwrap();
    match label_regex.captures(text) {
        Some(captures) => (
            Some(captures[1].to_string()),
            captures[2].to_string(),
        ),
        None => (None, text.to_string()),
    }
}
