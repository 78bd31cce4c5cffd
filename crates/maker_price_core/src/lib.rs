pub mod advice;
pub mod compare;
pub mod domain;
pub mod ports;
pub mod pricing;

pub use advice::{parse_advice, Block, Section};
pub use domain::{
    Currency, PricingBreakdown, PricingInput, SessionInfo, Snapshot, UsagePatch, UsageState,
};
pub use ports::{
    AdviceRequest, AdviceResponse, AdviceService, ClaimOutcome, EntitlementService,
    IdentityService, KeyValueStore, PortError, PortResult, RequestContext,
};
