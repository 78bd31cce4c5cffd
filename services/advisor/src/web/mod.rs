pub mod protocol;
pub mod rest;
pub mod state;

// Re-export the handlers to make them easily accessible to the binary that
// will build the web server router.
pub use rest::{
    advice_document_handler, advice_handler, claim_handler, dismiss_upgrade_handler,
    email_link_complete_handler, email_link_handler, panel_handler, provider_sign_in_handler,
    quote_handler, refresh_usage_handler, reset_handler, sign_in_panel_handler, upgrade_handler,
    ApiDoc,
};
