//! HTTP request handlers

pub mod call_rates;
pub mod calls;
pub mod health;
pub mod wallet;
pub mod webhooks;

use actix_web::web;

pub use call_rates::configure as configure_call_rates;
pub use calls::configure as configure_calls;
pub use health::configure as configure_health;
pub use wallet::configure as configure_wallet;
pub use webhooks::configure as configure_webhooks;

/// Every billing route, relative to the `/api/v1` scope
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health)
        .configure(configure_calls)
        .configure(configure_call_rates)
        .configure(configure_wallet)
        .configure(configure_webhooks);
}
