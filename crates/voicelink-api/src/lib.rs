//! HTTP API layer for VoiceLink billing
//!
//! Mount [`configure_routes`] under `/api/v1` and register an [`AppState`]
//! plus a `web::Data<Arc<JwtService>>` on the application.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::ApiResponse;
pub use handlers::configure_routes;
pub use state::AppState;
