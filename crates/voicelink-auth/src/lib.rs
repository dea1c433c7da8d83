//! Authentication and authorization for VoiceLink billing
//!
//! Users are verified by the identity service, which issues HS256 access
//! tokens whose subject is the user id. This crate validates those tokens
//! and exposes Actix-web extractors for handlers.
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use voicelink_auth::{AdminUser, AuthenticatedUser};
//!
//! async fn wallet(user: AuthenticatedUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id }))
//! }
//!
//! async fn manage_rates(_admin: AdminUser) -> HttpResponse {
//!     HttpResponse::Ok().finish()
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AdminUser, AuthenticatedUser};
