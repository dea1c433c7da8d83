//! Telephony provider integration for VoiceLink billing
//!
//! - [`TwilioClient`]: REST client implementing the outbound
//!   `TelephonyProvider` contract
//! - [`CallStatusEvent`]: parsed status callback posted by the provider
//!   when a call changes state
//! - [`CallbackValidator`]: checks the provider's callback signature

pub mod client;
pub mod event;
pub mod signature;

pub use client::TwilioClient;
pub use event::{CallStatusEvent, CallStatusForm, ProviderCallStatus};
pub use signature::{CallbackValidator, SIGNATURE_HEADER};

/// Provider status callback constants
pub mod callback {
    /// Events the provider is asked to report
    pub const STATUS_EVENTS: &str = "completed";

    /// HTTP method used for status callbacks
    pub const METHOD: &str = "POST";
}
