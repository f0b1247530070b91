//! Conversion Flux - client-side checkout funnel and form lifecycle instrumentation
//!
//! Flux observes page activity and turns it into collector events through a
//! deterministic pipeline: signal → detectors → correlator / form tracker →
//! envelope → deduplicated delivery.
//!
//! ## Modules
//!
//! - **Checkout**: infer checkout activations and completions from URL, DOM,
//!   storage, router and custom-event signals, and match them into sessions
//! - **Forms**: per-form view/start/submit/abandon lifecycle with provider
//!   detection
//! - **Delivery**: id generation, envelope validation, duplicate suppression
//!   and fire-and-forget transport
//!
//! The host supplies the page through [`Page`] and the clock through explicit
//! timestamps; [`Tracker`] ties everything together.

pub mod activity;
pub mod checkout;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod forms;
pub mod page;
pub mod scheduler;
pub mod signal;
pub mod trace;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{ApiKeySources, TrackerConfig};
pub use delivery::{Delivery, DeliveryRequest, Dispatch, OutboxTransport, Transport};
pub use engine::Tracker;
pub use error::{TrackerError, TransportError};
pub use page::{ClickTarget, FieldElement, FormElement, Page, PageSnapshot};
pub use signal::{CustomDetail, Signal};
pub use types::{CheckoutMethod, Event, EventType, FormProvider};

#[cfg(feature = "http")]
pub use delivery::HttpTransport;

/// Library version
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "conversion-flux";
