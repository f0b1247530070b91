//! Delivery and deduplication layer
//!
//! Shared by the checkout correlator and the form tracker: id generation,
//! envelope validation, `(eventType, eventId)` duplicate suppression and a
//! fire-and-forget transport with a degraded beacon fallback.

#[cfg(feature = "http")]
pub mod http;
pub mod ids;
pub mod sender;
pub mod transport;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use ids::{checkout_id, random_token, EventIdGenerator};
pub use sender::{is_iso_timestamp, validate_envelope, Delivery};
pub use transport::{DeliveryRequest, Dispatch, OutboxTransport, Transport};
