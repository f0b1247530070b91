//! Form lifecycle tracking
//!
//! Identity and provider resolution for form snapshots, plus the
//! [`FormTracker`] state machine that turns focus/submit/blur signals into
//! `form_*` transitions.

pub mod identity;
pub mod provider;
pub mod tracker;

pub use identity::{resolve_field_label, resolve_field_name, resolve_form_id, resolve_form_name};
pub use provider::detect_form_provider;
pub use tracker::{interaction_id, FormSignal, FormState, FormTracker, UNKNOWN_FORM};
