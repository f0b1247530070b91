//! Checkout funnel correlation
//!
//! Activation and completion are inferred from independent, noisy signals
//! (URL, DOM, storage, clicks, form submits, router and custom events) and
//! matched into sessions by [`CheckoutCorrelator`].

pub mod correlator;
pub mod detect;

pub use correlator::{CheckoutCorrelator, CheckoutSession, Completion, UNKNOWN_CHECKOUT};
pub use detect::{
    detect_completion, detect_order_in_storage, detect_success_in_dom, is_checkout_form,
    is_checkout_page, is_purchase_intent, is_success_page,
};
