//! Outbound event envelope types
//!
//! Every event the engine emits is an [`Event`]: a fixed header (`eventId`,
//! `eventType`, `occurredAt`, `page`) plus at most a few type-specific blocks.
//! Field names follow the collector's camelCase wire format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of events emitted to the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    Click,
    Scroll,
    CheckoutActivate,
    CheckoutComplete,
    FormView,
    FormStart,
    FormSubmit,
    FormAbandon,
    FormFieldError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::Click => "click",
            EventType::Scroll => "scroll",
            EventType::CheckoutActivate => "checkout_activate",
            EventType::CheckoutComplete => "checkout_complete",
            EventType::FormView => "form_view",
            EventType::FormStart => "form_start",
            EventType::FormSubmit => "form_submit",
            EventType::FormAbandon => "form_abandon",
            EventType::FormFieldError => "form_field_error",
        }
    }

    /// Prefix used when generating ids for this event type
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EventType::PageView => "page",
            EventType::Click => "click",
            EventType::Scroll => "scroll",
            EventType::CheckoutActivate => "checkout-activate",
            EventType::CheckoutComplete => "checkout-complete",
            EventType::FormView => "form-view",
            EventType::FormStart => "form-start",
            EventType::FormSubmit => "form-submit",
            EventType::FormAbandon => "form-abandon",
            EventType::FormFieldError => "form-error",
        }
    }
}

/// How a checkout activation or completion was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckoutMethod {
    Url,
    Dom,
    Storage,
    Form,
    Click,
    CustomEvent,
    /// Host framework router hook
    #[serde(rename = "nextjs-router")]
    Router,
}

impl CheckoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMethod::Url => "url",
            CheckoutMethod::Dom => "dom",
            CheckoutMethod::Storage => "storage",
            CheckoutMethod::Form => "form",
            CheckoutMethod::Click => "click",
            CheckoutMethod::CustomEvent => "custom-event",
            CheckoutMethod::Router => "nextjs-router",
        }
    }
}

/// Third-party form plugin a form belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormProvider {
    #[serde(rename = "Contact Form 7")]
    ContactForm7,
    #[serde(rename = "Gravity Forms")]
    GravityForms,
    #[serde(rename = "WPForms")]
    WpForms,
    #[serde(rename = "Forminator")]
    Forminator,
    #[serde(rename = "Ninja Forms")]
    NinjaForms,
    #[serde(rename = "Caldera Forms")]
    CalderaForms,
    #[serde(rename = "Fluent Forms")]
    FluentForms,
    #[serde(rename = "HubSpot")]
    HubSpot,
    #[serde(rename = "Mailchimp")]
    Mailchimp,
    #[serde(rename = "Typeform")]
    Typeform,
    #[serde(rename = "native")]
    Native,
}

impl FormProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormProvider::ContactForm7 => "Contact Form 7",
            FormProvider::GravityForms => "Gravity Forms",
            FormProvider::WpForms => "WPForms",
            FormProvider::Forminator => "Forminator",
            FormProvider::NinjaForms => "Ninja Forms",
            FormProvider::CalderaForms => "Caldera Forms",
            FormProvider::FluentForms => "Fluent Forms",
            FormProvider::HubSpot => "HubSpot",
            FormProvider::Mailchimp => "Mailchimp",
            FormProvider::Typeform => "Typeform",
            FormProvider::Native => "native",
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Page block present on every event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Path of the page the event refers to
    #[serde(default)]
    pub path: String,
    /// Document title at emission time
    #[serde(default)]
    pub title: String,
    /// Referrer, only reported on page views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_path: Option<String>,
}

/// Element block for clicks and field errors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    /// Lower-cased tag name
    pub kind: String,
    /// Visible label, truncated
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Form block for the form lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormInfo {
    pub form_id: String,
    pub form_name: String,
    pub provider: FormProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_field: Option<String>,
    /// Seconds from start to submit. `Some(None)` serializes as `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_complete: Option<Option<u64>>,
    /// Seconds from start to abandon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u64>,
    /// Distinct fields focused; omitted when zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_completed: Option<usize>,
}

/// Scroll depth block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollInfo {
    pub percent: u8,
}

/// Checkout block for activation and completion events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInfo {
    pub checkout_id: String,
    pub method: CheckoutMethod,
    /// Completion only. `Some(None)` serializes as `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_complete: Option<Option<u64>>,
    /// Completion only. `Some(None)` serializes as `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_path: Option<Option<String>>,
}

/// An outbound event.
///
/// Header fields are plain strings so that a malformed envelope (for example
/// one decoded from a host) can be represented and rejected at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub page: PageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<FormInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<ScrollInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout: Option<CheckoutInfo>,
}

impl Event {
    pub fn new(
        event_type: EventType,
        event_id: String,
        occurred_at: DateTime<Utc>,
        page: PageInfo,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.as_str().to_string(),
            occurred_at: Some(format_timestamp(occurred_at)),
            page,
            element: None,
            form: None,
            scroll: None,
            checkout: None,
        }
    }

    pub fn with_element(mut self, element: ElementInfo) -> Self {
        self.element = Some(element);
        self
    }

    pub fn with_form(mut self, form: FormInfo) -> Self {
        self.form = Some(form);
        self
    }

    pub fn with_scroll(mut self, scroll: ScrollInfo) -> Self {
        self.scroll = Some(scroll);
        self
    }

    pub fn with_checkout(mut self, checkout: CheckoutInfo) -> Self {
        self.checkout = Some(checkout);
        self
    }
}

/// Render a timestamp the way `Date.prototype.toISOString` does
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate to at most `max` characters, respecting char boundaries
pub fn truncate_label(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Whole seconds elapsed between two millisecond timestamps, never below 1
pub fn elapsed_secs(start_ms: i64, now_ms: i64) -> u64 {
    let secs = ((now_ms - start_ms) as f64 / 1000.0).round();
    secs.max(1.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_type_serialization() {
        let json = serde_json::to_string(&EventType::FormFieldError).unwrap();
        assert_eq!(json, "\"form_field_error\"");
        assert_eq!(EventType::CheckoutComplete.id_prefix(), "checkout-complete");
    }

    #[test]
    fn test_checkout_method_wire_names() {
        let methods = [
            CheckoutMethod::Url,
            CheckoutMethod::Dom,
            CheckoutMethod::Storage,
            CheckoutMethod::Form,
            CheckoutMethod::Click,
            CheckoutMethod::CustomEvent,
            CheckoutMethod::Router,
        ];
        for method in methods {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
        }
        assert_eq!(CheckoutMethod::Router.as_str(), "nextjs-router");
        let parsed: CheckoutMethod = serde_json::from_str("\"nextjs-router\"").unwrap();
        assert_eq!(parsed, CheckoutMethod::Router);
    }

    #[test]
    fn test_provider_serializes_display_name() {
        let json = serde_json::to_string(&FormProvider::ContactForm7).unwrap();
        assert_eq!(json, "\"Contact Form 7\"");
        let native: FormProvider = serde_json::from_str("\"native\"").unwrap();
        assert_eq!(native, FormProvider::Native);
    }

    #[test]
    fn test_unmatched_completion_serializes_nulls() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let event = Event::new(
            EventType::CheckoutComplete,
            "checkout-complete-1".to_string(),
            at,
            PageInfo {
                path: "/thank-you".to_string(),
                title: "Thanks".to_string(),
                referrer_path: None,
            },
        )
        .with_checkout(CheckoutInfo {
            checkout_id: "unknown".to_string(),
            method: CheckoutMethod::Url,
            time_to_complete: Some(None),
            checkout_path: Some(None),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["occurredAt"], "2024-01-15T14:00:00.000Z");
        assert_eq!(value["checkout"]["checkoutId"], "unknown");
        assert!(value["checkout"]["timeToComplete"].is_null());
        assert!(value["checkout"]
            .as_object()
            .unwrap()
            .contains_key("checkoutPath"));
        assert!(value.get("form").is_none());
    }

    #[test]
    fn test_activation_omits_completion_fields() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let event = Event::new(
            EventType::CheckoutActivate,
            "id".to_string(),
            at,
            PageInfo::default(),
        )
        .with_checkout(CheckoutInfo {
            checkout_id: "checkout-1".to_string(),
            method: CheckoutMethod::CustomEvent,
            time_to_complete: None,
            checkout_path: None,
        });

        let value = serde_json::to_value(&event).unwrap();
        let checkout = value["checkout"].as_object().unwrap();
        assert_eq!(checkout.len(), 2);
        assert_eq!(checkout["method"], "custom-event");
    }

    #[test]
    fn test_elapsed_secs_rounds_and_floors_at_one() {
        assert_eq!(elapsed_secs(0, 12_000), 12);
        assert_eq!(elapsed_secs(0, 12_499), 12);
        assert_eq!(elapsed_secs(0, 12_500), 13);
        assert_eq!(elapsed_secs(0, 10), 1);
    }

    #[test]
    fn test_truncate_label_counts_chars() {
        assert_eq!(truncate_label("Formulario de pedido", 10), "Formulario");
        assert_eq!(truncate_label("ñandú", 3), "ñan");
    }
}
