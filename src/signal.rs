//! Signal bus
//!
//! Every producer the engine listens to (load, poller, history, router hook,
//! mutation observer, custom events and DOM input events) is one [`Signal`]
//! variant. Hosts serialize signals as tagged JSON:
//!
//! ```json
//! {"type": "focus_in", "form": {"id": "signup"}, "field": {"tag": "INPUT", "name": "email"}}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::page::{ClickTarget, FieldElement, FormElement};

/// Something that happened on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Document ready
    Load,
    /// Path-polling tick
    Poll,
    /// History navigation
    PopState,
    /// Host framework router finished a navigation
    RouteChangeComplete { url: String },
    /// Subtree insertions; may carry newly added forms
    DomMutation {
        #[serde(default)]
        added_forms: Vec<FormElement>,
    },
    /// Named custom DOM event
    Custom {
        name: String,
        #[serde(default)]
        detail: CustomDetail,
    },
    Submit {
        form: FormElement,
    },
    Click {
        target: ClickTarget,
    },
    /// A field inside `form` gained focus
    FocusIn {
        form: FormElement,
        field: FieldElement,
    },
    /// Focus left an element inside `form`
    FocusOut {
        form: FormElement,
    },
    /// Native constraint validation failed on `field`
    Invalid {
        form: FormElement,
        field: FieldElement,
    },
    Scroll {
        scroll_y: f64,
        viewport_height: f64,
        document_height: f64,
    },
    Unload,
}

impl Signal {
    /// Variant name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Load => "load",
            Signal::Poll => "poll",
            Signal::PopState => "pop_state",
            Signal::RouteChangeComplete { .. } => "route_change_complete",
            Signal::DomMutation { .. } => "dom_mutation",
            Signal::Custom { .. } => "custom",
            Signal::Submit { .. } => "submit",
            Signal::Click { .. } => "click",
            Signal::FocusIn { .. } => "focus_in",
            Signal::FocusOut { .. } => "focus_out",
            Signal::Invalid { .. } => "invalid",
            Signal::Scroll { .. } => "scroll",
            Signal::Unload => "unload",
        }
    }

    /// Parse one JSON-encoded signal
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        serde_json::from_str(json).map_err(|e| TrackerError::InvalidSignal(e.to_string()))
    }
}

/// `event.detail` of a custom checkout event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomDetail {
    pub path: Option<String>,
    pub checkout_id: Option<String>,
}

/// Custom event names the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomEvent {
    CheckoutActivate,
    CheckoutComplete,
    OrderComplete,
    PurchaseComplete,
}

impl CustomEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomEvent::CheckoutActivate => "checkout:activate",
            CustomEvent::CheckoutComplete => "checkout:complete",
            CustomEvent::OrderComplete => "order:complete",
            CustomEvent::PurchaseComplete => "purchase:complete",
        }
    }

    pub fn is_completion(&self) -> bool {
        !matches!(self, CustomEvent::CheckoutActivate)
    }
}

impl fmt::Display for CustomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomEvent {
    type Err = TrackerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "checkout:activate" => Ok(CustomEvent::CheckoutActivate),
            "checkout:complete" => Ok(CustomEvent::CheckoutComplete),
            "order:complete" => Ok(CustomEvent::OrderComplete),
            "purchase:complete" => Ok(CustomEvent::PurchaseComplete),
            other => Err(TrackerError::InvalidSignal(format!(
                "unknown custom event: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_signal_json_shape() {
        let signal = Signal::from_json(
            r#"{"type":"focus_in","form":{"id":"signup"},"field":{"tag":"INPUT","name":"email"}}"#,
        )
        .unwrap();
        let Signal::FocusIn { form, field } = signal else {
            panic!("expected focus_in");
        };
        assert_eq!(form.id.as_deref(), Some("signup"));
        assert_eq!(field.name.as_deref(), Some("email"));
    }

    #[test]
    fn test_custom_detail_is_optional() {
        let signal = Signal::from_json(r#"{"type":"custom","name":"order:complete"}"#).unwrap();
        assert_eq!(
            signal,
            Signal::Custom {
                name: "order:complete".to_string(),
                detail: CustomDetail::default(),
            }
        );

        let signal = Signal::from_json(
            r#"{"type":"custom","name":"checkout:complete","detail":{"checkoutId":"checkout-1"}}"#,
        )
        .unwrap();
        let Signal::Custom { detail, .. } = signal else {
            panic!("expected custom");
        };
        assert_eq!(detail.checkout_id.as_deref(), Some("checkout-1"));
    }

    #[test]
    fn test_unknown_signal_rejected() {
        let err = Signal::from_json(r#"{"type":"resize"}"#).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidSignal(_)));
    }

    #[test]
    fn test_custom_event_names() {
        for name in [
            "checkout:activate",
            "checkout:complete",
            "order:complete",
            "purchase:complete",
        ] {
            let event: CustomEvent = name.parse().unwrap();
            assert_eq!(event.to_string(), name);
        }
        assert!(!CustomEvent::CheckoutActivate.is_completion());
        assert!(CustomEvent::PurchaseComplete.is_completion());
        assert!("cart:update".parse::<CustomEvent>().is_err());
    }
}
