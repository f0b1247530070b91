//! Checkout signal detectors
//!
//! Stateless predicates over the current path, DOM and storage. Every
//! detector swallows host errors and treats them as a negative.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::page::{ClickTarget, FormElement, Page, StorageArea};
use crate::types::CheckoutMethod;

static CHECKOUT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"/(checkout|cart|carrito|pagar|payment|pago|order|orden|buy|comprar|purchase|compra)",
    )
    .expect("checkout path pattern is valid")
});

static SUCCESS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"/(success|exito|thank.?you|gracias|confirmation|confirmacion|order-confirmed|orden-confirmada|complete|completado|done|finalizado)",
    )
    .expect("success path pattern is valid")
});

/// Selectors that may mark a success banner
pub const SUCCESS_SELECTORS: &[&str] = &[
    r#"[class*="success"]"#,
    r#"[class*="complete"]"#,
    r#"[class*="confirmed"]"#,
    r#"[id*="success"]"#,
    r#"[id*="complete"]"#,
    r#"[id*="confirmed"]"#,
    r#"[data-status="success"]"#,
    r#"[data-status="complete"]"#,
    r#"[data-status="confirmed"]"#,
    ".order-confirmation",
    ".checkout-success",
    ".payment-success",
    r#"[aria-label*="success" i]"#,
    r#"[aria-label*="complete" i]"#,
];

/// Text a matched element must contain to count as a success banner
const SUCCESS_KEYWORDS: &[&str] = &[
    "success",
    "complete",
    "confirmed",
    "order",
    "exito",
    "completado",
    "confirmado",
    "orden",
];

/// Substrings that make a storage key order-related
const ORDER_KEY_MARKERS: &[&str] = &[
    "order",
    "orden",
    "checkout",
    "purchase",
    "compra",
    "transaction",
];

/// Substrings that make a stored value look like real order data
const ORDER_VALUE_MARKERS: &[&str] = &["id", "status", "total"];

const CHECKOUT_FORM_MARKERS: &[&str] = &["checkout", "cart", "payment"];

const PURCHASE_TEXT_MARKERS: &[&str] = &[
    "checkout", "pagar", "comprar", "buy now", "purchase", "order",
];

const PURCHASE_ATTRIBUTE_MARKERS: &[&str] = &["checkout", "purchase", "buy"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Path looks like a cart/checkout/payment step
pub fn is_checkout_page(path: &str) -> bool {
    !path.is_empty() && CHECKOUT_PATH.is_match(&path.to_lowercase())
}

/// Path looks like a confirmation/thank-you step
pub fn is_success_page(path: &str) -> bool {
    !path.is_empty() && SUCCESS_PATH.is_match(&path.to_lowercase())
}

/// A success-looking element whose text also reads like a confirmation
pub fn detect_success_in_dom(page: &dyn Page) -> bool {
    for selector in SUCCESS_SELECTORS {
        match page.query_text(selector) {
            Ok(texts) => {
                let confirmed = texts
                    .iter()
                    .any(|text| contains_any(&text.to_lowercase(), SUCCESS_KEYWORDS));
                if confirmed {
                    return true;
                }
            }
            Err(e) => debug!(selector, error = %e, "skipping success selector"),
        }
    }
    false
}

/// An order-related storage key holding something that looks like order data
pub fn detect_order_in_storage(page: &dyn Page) -> bool {
    let keys = match (
        page.storage_keys(StorageArea::Local),
        page.storage_keys(StorageArea::Session),
    ) {
        (Ok(local), Ok(session)) => local.into_iter().chain(session),
        (Err(e), _) | (_, Err(e)) => {
            debug!(error = %e, "storage unavailable for order detection");
            return false;
        }
    };

    keys.filter(|key| contains_any(&key.to_lowercase(), ORDER_KEY_MARKERS))
        .any(|key| match stored_value(page, &key) {
            Some(value) => contains_any(&value, ORDER_VALUE_MARKERS),
            None => false,
        })
}

/// `localStorage.getItem(key) || sessionStorage.getItem(key)`
fn stored_value(page: &dyn Page, key: &str) -> Option<String> {
    let lookup = |area: StorageArea| match page.storage_item(area, key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            debug!(key, error = %e, "storage read failed");
            None
        }
    };
    lookup(StorageArea::Local).or_else(|| lookup(StorageArea::Session))
}

/// URL, then DOM, then storage; the first positive decides the method
pub fn detect_completion(page: &dyn Page) -> Option<CheckoutMethod> {
    if is_success_page(page.path()) {
        Some(CheckoutMethod::Url)
    } else if detect_success_in_dom(page) {
        Some(CheckoutMethod::Dom)
    } else if detect_order_in_storage(page) {
        Some(CheckoutMethod::Storage)
    } else {
        None
    }
}

/// Form belongs to a checkout flow, by page or by its own markup
pub fn is_checkout_form(form: &FormElement, path: &str) -> bool {
    if is_checkout_page(path) {
        return true;
    }
    [
        form.id.as_deref().unwrap_or_default(),
        form.class_name.as_str(),
        form.action.as_deref().unwrap_or_default(),
    ]
    .iter()
    .any(|value| contains_any(&value.to_lowercase(), CHECKOUT_FORM_MARKERS))
}

/// Button or link whose wording signals purchase intent
pub fn is_purchase_intent(target: &ClickTarget) -> bool {
    if !target.is_actionable() {
        return false;
    }
    if contains_any(&target.text.to_lowercase(), PURCHASE_TEXT_MARKERS) {
        return true;
    }
    [
        target.id.as_deref().unwrap_or_default(),
        target.class_name.as_str(),
        target.aria_label.as_deref().unwrap_or_default(),
    ]
    .iter()
    .any(|value| contains_any(&value.to_lowercase(), PURCHASE_ATTRIBUTE_MARKERS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::page::{ElementSnapshot, PageSnapshot};

    #[test]
    fn test_checkout_paths() {
        for path in ["/checkout", "/shop/Cart/", "/pagar", "/es/carrito", "/buy/123"] {
            assert!(is_checkout_page(path), "{}", path);
        }
        for path in ["/", "/products/shoes", "/thank-you", ""] {
            assert!(!is_checkout_page(path), "{}", path);
        }
    }

    #[test]
    fn test_success_paths() {
        for path in ["/thank-you", "/thankyou", "/Thank_You", "/gracias", "/order-confirmed"] {
            assert!(is_success_page(path), "{}", path);
        }
        assert!(!is_success_page("/checkout"));
        assert!(!is_success_page(""));
    }

    #[test]
    fn test_dom_requires_keyword_in_text() {
        let matched_but_silent = PageSnapshot::at("/").with_element(ElementSnapshot {
            class_name: "btn-success".to_string(),
            text: "Save".to_string(),
            ..ElementSnapshot::default()
        });
        assert!(!detect_success_in_dom(&matched_but_silent));

        let confirmed = PageSnapshot::at("/").with_element(ElementSnapshot {
            class_name: "checkout-success".to_string(),
            text: "Your ORDER has been placed".to_string(),
            ..ElementSnapshot::default()
        });
        assert!(detect_success_in_dom(&confirmed));
    }

    /// Rejects one selector the way a browser rejects unsupported syntax
    struct RejectingPage {
        inner: PageSnapshot,
        rejected: &'static str,
    }

    impl Page for RejectingPage {
        fn path(&self) -> &str {
            self.inner.path()
        }

        fn title(&self) -> &str {
            self.inner.title()
        }

        fn referrer(&self) -> Option<&str> {
            self.inner.referrer()
        }

        fn origin(&self) -> &str {
            self.inner.origin()
        }

        fn query_text(&self, selector: &str) -> Result<Vec<String>, TrackerError> {
            if selector == self.rejected {
                return Err(TrackerError::InvalidSelector(selector.to_string()));
            }
            self.inner.query_text(selector)
        }

        fn storage_keys(&self, area: StorageArea) -> Result<Vec<String>, TrackerError> {
            self.inner.storage_keys(area)
        }

        fn storage_item(
            &self,
            area: StorageArea,
            key: &str,
        ) -> Result<Option<String>, TrackerError> {
            self.inner.storage_item(area, key)
        }

        fn forms(&self) -> Vec<FormElement> {
            self.inner.forms()
        }

        fn focus_within(&self, form: &FormElement) -> bool {
            self.inner.focus_within(form)
        }
    }

    #[test]
    fn test_selector_error_skipped_and_scan_continues() {
        let page = RejectingPage {
            inner: PageSnapshot::at("/").with_element(ElementSnapshot {
                class_name: "checkout-success".to_string(),
                text: "Order confirmed".to_string(),
                ..ElementSnapshot::default()
            }),
            rejected: SUCCESS_SELECTORS[0],
        };
        assert!(page.query_text(SUCCESS_SELECTORS[0]).is_err());
        assert!(detect_success_in_dom(&page));
        assert_eq!(detect_completion(&page), Some(CheckoutMethod::Dom));
    }

    #[test]
    fn test_dom_keyword_without_selector_is_negative() {
        let page = PageSnapshot::at("/").with_element(ElementSnapshot {
            class_name: "hero".to_string(),
            text: "Order now!".to_string(),
            ..ElementSnapshot::default()
        });
        assert!(!detect_success_in_dom(&page));
    }

    #[test]
    fn test_storage_requires_order_shaped_value() {
        let mut page = PageSnapshot::at("/");
        page.local_storage
            .insert("lastOrder".to_string(), "pending".to_string());
        assert!(!detect_order_in_storage(&page));

        page.session_storage.insert(
            "checkout_state".to_string(),
            r#"{"total": 42}"#.to_string(),
        );
        assert!(detect_order_in_storage(&page));
    }

    #[test]
    fn test_storage_value_falls_back_to_session() {
        let mut page = PageSnapshot::at("/");
        page.local_storage
            .insert("purchase".to_string(), String::new());
        page.session_storage
            .insert("purchase".to_string(), "status=paid".to_string());
        assert!(detect_order_in_storage(&page));
    }

    #[test]
    fn test_unavailable_storage_is_negative() {
        let mut page = PageSnapshot::at("/");
        page.local_storage
            .insert("order".to_string(), "id=1".to_string());
        page.storage_available = false;
        assert!(!detect_order_in_storage(&page));
    }

    #[test]
    fn test_completion_detection_order() {
        let mut page = PageSnapshot::at("/thank-you").with_element(ElementSnapshot {
            class_name: "order-confirmation".to_string(),
            text: "Order confirmed".to_string(),
            ..ElementSnapshot::default()
        });
        page.local_storage
            .insert("order".to_string(), "id=7".to_string());
        assert_eq!(detect_completion(&page), Some(CheckoutMethod::Url));

        page.navigate("/account");
        assert_eq!(detect_completion(&page), Some(CheckoutMethod::Dom));

        page.elements.clear();
        assert_eq!(detect_completion(&page), Some(CheckoutMethod::Storage));

        page.local_storage.clear();
        assert_eq!(detect_completion(&page), None);
    }

    #[test]
    fn test_checkout_form_markers() {
        let payment = FormElement {
            class_name: "Payment-Form".to_string(),
            ..FormElement::default()
        };
        assert!(is_checkout_form(&payment, "/account"));

        let by_action = FormElement {
            action: Some("https://shop.test/cart/update".to_string()),
            ..FormElement::default()
        };
        assert!(is_checkout_form(&by_action, "/"));

        let newsletter = FormElement {
            id: Some("newsletter".to_string()),
            ..FormElement::default()
        };
        assert!(!is_checkout_form(&newsletter, "/blog"));
        assert!(is_checkout_form(&newsletter, "/checkout"));
    }

    #[test]
    fn test_purchase_intent_click() {
        let buy = ClickTarget {
            tag: "BUTTON".to_string(),
            text: "Buy now".to_string(),
            ..ClickTarget::default()
        };
        assert!(is_purchase_intent(&buy));

        let labelled = ClickTarget {
            tag: "A".to_string(),
            aria_label: Some("Proceed to Checkout".to_string()),
            ..ClickTarget::default()
        };
        assert!(is_purchase_intent(&labelled));

        let plain_div = ClickTarget {
            tag: "DIV".to_string(),
            text: "checkout".to_string(),
            ..ClickTarget::default()
        };
        assert!(!is_purchase_intent(&plain_div));

        let read_more = ClickTarget {
            tag: "A".to_string(),
            text: "Read more".to_string(),
            ..ClickTarget::default()
        };
        assert!(!is_purchase_intent(&read_more));
    }
}
