//! Host page abstraction
//!
//! The engine never touches a real DOM. Everything it needs from the page
//! (location, title, selector queries, storage, focus) goes through [`Page`].
//! Elements that arrive with signals are plain snapshots.

pub mod selector;
pub mod snapshot;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

pub use selector::SimpleSelector;
pub use snapshot::{ElementSnapshot, PageSnapshot};

/// Which web storage area to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageArea {
    Local,
    Session,
}

/// Read-only view of the host page
pub trait Page {
    /// Current `location.pathname`
    fn path(&self) -> &str;

    /// Current `document.title`
    fn title(&self) -> &str;

    /// `document.referrer`, if any
    fn referrer(&self) -> Option<&str>;

    /// `location.origin`, used to resolve router URLs
    fn origin(&self) -> &str;

    /// Text content of every element matching `selector`
    fn query_text(&self, selector: &str) -> Result<Vec<String>, TrackerError>;

    /// All keys in a storage area
    fn storage_keys(&self, area: StorageArea) -> Result<Vec<String>, TrackerError>;

    /// One storage value
    fn storage_item(&self, area: StorageArea, key: &str) -> Result<Option<String>, TrackerError>;

    /// Every form currently in the document
    fn forms(&self) -> Vec<FormElement>;

    /// Whether the focused element is inside `form`
    fn focus_within(&self, form: &FormElement) -> bool;
}

/// Snapshot of a `<form>` element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormElement {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Raw `class` attribute
    pub class_name: String,
    pub aria_label: Option<String>,
    /// Text of the first `<legend>` child
    pub legend: Option<String>,
    pub action: Option<String>,
    /// Class tokens of every ancestor element
    pub ancestor_classes: Vec<String>,
    /// Names of `data-*` attributes present on the form
    pub data_attributes: Vec<String>,
}

impl FormElement {
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.class_name.split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// `Element.closest('.class')`: the form itself or any ancestor
    pub fn closest_has_class(&self, class: &str) -> bool {
        self.has_class(class) || self.ancestor_classes.iter().any(|c| c == class)
    }

    pub fn has_data_attribute(&self, name: &str) -> bool {
        self.data_attributes.iter().any(|a| a == name)
    }
}

/// Snapshot of a focusable field inside a form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldElement {
    /// Tag name as reported by the DOM (`INPUT`, `SELECT`, ...)
    pub tag: String,
    pub name: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    pub placeholder: Option<String>,
}

/// The nearest clickable ancestor of a click target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickTarget {
    pub tag: String,
    pub text: String,
    pub id: Option<String>,
    pub class_name: String,
    pub aria_label: Option<String>,
    pub href: Option<String>,
    pub role: Option<String>,
}

impl ClickTarget {
    /// Matches `button, a, [role="button"]`
    pub fn is_actionable(&self) -> bool {
        self.is_link_or_button() || self.role.as_deref() == Some("button")
    }

    /// Matches `a, button`
    pub fn is_link_or_button(&self) -> bool {
        matches!(self.tag.to_ascii_lowercase().as_str(), "a" | "button")
    }
}

/// First value that is present and non-empty
pub(crate) fn first_present<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates.iter().flatten().copied().find(|v| !v.is_empty())
}
