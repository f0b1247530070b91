//! Serializable page snapshot
//!
//! [`PageSnapshot`] is a self-contained [`Page`] implementation used by trace
//! replay, the FFI surface and tests. The host serializes what it can see of
//! the document; selector queries are answered from the captured elements.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::forms::interaction_id;
use crate::page::selector::SimpleSelector;
use crate::page::{FormElement, Page, StorageArea};

/// A captured element that may be matched by detector selectors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementSnapshot {
    pub tag: String,
    pub id: Option<String>,
    pub class_name: String,
    /// Other attributes (`data-status`, `aria-label`, ...)
    pub attributes: HashMap<String, String>,
    /// `textContent`
    pub text: String,
}

impl ElementSnapshot {
    fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "class" => Some(self.class_name.as_str()),
            "id" => self.id.as_deref(),
            other => self.attributes.get(other).map(String::as_str),
        }
    }

    fn matches(&self, selector: &SimpleSelector) -> bool {
        selector.matches(self.class_name.split_whitespace(), |name| {
            self.attribute(name)
        })
    }
}

/// Everything the engine may ask of a page, captured at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSnapshot {
    pub path: String,
    pub title: String,
    pub referrer: Option<String>,
    pub origin: String,
    pub elements: Vec<ElementSnapshot>,
    pub forms: Vec<FormElement>,
    pub local_storage: BTreeMap<String, String>,
    pub session_storage: BTreeMap<String, String>,
    /// `false` models private-browsing style storage failures
    pub storage_available: bool,
    /// Interaction id of the form holding focus, if any
    pub focused_form_id: Option<String>,
}

impl Default for PageSnapshot {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            title: String::new(),
            referrer: None,
            origin: "http://localhost".to_string(),
            elements: Vec::new(),
            forms: Vec::new(),
            local_storage: BTreeMap::new(),
            session_storage: BTreeMap::new(),
            storage_available: true,
            focused_form_id: None,
        }
    }
}

impl PageSnapshot {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_element(mut self, element: ElementSnapshot) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_form(mut self, form: FormElement) -> Self {
        self.forms.push(form);
        self
    }

    pub fn navigate(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn focus_form(&mut self, form: Option<&FormElement>) {
        self.focused_form_id = form.map(interaction_id);
    }

    fn area(&self, area: StorageArea) -> Result<&BTreeMap<String, String>, TrackerError> {
        if !self.storage_available {
            return Err(TrackerError::StorageUnavailable(format!("{:?}", area)));
        }
        Ok(match area {
            StorageArea::Local => &self.local_storage,
            StorageArea::Session => &self.session_storage,
        })
    }
}

impl Page for PageSnapshot {
    fn path(&self) -> &str {
        &self.path
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn query_text(&self, selector: &str) -> Result<Vec<String>, TrackerError> {
        let selector: SimpleSelector = selector.parse()?;
        Ok(self
            .elements
            .iter()
            .filter(|element| element.matches(&selector))
            .map(|element| element.text.clone())
            .collect())
    }

    fn storage_keys(&self, area: StorageArea) -> Result<Vec<String>, TrackerError> {
        Ok(self.area(area)?.keys().cloned().collect())
    }

    fn storage_item(&self, area: StorageArea, key: &str) -> Result<Option<String>, TrackerError> {
        Ok(self.area(area)?.get(key).cloned())
    }

    fn forms(&self) -> Vec<FormElement> {
        self.forms.clone()
    }

    fn focus_within(&self, form: &FormElement) -> bool {
        self.focused_form_id.as_deref() == Some(interaction_id(form).as_str())
    }
}
