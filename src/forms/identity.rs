//! Best-effort identity for forms and fields
//!
//! Pages rarely give forms stable ids, so identity is the first present value
//! from a fixed priority list. The resolvers here are pure and deterministic;
//! random fallbacks are left to the caller.

use crate::page::{first_present, FieldElement, FormElement};

/// Fallback name when nothing on the form describes it
pub const UNTITLED_FORM: &str = "Untitled Form";

/// Fallback field identity
pub const UNKNOWN_FIELD: &str = "unknown";

/// Form identity: `id`, then `name`, then the first class token
pub fn resolve_form_id(form: &FormElement) -> Option<String> {
    first_present(&[
        form.id.as_deref(),
        form.name.as_deref(),
        form.classes().next(),
    ])
    .map(str::to_string)
}

/// Human-readable form name: `name`, `aria-label`, `id`, then the legend text
pub fn resolve_form_name(form: &FormElement) -> String {
    let legend = form.legend.as_deref().map(str::trim);
    first_present(&[
        form.name.as_deref(),
        form.aria_label.as_deref(),
        form.id.as_deref(),
        legend,
    ])
    .unwrap_or(UNTITLED_FORM)
    .to_string()
}

/// Field identity used for start tracking and the focused-field set
pub fn resolve_field_name(field: &FieldElement) -> String {
    first_present(&[
        field.name.as_deref(),
        field.id.as_deref(),
        field.input_type.as_deref(),
    ])
    .unwrap_or(UNKNOWN_FIELD)
    .to_string()
}

/// Field label reported with validation errors; also falls back to the placeholder
pub fn resolve_field_label(field: &FieldElement) -> String {
    first_present(&[
        field.name.as_deref(),
        field.id.as_deref(),
        field.input_type.as_deref(),
        field.placeholder.as_deref(),
    ])
    .unwrap_or(UNKNOWN_FIELD)
    .to_string()
}
