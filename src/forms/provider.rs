//! Form plugin fingerprinting
//!
//! Classification is ordered: container classes first (most reliable), then
//! the form's own classes, then data attributes, then generic builders.

use crate::page::FormElement;
use crate::types::FormProvider;

/// Containers checked with `closest()` before anything else
const CONTAINER_SIGNATURES: &[(&[&str], FormProvider)] = &[
    (&["wpcf7"], FormProvider::ContactForm7),
    (&["gform_wrapper"], FormProvider::GravityForms),
    (&["wpforms-container", "wpforms-form"], FormProvider::WpForms),
    (&["forminator-form"], FormProvider::Forminator),
    (&["nf-form-cont"], FormProvider::NinjaForms),
    (&["caldera-form"], FormProvider::CalderaForms),
    (&["fluentform"], FormProvider::FluentForms),
];

/// Classes on the form element itself
const CLASS_SIGNATURES: &[(&[&str], FormProvider)] = &[
    (&["wpcf7-form"], FormProvider::ContactForm7),
    (&["gform_wrapper", "gravity-form"], FormProvider::GravityForms),
    (&["wpforms-form"], FormProvider::WpForms),
    (&["forminator-form"], FormProvider::Forminator),
];

/// Embedded third-party builders, checked last
const BUILDER_SIGNATURES: &[(&[&str], FormProvider)] = &[
    (&["hubspot-form"], FormProvider::HubSpot),
    (&["mailchimp-form"], FormProvider::Mailchimp),
    (&["typeform-form"], FormProvider::Typeform),
];

/// Classify the plugin that rendered `form`
pub fn detect_form_provider(form: &FormElement) -> FormProvider {
    let by_container = CONTAINER_SIGNATURES.iter().find(|(classes, _)| {
        classes.iter().any(|class| form.closest_has_class(class))
    });
    if let Some((_, provider)) = by_container {
        return *provider;
    }

    let by_class = CLASS_SIGNATURES
        .iter()
        .find(|(classes, _)| classes.iter().any(|class| form.has_class(class)));
    if let Some((_, provider)) = by_class {
        return *provider;
    }

    if form.has_data_attribute("data-formid") && form.class_name.contains("wpforms") {
        return FormProvider::WpForms;
    }

    BUILDER_SIGNATURES
        .iter()
        .find(|(classes, _)| classes.iter().any(|class| form.closest_has_class(class)))
        .map(|(_, provider)| *provider)
        .unwrap_or(FormProvider::Native)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_with(class_name: &str, ancestors: &[&str]) -> FormElement {
        FormElement {
            class_name: class_name.to_string(),
            ancestor_classes: ancestors.iter().map(|c| c.to_string()).collect(),
            ..FormElement::default()
        }
    }

    #[test]
    fn test_container_wins_over_own_classes() {
        let form = form_with("gravity-form wpforms-form", &["wpcf7"]);
        assert_eq!(detect_form_provider(&form), FormProvider::ContactForm7);
    }

    #[test]
    fn test_own_class_signature() {
        let form = form_with("gravity-form", &["site-main"]);
        assert_eq!(detect_form_provider(&form), FormProvider::GravityForms);
    }

    #[test]
    fn test_data_attribute_signature() {
        let mut form = form_with("my-wpforms-variant", &[]);
        form.data_attributes.push("data-formid".to_string());
        assert_eq!(detect_form_provider(&form), FormProvider::WpForms);

        form.class_name = "plain".to_string();
        assert_eq!(detect_form_provider(&form), FormProvider::Native);
    }

    #[test]
    fn test_builder_signatures() {
        let form = form_with("", &["footer", "hubspot-form"]);
        assert_eq!(detect_form_provider(&form), FormProvider::HubSpot);
    }

    #[test]
    fn test_unrecognized_form_is_native() {
        let form = form_with("newsletter signup", &["footer"]);
        assert_eq!(detect_form_provider(&form), FormProvider::Native);
    }
}
