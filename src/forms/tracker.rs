//! Per-form lifecycle state
//!
//! `Unobserved → Viewed → Started → {Submitted | Abandoned}`. A form only
//! holds state between its first focus and its submit (or the end of the
//! abandon grace window). Transitions return [`FormSignal`]s; turning them
//! into envelopes is the caller's job.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::delivery::ids::{random_token, RANDOM_FRAGMENT_LEN};
use crate::forms::identity::{
    resolve_field_label, resolve_field_name, resolve_form_id, resolve_form_name,
};
use crate::forms::provider::detect_form_provider;
use crate::page::{FieldElement, FormElement};
use crate::types::{elapsed_secs, truncate_label, ElementInfo, EventType, FormInfo, FormProvider};

/// Key used for forms with no usable identity once they are interacted with
pub const UNKNOWN_FORM: &str = "form-unknown";

/// A started, not yet submitted form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub form_id: String,
    /// Unix milliseconds
    pub start_time: i64,
    pub first_field: String,
    pub form_name: String,
    pub provider: FormProvider,
}

/// A lifecycle transition to report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSignal {
    pub event_type: EventType,
    pub form: FormInfo,
    pub element: Option<ElementInfo>,
}

impl FormSignal {
    fn new(event_type: EventType, form: FormInfo) -> Self {
        Self {
            event_type,
            form,
            element: None,
        }
    }
}

/// Viewed set, started table and focused-field sets for one page
#[derive(Debug, Clone)]
pub struct FormTracker {
    started: HashMap<String, FormState>,
    focused_fields: HashMap<String, HashSet<String>>,
    viewed: HashSet<String>,
    max_label_len: usize,
}

impl FormTracker {
    pub fn new(max_label_len: usize) -> Self {
        Self {
            started: HashMap::new(),
            focused_fields: HashMap::new(),
            viewed: HashSet::new(),
            max_label_len,
        }
    }

    pub fn state(&self, form_id: &str) -> Option<&FormState> {
        self.started.get(form_id)
    }

    pub fn is_viewed(&self, form_id: &str) -> bool {
        self.viewed.contains(form_id)
    }

    /// Distinct fields focused in a form since its state was created
    pub fn fields_completed(&self, form_id: &str) -> usize {
        self.focused_fields.get(form_id).map_or(0, HashSet::len)
    }

    fn info(&self, form_id: String, form_name: &str, provider: FormProvider) -> FormInfo {
        FormInfo {
            form_id,
            form_name: truncate_label(form_name, self.max_label_len),
            provider,
            first_field: None,
            time_to_complete: None,
            time_spent: None,
            fields_completed: None,
        }
    }

    /// First discovery of a form. Forms without identity get a random id, so
    /// they are re-reported on every scan.
    pub fn view(&mut self, form: &FormElement) -> Option<FormSignal> {
        let form_id = resolve_form_id(form)
            .unwrap_or_else(|| format!("form-{}", random_token(RANDOM_FRAGMENT_LEN)));
        self.view_as(form, form_id)
    }

    fn view_as(&mut self, form: &FormElement, form_id: String) -> Option<FormSignal> {
        if !self.viewed.insert(form_id.clone()) {
            return None;
        }
        let info = self.info(form_id, &resolve_form_name(form), detect_form_provider(form));
        Some(FormSignal::new(EventType::FormView, info))
    }

    /// A field inside `form` gained focus. May report a view (if an
    /// identified form was never seen) and a start (if the form has no state).
    ///
    /// Anonymous forms are only viewed by [`FormTracker::view`], under a random
    /// id that focus can never recover.
    pub fn focus_in(
        &mut self,
        form: &FormElement,
        field: &FieldElement,
        now_ms: i64,
    ) -> Vec<FormSignal> {
        let form_id = interaction_id(form);
        let field_name = resolve_field_name(field);
        let mut signals = Vec::new();

        if resolve_form_id(form).is_some() && !self.viewed.contains(&form_id) {
            signals.extend(self.view_as(form, form_id.clone()));
        }

        if !self.started.contains_key(&form_id) {
            let state = FormState {
                form_id: form_id.clone(),
                start_time: now_ms,
                first_field: field_name.clone(),
                form_name: resolve_form_name(form),
                provider: detect_form_provider(form),
            };
            let mut info = self.info(form_id.clone(), &state.form_name, state.provider);
            info.first_field = Some(state.first_field.clone());
            self.started.insert(form_id.clone(), state);
            signals.push(FormSignal::new(EventType::FormStart, info));
        }

        self.focused_fields
            .entry(form_id)
            .or_default()
            .insert(field_name);

        signals
    }

    /// The form was submitted. Always reports; clears state.
    pub fn submit(&mut self, form: &FormElement, now_ms: i64) -> FormSignal {
        let form_id = interaction_id(form);
        let state = self.started.remove(&form_id);
        let fields = self
            .focused_fields
            .remove(&form_id)
            .map_or(0, |set| set.len());

        let (form_name, provider) = match &state {
            Some(state) => (state.form_name.clone(), state.provider),
            None => (resolve_form_name(form), detect_form_provider(form)),
        };

        let mut info = self.info(form_id, &form_name, provider);
        info.time_to_complete = Some(state.map(|s| elapsed_secs(s.start_time, now_ms)));
        info.fields_completed = (fields > 0).then_some(fields);
        FormSignal::new(EventType::FormSubmit, info)
    }

    /// Focus left a started form. State is kept; the caller schedules the purge.
    pub fn abandon(&self, form: &FormElement, now_ms: i64) -> Option<FormSignal> {
        let form_id = interaction_id(form);
        let state = self.started.get(&form_id)?;
        let fields = self.fields_completed(&form_id);

        let mut info = self.info(form_id, &state.form_name, state.provider);
        info.time_spent = Some(elapsed_secs(state.start_time, now_ms));
        info.fields_completed = (fields > 0).then_some(fields);
        Some(FormSignal::new(EventType::FormAbandon, info))
    }

    /// End of a grace window. Idempotent.
    pub fn purge(&mut self, form_id: &str) {
        self.started.remove(form_id);
        self.focused_fields.remove(form_id);
    }

    /// Native validation failure on `field`. No state changes.
    pub fn field_error(&self, form: &FormElement, field: &FieldElement) -> FormSignal {
        let form_id = interaction_id(form);
        let (form_name, provider) = match self.started.get(&form_id) {
            Some(state) => (state.form_name.clone(), state.provider),
            None => (resolve_form_name(form), detect_form_provider(form)),
        };

        let element = ElementInfo {
            kind: field.tag.to_lowercase(),
            label: truncate_label(&resolve_field_label(field), self.max_label_len),
            selector: None,
            href: None,
        };
        FormSignal {
            event_type: EventType::FormFieldError,
            form: self.info(form_id, &form_name, provider),
            element: Some(element),
        }
    }
}

/// Identity for start/submit/abandon/error, with a fixed fallback
pub fn interaction_id(form: &FormElement) -> String {
    resolve_form_id(form).unwrap_or_else(|| UNKNOWN_FORM.to_string())
}
