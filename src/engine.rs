//! Tracker engine
//!
//! [`Tracker`] is the per-page context object. It owns the checkout
//! correlator, the form tracker, the scroll-depth set, the delivery layer and
//! the timer queue, and it is the single dispatch point for [`Signal`]s.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use conversion_flux::{OutboxTransport, PageSnapshot, Signal, Tracker, TrackerConfig};
//!
//! let outbox = OutboxTransport::new();
//! let config = TrackerConfig::with_api_key("key-123", "shop.test");
//! let mut tracker = Tracker::new(config, Box::new(outbox.clone())).unwrap();
//!
//! let page = PageSnapshot::at("/checkout");
//! let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
//! tracker.handle(Signal::Load, &page, now);
//!
//! assert_eq!(tracker.checkout().active_count(), 1);
//! assert_eq!(outbox.len(), 2);
//! ```

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::activity::{
    click_event, page_info, page_view_event, scroll_event, scroll_id_prefix, scroll_percent,
    ScrollDepth,
};
use crate::checkout::{
    detect_completion, is_checkout_form, is_checkout_page, is_purchase_intent, is_success_page,
    CheckoutCorrelator,
};
use crate::config::TrackerConfig;
use crate::delivery::{checkout_id, Delivery, Transport};
use crate::error::TrackerError;
use crate::forms::{FormSignal, FormTracker};
use crate::page::{ClickTarget, FormElement, Page};
use crate::scheduler::{Scheduler, Task};
use crate::signal::{CustomDetail, CustomEvent, Signal};
use crate::types::{CheckoutMethod, Event};

/// Per-page instrumentation context
pub struct Tracker {
    config: TrackerConfig,
    delivery: Delivery,
    checkout: CheckoutCorrelator,
    forms: FormTracker,
    scroll: ScrollDepth,
    scheduler: Scheduler,
    loaded: bool,
    closed: bool,
}

impl Tracker {
    /// Build a tracker. Fails without a usable API key, in which case the
    /// page must stay uninstrumented.
    pub fn new(config: TrackerConfig, transport: Box<dyn Transport>) -> Result<Self, TrackerError> {
        config.validate()?;
        let api_key = match config.resolved_api_key() {
            Some(key) => key.to_string(),
            None => {
                warn!("API key not found; tracking disabled");
                return Err(TrackerError::MissingApiKey);
            }
        };

        Ok(Self {
            delivery: Delivery::from_config(&config, api_key, transport),
            checkout: CheckoutCorrelator::new(
                "",
                config.activation_debounce_ms,
                config.session_ttl_ms,
            ),
            forms: FormTracker::new(config.max_label_len),
            scroll: ScrollDepth::new(),
            scheduler: Scheduler::new(),
            loaded: false,
            closed: false,
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn checkout(&self) -> &CheckoutCorrelator {
        &self.checkout
    }

    pub fn forms(&self) -> &FormTracker {
        &self.forms
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Whether an `Unload` has been handled
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// When [`Tracker::advance`] next has work to do
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.scheduler
            .next_due()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Shorthand for handling [`Signal::Load`]
    pub fn start(&mut self, page: &dyn Page, now: DateTime<Utc>) {
        self.handle(Signal::Load, page, now);
    }

    // ========================================================================
    // Signal dispatch
    // ========================================================================

    /// Route one signal to the handlers that care about it
    pub fn handle(&mut self, signal: Signal, page: &dyn Page, now: DateTime<Utc>) {
        if self.closed {
            debug!(signal = signal.name(), "tracker closed, ignoring signal");
            return;
        }

        match signal {
            Signal::Load => self.on_load(page, now),
            Signal::Poll => self.on_poll(page, now),
            Signal::PopState => self.on_pop_state(page, now),
            Signal::RouteChangeComplete { url } => self.on_route_change(&url, page, now),
            Signal::DomMutation { added_forms } => self.on_dom_mutation(&added_forms, page, now),
            Signal::Custom { name, detail } => self.on_custom(&name, detail, page, now),
            Signal::Submit { form } => self.on_submit(&form, page, now),
            Signal::Click { target } => self.on_click(&target, page, now),
            Signal::FocusIn { form, field } => {
                for transition in self.forms.focus_in(&form, &field, now.timestamp_millis()) {
                    self.emit_form(transition, page, now);
                }
            }
            Signal::FocusOut { form } => {
                self.scheduler.schedule_after(
                    Task::AbandonCheck { form },
                    now.timestamp_millis(),
                    self.config.abandon_check_delay_ms,
                );
            }
            Signal::Invalid { form, field } => {
                let transition = self.forms.field_error(&form, &field);
                self.emit_form(transition, page, now);
            }
            Signal::Scroll {
                scroll_y,
                viewport_height,
                document_height,
            } => self.on_scroll(scroll_y, viewport_height, document_height, page, now),
            Signal::Unload => self.on_unload(),
        }
    }

    /// Run every task due at or before `now`, each at its own due time
    pub fn advance(&mut self, page: &dyn Page, now: DateTime<Utc>) {
        while !self.closed {
            let Some((due_ms, task)) = self.scheduler.pop_due(now.timestamp_millis()) else {
                break;
            };
            let at = Utc.timestamp_millis_opt(due_ms).single().unwrap_or(now);
            self.run_task(task, due_ms, page, at);
        }
    }

    fn run_task(&mut self, task: Task, due_ms: i64, page: &dyn Page, at: DateTime<Utc>) {
        match &task {
            Task::Poll => self.on_poll(page, at),
            Task::FallbackCheck => {
                if self.checkout.has_active() {
                    self.check_for_checkout_completion(page, at);
                }
            }
            Task::SessionGc => {
                let dropped = self.checkout.collect_garbage(due_ms);
                if dropped > 0 {
                    info!(dropped, "expired checkout sessions");
                }
            }
            Task::CompletionCheck => self.check_for_checkout_completion(page, at),
            Task::AbandonCheck { form } => self.abandon_check(form, page, at),
            Task::PurgeForm { form_id } => self.forms.purge(form_id),
        }

        let interval = match task {
            Task::Poll => Some(self.config.poll_interval_ms),
            Task::FallbackCheck => Some(self.config.fallback_check_interval_ms),
            Task::SessionGc => Some(self.config.gc_interval_ms),
            _ => None,
        };
        if let Some(interval) = interval {
            self.scheduler.schedule_after(task, due_ms, interval);
        }
    }

    // ========================================================================
    // Navigation producers
    // ========================================================================

    fn on_load(&mut self, page: &dyn Page, now: DateTime<Utc>) {
        if self.loaded {
            debug!("duplicate load signal ignored");
            return;
        }
        self.loaded = true;

        let path = page.path().to_string();
        self.checkout.set_last_path(path.clone());
        if is_checkout_page(&path) {
            self.activate_checkout(&path, CheckoutMethod::Url, page, now);
        }
        self.check_for_checkout_completion(page, now);

        let event = page_view_event(page, self.delivery.event_id("page", now), now);
        self.emit(event, now);

        for form in page.forms() {
            self.view_form(&form, page, now);
        }

        let now_ms = now.timestamp_millis();
        self.scheduler
            .schedule_after(Task::Poll, now_ms, self.config.poll_interval_ms);
        self.scheduler.schedule_after(
            Task::FallbackCheck,
            now_ms,
            self.config.fallback_check_interval_ms,
        );
        self.scheduler
            .schedule_after(Task::SessionGc, now_ms, self.config.gc_interval_ms);
    }

    fn on_poll(&mut self, page: &dyn Page, now: DateTime<Utc>) {
        let path = page.path().to_string();
        if path == self.checkout.last_path() {
            return;
        }
        if is_checkout_page(&path) {
            self.activate_checkout(&path, CheckoutMethod::Url, page, now);
        }
        self.check_for_checkout_completion(page, now);
        self.checkout.set_last_path(path);
    }

    fn on_pop_state(&mut self, page: &dyn Page, now: DateTime<Utc>) {
        let path = page.path().to_string();
        if is_checkout_page(&path) {
            self.activate_checkout(&path, CheckoutMethod::Url, page, now);
        }
        self.check_for_checkout_completion(page, now);
        self.checkout.set_last_path(path);
    }

    fn on_route_change(&mut self, url: &str, page: &dyn Page, now: DateTime<Utc>) {
        let path = match resolve_path(page.origin(), url) {
            Ok(path) => path,
            Err(e) => {
                debug!(url, error = %e, "unresolvable route url");
                return;
            }
        };

        if is_checkout_page(&path) {
            self.activate_checkout(&path, CheckoutMethod::Router, page, now);
        }
        if is_success_page(&path) || is_checkout_page(self.checkout.last_path()) {
            self.check_for_checkout_completion(page, now);
        }
        self.checkout.set_last_path(path);
    }

    fn on_dom_mutation(&mut self, added_forms: &[FormElement], page: &dyn Page, now: DateTime<Utc>) {
        for form in added_forms {
            self.view_form(form, page, now);
        }
        if self.checkout.has_active() {
            self.check_for_checkout_completion(page, now);
        }
    }

    fn on_custom(&mut self, name: &str, detail: CustomDetail, page: &dyn Page, now: DateTime<Utc>) {
        let event: CustomEvent = match name.parse() {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "ignoring custom event");
                return;
            }
        };

        let path = detail
            .path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| page.path().to_string());
        let checkout_id = match event {
            CustomEvent::CheckoutComplete => detail.checkout_id.filter(|id| !id.is_empty()),
            _ => None,
        };

        if event.is_completion() {
            self.complete_checkout(
                &path,
                CheckoutMethod::CustomEvent,
                checkout_id.as_deref(),
                page,
                now,
            );
        } else {
            self.activate_checkout(&path, CheckoutMethod::CustomEvent, page, now);
        }
    }

    // ========================================================================
    // DOM input producers
    // ========================================================================

    fn on_submit(&mut self, form: &FormElement, page: &dyn Page, now: DateTime<Utc>) {
        let path = page.path().to_string();
        if is_checkout_form(form, &path) {
            if !is_checkout_page(&path) {
                self.activate_checkout(&path, CheckoutMethod::Form, page, now);
            }
            self.scheduler.schedule_after(
                Task::CompletionCheck,
                now.timestamp_millis(),
                self.config.submit_check_delay_ms,
            );
        }

        let transition = self.forms.submit(form, now.timestamp_millis());
        self.emit_form(transition, page, now);
    }

    fn on_click(&mut self, target: &ClickTarget, page: &dyn Page, now: DateTime<Utc>) {
        if is_purchase_intent(target) {
            let path = page.path().to_string();
            self.activate_checkout(&path, CheckoutMethod::Click, page, now);
            self.scheduler.schedule_after(
                Task::CompletionCheck,
                now.timestamp_millis(),
                self.config.click_check_delay_ms,
            );
        }

        let event_id = self.delivery.event_id("click", now);
        if let Some(event) = click_event(target, page, event_id, now, self.config.max_label_len) {
            self.emit(event, now);
        }
    }

    fn on_scroll(
        &mut self,
        scroll_y: f64,
        viewport_height: f64,
        document_height: f64,
        page: &dyn Page,
        now: DateTime<Utc>,
    ) {
        let Some(percent) = scroll_percent(scroll_y, viewport_height, document_height) else {
            return;
        };
        for mark in self.scroll.crossed(percent) {
            let event_id = self.delivery.event_id(&scroll_id_prefix(mark), now);
            self.emit(scroll_event(mark, page, event_id, now), now);
        }
    }

    fn on_unload(&mut self) {
        let pending = self.scheduler.len();
        self.scheduler.clear();
        self.closed = true;
        info!(
            pending,
            active_checkouts = self.checkout.active_count(),
            "tracker torn down"
        );
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// URL, then DOM, then storage. The first positive completes a checkout.
    pub fn check_for_checkout_completion(&mut self, page: &dyn Page, now: DateTime<Utc>) {
        if let Some(method) = detect_completion(page) {
            let path = page.path().to_string();
            self.complete_checkout(&path, method, None, page, now);
        }
    }

    fn activate_checkout(
        &mut self,
        path: &str,
        method: CheckoutMethod,
        page: &dyn Page,
        now: DateTime<Utc>,
    ) {
        let Some(session) =
            self.checkout
                .activate(checkout_id(now), path, method, now.timestamp_millis())
        else {
            debug!(path, "checkout activation debounced");
            return;
        };

        info!(
            checkout_id = %session.checkout_id,
            path,
            method = method.as_str(),
            "checkout activated"
        );
        let event_id = self.delivery.event_id("checkout-activate", now);
        let event = session.activation_event(event_id, now, page.title());
        self.emit(event, now);
    }

    fn complete_checkout(
        &mut self,
        success_path: &str,
        method: CheckoutMethod,
        checkout_id: Option<&str>,
        page: &dyn Page,
        now: DateTime<Utc>,
    ) {
        let Some(completion) =
            self.checkout
                .complete(success_path, method, checkout_id, now.timestamp_millis())
        else {
            debug!(success_path, "completion already recorded");
            return;
        };

        info!(
            checkout_id = completion.checkout_id(),
            success_path,
            method = method.as_str(),
            time_to_complete = ?completion.time_to_complete,
            "checkout completed"
        );
        let event_id = self.delivery.event_id("checkout-complete", now);
        let event = completion.completion_event(event_id, now, page.title());
        self.emit(event, now);
    }

    // ========================================================================
    // Forms
    // ========================================================================

    fn view_form(&mut self, form: &FormElement, page: &dyn Page, now: DateTime<Utc>) {
        if let Some(transition) = self.forms.view(form) {
            self.emit_form(transition, page, now);
        }
    }

    fn abandon_check(&mut self, form: &FormElement, page: &dyn Page, now: DateTime<Utc>) {
        if page.focus_within(form) {
            return;
        }
        let Some(transition) = self.forms.abandon(form, now.timestamp_millis()) else {
            return;
        };
        let form_id = transition.form.form_id.clone();
        self.emit_form(transition, page, now);
        self.scheduler.schedule_after(
            Task::PurgeForm { form_id },
            now.timestamp_millis(),
            self.config.abandon_grace_ms,
        );
    }

    fn emit_form(&mut self, transition: FormSignal, page: &dyn Page, now: DateTime<Utc>) {
        let event_id = self
            .delivery
            .event_id(transition.event_type.id_prefix(), now);
        let mut event = Event::new(transition.event_type, event_id, now, page_info(page))
            .with_form(transition.form);
        event.element = transition.element;
        self.emit(event, now);
    }

    fn emit(&mut self, event: Event, now: DateTime<Utc>) -> bool {
        self.delivery.send(event, now)
    }
}

/// `new URL(url, origin).pathname`
fn resolve_path(origin: &str, url: &str) -> Result<String, url::ParseError> {
    let base = Url::parse(origin)?;
    Ok(base.join(url)?.path().to_string())
}
