//! Checkout session correlation
//!
//! Activations open sessions; completions close the matching one. The table
//! only ever holds sessions whose completion has not been matched yet.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{elapsed_secs, CheckoutInfo, CheckoutMethod, Event, EventType, PageInfo};

/// Reported checkout id when a completion matches no session
pub const UNKNOWN_CHECKOUT: &str = "unknown";

/// One logical checkout attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub checkout_id: String,
    /// Unix milliseconds
    pub start_time: i64,
    pub checkout_path: String,
    pub method: CheckoutMethod,
    #[serde(skip)]
    sequence: u64,
}

impl CheckoutSession {
    /// The `checkout_activate` envelope for this session
    pub fn activation_event(&self, event_id: String, now: DateTime<Utc>, title: &str) -> Event {
        Event::new(
            EventType::CheckoutActivate,
            event_id,
            now,
            PageInfo {
                path: self.checkout_path.clone(),
                title: title.to_string(),
                referrer_path: None,
            },
        )
        .with_checkout(CheckoutInfo {
            checkout_id: self.checkout_id.clone(),
            method: self.method,
            time_to_complete: None,
            checkout_path: None,
        })
    }
}

/// A resolved completion, matched or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub success_path: String,
    pub method: CheckoutMethod,
    /// The session that completed, already removed from the active table
    pub session: Option<CheckoutSession>,
    pub time_to_complete: Option<u64>,
}

impl Completion {
    pub fn checkout_id(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.checkout_id.as_str())
            .unwrap_or(UNKNOWN_CHECKOUT)
    }

    /// The `checkout_complete` envelope
    pub fn completion_event(&self, event_id: String, now: DateTime<Utc>, title: &str) -> Event {
        Event::new(
            EventType::CheckoutComplete,
            event_id,
            now,
            PageInfo {
                path: self.success_path.clone(),
                title: title.to_string(),
                referrer_path: None,
            },
        )
        .with_checkout(CheckoutInfo {
            checkout_id: self.checkout_id().to_string(),
            method: self.method,
            time_to_complete: Some(self.time_to_complete),
            checkout_path: Some(self.session.as_ref().map(|s| s.checkout_path.clone())),
        })
    }
}

/// Active and completed checkout tables
#[derive(Debug, Clone)]
pub struct CheckoutCorrelator {
    active: HashMap<String, CheckoutSession>,
    completed: HashSet<String>,
    last_path: String,
    debounce_ms: i64,
    ttl_ms: i64,
    next_sequence: u64,
}

impl CheckoutCorrelator {
    pub fn new(initial_path: impl Into<String>, debounce_ms: u64, ttl_ms: u64) -> Self {
        Self {
            active: HashMap::new(),
            completed: HashSet::new(),
            last_path: initial_path.into(),
            debounce_ms: debounce_ms as i64,
            ttl_ms: ttl_ms as i64,
            next_sequence: 0,
        }
    }

    /// Last path observed by the navigation producers
    pub fn last_path(&self) -> &str {
        &self.last_path
    }

    pub fn set_last_path(&mut self, path: impl Into<String>) {
        self.last_path = path.into();
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn session(&self, checkout_id: &str) -> Option<&CheckoutSession> {
        self.active.get(checkout_id)
    }

    /// Number of completion keys recorded so far
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Open a session for `path`, unless one for the same path started within
    /// the debounce window. Returns the new session.
    pub fn activate(
        &mut self,
        checkout_id: String,
        path: &str,
        method: CheckoutMethod,
        now_ms: i64,
    ) -> Option<CheckoutSession> {
        let recent = self
            .active
            .values()
            .any(|s| s.checkout_path == path && now_ms - s.start_time < self.debounce_ms);
        if recent {
            return None;
        }

        let session = CheckoutSession {
            checkout_id: checkout_id.clone(),
            start_time: now_ms,
            checkout_path: path.to_string(),
            method,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.active.insert(checkout_id, session.clone());
        Some(session)
    }

    /// Resolve a completion observed on `success_path`.
    ///
    /// The dedup key is `{path}-{now_ms}`, so only a repeat within the same
    /// millisecond is suppressed. An explicit id wins when it is still active;
    /// otherwise the most recently started session completes.
    pub fn complete(
        &mut self,
        success_path: &str,
        method: CheckoutMethod,
        checkout_id: Option<&str>,
        now_ms: i64,
    ) -> Option<Completion> {
        let completion_key = format!("{}-{}", success_path, now_ms);
        if !self.completed.insert(completion_key) {
            return None;
        }

        let matched_id = checkout_id
            .filter(|id| self.active.contains_key(*id))
            .map(str::to_string)
            .or_else(|| self.most_recent().map(|s| s.checkout_id.clone()));

        let session = matched_id.and_then(|id| self.active.remove(&id));
        let time_to_complete = session
            .as_ref()
            .map(|s| elapsed_secs(s.start_time, now_ms));

        Some(Completion {
            success_path: success_path.to_string(),
            method,
            session,
            time_to_complete,
        })
    }

    fn most_recent(&self) -> Option<&CheckoutSession> {
        self.active
            .values()
            .max_by_key(|s| (s.start_time, s.sequence))
    }

    /// Drop sessions older than the TTL. Returns how many were dropped.
    pub fn collect_garbage(&mut self, now_ms: i64) -> usize {
        let before = self.active.len();
        let ttl_ms = self.ttl_ms;
        self.active.retain(|_, s| now_ms - s.start_time <= ttl_ms);
        before - self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const T: i64 = 1_705_327_200_000;

    fn correlator() -> CheckoutCorrelator {
        CheckoutCorrelator::new("/", 5_000, 3_600_000)
    }

    #[test]
    fn test_activation_then_completion_after_twelve_seconds() {
        let mut c = correlator();
        let session = c
            .activate("checkout-a".to_string(), "/checkout", CheckoutMethod::Url, T)
            .unwrap();
        assert_eq!(session.start_time, T);

        let completion = c
            .complete("/thank-you", CheckoutMethod::Url, None, T + 12_000)
            .unwrap();
        assert_eq!(completion.checkout_id(), "checkout-a");
        assert_eq!(completion.time_to_complete, Some(12));
        assert_eq!(c.active_count(), 0);
    }

    #[test]
    fn test_same_path_debounced_within_window() {
        let mut c = correlator();
        assert!(c
            .activate("a".to_string(), "/checkout", CheckoutMethod::Url, T)
            .is_some());
        assert!(c
            .activate("b".to_string(), "/checkout", CheckoutMethod::Click, T + 4_999)
            .is_none());
        assert!(c
            .activate("c".to_string(), "/cart", CheckoutMethod::Url, T + 100)
            .is_some());
        assert!(c
            .activate("d".to_string(), "/checkout", CheckoutMethod::Url, T + 5_000)
            .is_some());
        assert_eq!(c.active_count(), 3);
    }

    #[test]
    fn test_completion_matches_most_recent_session() {
        let mut c = correlator();
        c.activate("old".to_string(), "/cart", CheckoutMethod::Url, T);
        c.activate("new".to_string(), "/checkout", CheckoutMethod::Url, T + 1_000);

        let completion = c
            .complete("/success", CheckoutMethod::Dom, None, T + 3_000)
            .unwrap();
        assert_eq!(completion.checkout_id(), "new");
        assert_eq!(completion.time_to_complete, Some(2));
        assert!(c.session("old").is_some());
    }

    #[test]
    fn test_same_start_time_prefers_later_activation() {
        let mut c = correlator();
        c.activate("first".to_string(), "/cart", CheckoutMethod::Url, T);
        c.activate("second".to_string(), "/checkout", CheckoutMethod::Url, T);

        let completion = c
            .complete("/success", CheckoutMethod::Url, None, T + 1)
            .unwrap();
        assert_eq!(completion.checkout_id(), "second");
    }

    #[test]
    fn test_explicit_checkout_id_wins_when_active() {
        let mut c = correlator();
        c.activate("old".to_string(), "/cart", CheckoutMethod::Url, T);
        c.activate("new".to_string(), "/checkout", CheckoutMethod::Url, T + 1_000);

        let completion = c
            .complete("/done", CheckoutMethod::CustomEvent, Some("old"), T + 2_000)
            .unwrap();
        assert_eq!(completion.checkout_id(), "old");

        let fallback = c
            .complete("/done", CheckoutMethod::CustomEvent, Some("gone"), T + 2_001)
            .unwrap();
        assert_eq!(fallback.checkout_id(), "new");
    }

    #[test]
    fn test_unmatched_completion_reports_unknown() {
        let mut c = correlator();
        let completion = c
            .complete("/thank-you", CheckoutMethod::Url, None, T)
            .unwrap();
        assert_eq!(completion.checkout_id(), UNKNOWN_CHECKOUT);
        assert_eq!(completion.time_to_complete, None);

        let now = Utc.timestamp_millis_opt(T).unwrap();
        let event = completion.completion_event("id".to_string(), now, "Thanks");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["checkout"]["checkoutId"], "unknown");
        assert!(value["checkout"]["timeToComplete"].is_null());
        assert!(value["checkout"]["checkoutPath"].is_null());
    }

    #[test]
    fn test_completion_key_only_blocks_same_millisecond() {
        let mut c = correlator();
        assert!(c.complete("/success", CheckoutMethod::Url, None, T).is_some());
        assert!(c.complete("/success", CheckoutMethod::Url, None, T).is_none());
        assert!(c.complete("/success", CheckoutMethod::Url, None, T + 1).is_some());
        assert_eq!(c.completed_count(), 2);
    }

    #[test]
    fn test_garbage_collection_drops_sessions_past_ttl() {
        let mut c = correlator();
        c.activate("stale".to_string(), "/cart", CheckoutMethod::Url, T);
        c.activate("fresh".to_string(), "/checkout", CheckoutMethod::Url, T + 60_000);

        assert_eq!(c.collect_garbage(T + 3_600_000), 0);
        assert_eq!(c.collect_garbage(T + 3_600_001), 1);
        assert!(c.session("stale").is_none());
        assert!(c.session("fresh").is_some());
    }

    #[test]
    fn test_activation_event_shape() {
        let mut c = correlator();
        let session = c
            .activate("checkout-x".to_string(), "/checkout", CheckoutMethod::Form, T)
            .unwrap();
        let now = Utc.timestamp_millis_opt(T).unwrap();
        let event = session.activation_event("evt".to_string(), now, "Checkout");

        assert_eq!(event.event_type, "checkout_activate");
        assert_eq!(event.page.path, "/checkout");
        let checkout = event.checkout.unwrap();
        assert_eq!(checkout.checkout_id, "checkout-x");
        assert_eq!(checkout.method, CheckoutMethod::Form);
        assert_eq!(checkout.time_to_complete, None);
    }
}
