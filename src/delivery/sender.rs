//! Envelope validation, duplicate suppression and dispatch

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::delivery::ids::EventIdGenerator;
use crate::delivery::transport::{DeliveryRequest, Transport};
use crate::error::TrackerError;
use crate::types::{format_timestamp, Event};

/// Primary site-identifier header
pub const SITE_HEADER: &str = "X-CIQ-Domain";

/// Legacy duplicate of [`SITE_HEADER`]
pub const LEGACY_SITE_HEADER: &str = "X-WPCM-Domain";

static ISO_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}")
        .expect("timestamp pattern is valid")
});

/// Whether `value` starts like an ISO-8601 date-time
pub fn is_iso_timestamp(value: &str) -> bool {
    ISO_PREFIX.is_match(value)
}

/// Check the fields the collector requires
pub fn validate_envelope(event: &Event) -> Result<(), TrackerError> {
    let missing: Vec<&str> = [
        ("eventId", event.event_id.is_empty()),
        ("eventType", event.event_type.is_empty()),
        ("page.path", event.page.path.is_empty()),
    ]
    .into_iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| name)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TrackerError::MissingField(missing.join(", ")))
    }
}

/// Sends events at most once per `(eventType, eventId)` pair
pub struct Delivery {
    api_key: String,
    endpoint: String,
    site_domain: String,
    transport: Box<dyn Transport>,
    sent: HashSet<(String, String)>,
    ids: EventIdGenerator,
}

impl Delivery {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        site_domain: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            site_domain: site_domain.into(),
            transport,
            sent: HashSet::new(),
            ids: EventIdGenerator::new(),
        }
    }

    pub fn from_config(
        config: &TrackerConfig,
        api_key: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self::new(api_key, &config.endpoint, &config.site_domain, transport)
    }

    /// A fresh event id
    pub fn event_id(&self, prefix: &str, now: DateTime<Utc>) -> String {
        self.ids.generate(prefix, now)
    }

    /// Whether this exact pair has already gone through [`Delivery::send`]
    pub fn was_sent(&self, event_type: &str, event_id: &str) -> bool {
        self.sent
            .contains(&(event_type.to_string(), event_id.to_string()))
    }

    /// Number of distinct pairs registered
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    /// Deliver one event.
    ///
    /// Returns `false` for duplicates, malformed envelopes, and when the
    /// primary transport could not even be attempted. The pair is registered
    /// before anything else is checked, so a failed send still counts as sent.
    pub fn send(&mut self, mut event: Event, now: DateTime<Utc>) -> bool {
        let key = (event.event_type.clone(), event.event_id.clone());
        if !self.sent.insert(key) {
            return false;
        }

        let well_formed = event
            .occurred_at
            .as_deref()
            .is_some_and(is_iso_timestamp);
        if !well_formed {
            event.occurred_at = Some(format_timestamp(now));
        }

        if let Err(e) = validate_envelope(&event) {
            warn!(error = %e, event_id = %event.event_id, "dropping invalid event payload");
            return false;
        }

        let body = match serde_json::to_string(&event) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, event_id = %event.event_id, "failed to encode event");
                return false;
            }
        };

        debug!(event_type = %event.event_type, event_id = %event.event_id, "registering event");

        let request = self.request(body);
        match self.transport.post(&request) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "post unavailable, falling back to beacon");
                if let Err(e) = self.transport.beacon(&self.endpoint, &request.body) {
                    debug!(error = %e, "beacon failed");
                }
                false
            }
        }
    }

    fn request(&self, body: String) -> DeliveryRequest {
        DeliveryRequest {
            endpoint: self.endpoint.clone(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                ),
                (SITE_HEADER.to_string(), self.site_domain.clone()),
                (LEGACY_SITE_HEADER.to_string(), self.site_domain.clone()),
            ],
            body,
            keepalive: true,
            cors: true,
        }
    }
}
