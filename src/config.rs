//! Tracker configuration
//!
//! Every timing constant the engine relies on is a field here, so hosts and
//! tests can shrink or stretch the schedule without touching the state machines.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TrackerError;

/// Default collector endpoint
pub const DEFAULT_ENDPOINT: &str = "https://wp-conversion-monitor.onrender.com/events";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Bearer token for the collector; blank means tracking is disabled
    pub api_key: Option<String>,
    /// Collector URL events are POSTed to
    pub endpoint: String,
    /// Host name reported in the site-identifier headers
    pub site_domain: String,
    /// Path-polling loop interval
    pub poll_interval_ms: u64,
    /// Periodic completion check while sessions are active
    pub fallback_check_interval_ms: u64,
    /// Session garbage collection interval
    pub gc_interval_ms: u64,
    /// Age after which an unmatched session is dropped
    pub session_ttl_ms: u64,
    /// Same-path activations within this window are merged
    pub activation_debounce_ms: u64,
    /// Delay between a focusout and the focus probe
    pub abandon_check_delay_ms: u64,
    /// How long form state survives an abandon
    pub abandon_grace_ms: u64,
    /// Completion check delay after a checkout form submit
    pub submit_check_delay_ms: u64,
    /// Completion check delay after a purchase-intent click
    pub click_check_delay_ms: u64,
    /// Maximum length of reported labels and form names
    pub max_label_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            site_domain: String::new(),
            poll_interval_ms: 500,
            fallback_check_interval_ms: 3_000,
            gc_interval_ms: 60_000,
            session_ttl_ms: 3_600_000,
            activation_debounce_ms: 5_000,
            abandon_check_delay_ms: 100,
            abandon_grace_ms: 30_000,
            submit_check_delay_ms: 1_000,
            click_check_delay_ms: 2_000,
            max_label_len: 80,
        }
    }
}

impl TrackerConfig {
    /// Config with the given key and domain, everything else defaulted
    pub fn with_api_key(api_key: impl Into<String>, site_domain: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            site_domain: site_domain.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the API key with the highest-priority host-provided one, if any
    pub fn with_key_sources(mut self, sources: &ApiKeySources) -> Self {
        if let Some(key) = sources.resolve() {
            self.api_key = Some(key);
        }
        self
    }

    /// The trimmed API key, if one is configured
    pub fn resolved_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Check intervals and endpoint.
    ///
    /// A missing API key is not a validation error: it makes the engine inert
    /// and is reported by [`crate::Tracker::new`] instead.
    pub fn validate(&self) -> Result<(), TrackerError> {
        Url::parse(&self.endpoint)
            .map_err(|e| TrackerError::InvalidConfig(format!("endpoint: {}", e)))?;

        let intervals = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("fallback_check_interval_ms", self.fallback_check_interval_ms),
            ("gc_interval_ms", self.gc_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(TrackerError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.max_label_len == 0 {
            return Err(TrackerError::InvalidConfig(
                "max_label_len must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Places a host page can carry the API key, highest priority first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeySources {
    /// `data-api-key` attribute on the loading script tag
    pub script_attribute: Option<String>,
    /// `window.CIQ_API_KEY`
    pub global: Option<String>,
    /// `window.WPCM_API_KEY`
    pub legacy_global: Option<String>,
    /// `localStorage['ciq_api_key']`
    pub stored: Option<String>,
    /// `localStorage['wpcm_api_key']`
    pub legacy_stored: Option<String>,
}

impl ApiKeySources {
    /// First non-blank candidate, trimmed
    pub fn resolve(&self) -> Option<String> {
        [
            &self.script_attribute,
            &self.global,
            &self.legacy_global,
            &self.stored,
            &self.legacy_stored,
        ]
        .into_iter()
        .flatten()
        .map(|candidate| candidate.trim())
        .find(|candidate| !candidate.is_empty())
        .map(str::to_string)
    }
}
