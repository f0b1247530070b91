//! Page activity emitters
//!
//! Stateless builders for `page_view`, `click` and `scroll` envelopes, plus the
//! per-page set of scroll thresholds already reported.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::page::{ClickTarget, Page};
use crate::types::{truncate_label, ElementInfo, Event, EventType, PageInfo, ScrollInfo};

/// Scroll depth thresholds, in percent
pub const SCROLL_MARKS: [u8; 4] = [25, 50, 75, 100];

/// Page block for the current document
pub(crate) fn page_info(page: &dyn Page) -> PageInfo {
    PageInfo {
        path: page.path().to_string(),
        title: page.title().to_string(),
        referrer_path: None,
    }
}

/// `page_view` for the current document
pub fn page_view_event(page: &dyn Page, event_id: String, now: DateTime<Utc>) -> Event {
    let mut info = page_info(page);
    info.referrer_path = page
        .referrer()
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    Event::new(EventType::PageView, event_id, now, info)
}

/// `click` for an anchor or button; `None` for anything else
pub fn click_event(
    target: &ClickTarget,
    page: &dyn Page,
    event_id: String,
    now: DateTime<Utc>,
    max_label_len: usize,
) -> Option<Event> {
    if !target.is_link_or_button() {
        return None;
    }
    let element = ElementInfo {
        kind: target.tag.to_lowercase(),
        label: truncate_label(&target.text, max_label_len),
        selector: Some(target.class_name.clone()),
        href: target.href.clone().filter(|href| !href.is_empty()),
    };
    Some(Event::new(EventType::Click, event_id, now, page_info(page)).with_element(element))
}

/// `scroll` for one crossed threshold
pub fn scroll_event(mark: u8, page: &dyn Page, event_id: String, now: DateTime<Utc>) -> Event {
    Event::new(EventType::Scroll, event_id, now, page_info(page))
        .with_scroll(ScrollInfo { percent: mark })
}

/// Event-id prefix for a scroll threshold
pub fn scroll_id_prefix(mark: u8) -> String {
    format!("scroll-{}", mark)
}

/// `round((scrollY + innerHeight) / scrollHeight * 100)`, or `None` for an
/// empty document
pub fn scroll_percent(scroll_y: f64, viewport_height: f64, document_height: f64) -> Option<f64> {
    if document_height.is_nan() || document_height <= 0.0 {
        return None;
    }
    Some(((scroll_y + viewport_height) / document_height * 100.0).round())
}

/// Thresholds already reported on this page
#[derive(Debug, Clone, Default)]
pub struct ScrollDepth {
    sent: BTreeSet<u8>,
}

impl ScrollDepth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thresholds newly reached at `percent`, in ascending order
    pub fn crossed(&mut self, percent: f64) -> Vec<u8> {
        SCROLL_MARKS
            .iter()
            .copied()
            .filter(|mark| percent >= f64::from(*mark) && self.sent.insert(*mark))
            .collect()
    }

    pub fn reported(&self) -> impl Iterator<Item = u8> + '_ {
        self.sent.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageSnapshot;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_page_view_carries_referrer() {
        let mut page = PageSnapshot::at("/pricing").with_title("Pricing");
        page.referrer = Some("https://search.test/?q=shop".to_string());

        let event = page_view_event(&page, "page-1".to_string(), now());
        assert_eq!(event.event_type, "page_view");
        assert_eq!(
            event.page.referrer_path.as_deref(),
            Some("https://search.test/?q=shop")
        );
        assert_eq!(event.page.title, "Pricing");
    }

    #[test]
    fn test_click_only_for_links_and_buttons() {
        let page = PageSnapshot::at("/");
        let link = ClickTarget {
            tag: "A".to_string(),
            text: "Read the full story about our spring collection".to_string(),
            class_name: "nav-link".to_string(),
            href: Some("https://shop.test/blog".to_string()),
            ..ClickTarget::default()
        };
        let event = click_event(&link, &page, "click-1".to_string(), now(), 10).unwrap();
        let element = event.element.unwrap();
        assert_eq!(element.kind, "a");
        assert_eq!(element.label, "Read the f");
        assert_eq!(element.selector.as_deref(), Some("nav-link"));
        assert_eq!(element.href.as_deref(), Some("https://shop.test/blog"));

        let role_button = ClickTarget {
            tag: "DIV".to_string(),
            role: Some("button".to_string()),
            ..ClickTarget::default()
        };
        assert!(click_event(&role_button, &page, "click-2".to_string(), now(), 80).is_none());
    }

    #[test]
    fn test_scroll_percent() {
        assert_eq!(scroll_percent(0.0, 800.0, 1600.0), Some(50.0));
        assert_eq!(scroll_percent(1200.0, 800.0, 2000.0), Some(100.0));
        assert_eq!(scroll_percent(0.0, 800.0, 0.0), None);
    }

    #[test]
    fn test_scroll_marks_reported_once() {
        let mut depth = ScrollDepth::new();
        assert_eq!(depth.crossed(10.0), Vec::<u8>::new());
        assert_eq!(depth.crossed(60.0), vec![25, 50]);
        assert_eq!(depth.crossed(55.0), Vec::<u8>::new());
        assert_eq!(depth.crossed(100.0), vec![75, 100]);
        assert_eq!(depth.reported().collect::<Vec<_>>(), vec![25, 50, 75, 100]);
        assert_eq!(scroll_id_prefix(75), "scroll-75");
    }
}
