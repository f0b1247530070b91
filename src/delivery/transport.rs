//! Transport seam
//!
//! Delivery is one-way: a transport either accepts a request (and owns its
//! fate from then on) or fails synchronously while building it. There is no
//! return channel for network outcomes.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// A fully built authenticated POST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Request may outlive page unload
    pub keepalive: bool,
    /// Cross-origin request mode
    pub cors: bool,
}

impl DeliveryRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Something that can move event bodies off the page
pub trait Transport {
    /// Primary path: authenticated POST. `Err` only for synchronous failures.
    fn post(&self, request: &DeliveryRequest) -> Result<(), TransportError>;

    /// Degraded path: unauthenticated beacon
    fn beacon(&self, endpoint: &str, body: &str) -> Result<(), TransportError>;
}

/// What an [`OutboxTransport`] captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dispatch {
    Post(DeliveryRequest),
    Beacon { endpoint: String, body: String },
}

impl Dispatch {
    pub fn body(&self) -> &str {
        match self {
            Dispatch::Post(request) => &request.body,
            Dispatch::Beacon { body, .. } => body,
        }
    }
}

/// Queues dispatches for the host to flush.
///
/// Clones share one queue, so a host can keep a handle while the tracker owns
/// the transport.
#[derive(Debug, Clone, Default)]
pub struct OutboxTransport {
    queue: Rc<RefCell<Vec<Dispatch>>>,
    refuse_posts: bool,
}

impl OutboxTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// An outbox whose POST path always fails to construct, forcing the beacon
    pub fn refusing_posts() -> Self {
        Self {
            queue: Rc::default(),
            refuse_posts: true,
        }
    }

    /// Take everything queued so far
    pub fn drain(&self) -> Vec<Dispatch> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Snapshot of queued dispatches without draining
    pub fn peek(&self) -> Vec<Dispatch> {
        self.queue.borrow().clone()
    }
}

impl Transport for OutboxTransport {
    fn post(&self, request: &DeliveryRequest) -> Result<(), TransportError> {
        if self.refuse_posts {
            return Err(TransportError::Unavailable);
        }
        self.queue.borrow_mut().push(Dispatch::Post(request.clone()));
        Ok(())
    }

    fn beacon(&self, endpoint: &str, body: &str) -> Result<(), TransportError> {
        self.queue.borrow_mut().push(Dispatch::Beacon {
            endpoint: endpoint.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DeliveryRequest {
        DeliveryRequest {
            endpoint: "https://collector.test/events".to_string(),
            headers: vec![("Authorization".to_string(), "Bearer k".to_string())],
            body: "{}".to_string(),
            keepalive: true,
            cors: true,
        }
    }

    #[test]
    fn test_outbox_clones_share_queue() {
        let outbox = OutboxTransport::new();
        let handle = outbox.clone();

        outbox.post(&request()).unwrap();
        assert_eq!(handle.len(), 1);

        let drained = handle.drain();
        assert_eq!(drained.len(), 1);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_refusing_outbox_accepts_beacons() {
        let outbox = OutboxTransport::refusing_posts();
        assert!(outbox.post(&request()).is_err());
        outbox.beacon("https://collector.test/events", "{}").unwrap();
        assert!(matches!(outbox.drain()[0], Dispatch::Beacon { .. }));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        assert_eq!(request().header("authorization"), Some("Bearer k"));
        assert_eq!(request().header("X-CIQ-Domain"), None);
    }
}
