//! Native HTTP transport (feature `http`)
//!
//! Each request runs on a detached thread. The caller never learns the
//! outcome; failures are logged at debug level and dropped.

use std::thread;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::delivery::transport::{DeliveryRequest, Transport};
use crate::error::TransportError;

/// Fire-and-forget HTTP transport backed by `ureq`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    fn spawn(
        &self,
        name: &str,
        job: impl FnOnce(ureq::Agent) + Send + 'static,
    ) -> Result<(), TransportError> {
        let agent = self.agent.clone();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || job(agent))
            .map(|_| ())
            .map_err(|e| TransportError::Construction(e.to_string()))
    }
}

fn check_endpoint(endpoint: &str) -> Result<(), TransportError> {
    Url::parse(endpoint)
        .map(|_| ())
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))
}

impl Transport for HttpTransport {
    fn post(&self, request: &DeliveryRequest) -> Result<(), TransportError> {
        check_endpoint(&request.endpoint)?;
        let request = request.clone();

        self.spawn("ciq-post", move |agent| {
            let mut call = agent.post(&request.endpoint);
            for (name, value) in &request.headers {
                call = call.set(name, value);
            }
            if let Err(e) = call.send_string(&request.body) {
                debug!(error = %e, endpoint = %request.endpoint, "event post failed");
            }
        })
    }

    fn beacon(&self, endpoint: &str, body: &str) -> Result<(), TransportError> {
        check_endpoint(endpoint)?;
        let endpoint = endpoint.to_string();
        let body = body.to_string();

        self.spawn("ciq-beacon", move |agent| {
            let result = agent
                .post(&endpoint)
                .set("Content-Type", "application/json")
                .send_string(&body);
            if let Err(e) = result {
                debug!(error = %e, endpoint = %endpoint, "event beacon failed");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_endpoint_fails_synchronously() {
        let transport = HttpTransport::default();
        let request = DeliveryRequest {
            endpoint: "not a url".to_string(),
            headers: Vec::new(),
            body: "{}".to_string(),
            keepalive: true,
            cors: true,
        };
        assert!(matches!(
            transport.post(&request),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(transport.beacon("::", "{}").is_err());
    }
}
